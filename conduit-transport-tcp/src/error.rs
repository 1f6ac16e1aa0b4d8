use conduit_core::CoreError;
use thiserror::Error;

/// Failure domain for the TCP/UDP admission path.
///
/// # Why
/// Socket setup and accept-loop failures need a shape a caller can match
/// on (bind vs. accept vs. capacity) without string-parsing an `io::Error`
/// message, and need to convert cleanly into [`CoreError`] so callers
/// above this crate never have to know it exists.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind {protocol} listener on {addr}: {source}")]
    BindFailed {
        protocol: &'static str,
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("accept failed on {addr}: {source}")]
    AcceptFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("socket option `{option}` rejected: {source}")]
    SocketConfig {
        option: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("listener for {addr} has no pipeline layout bound")]
    NoLayoutBound { addr: String },
}

impl From<TransportError> for CoreError {
    fn from(value: TransportError) -> Self {
        let code = match &value {
            TransportError::BindFailed { .. } => "transport.tcp.bind_failed",
            TransportError::AcceptFailed { .. } => "transport.tcp.accept_failed",
            TransportError::SocketConfig { .. } => "transport.tcp.socket_config",
            TransportError::NoLayoutBound { .. } => "transport.tcp.no_layout",
        };
        CoreError::new(code, value.to_string())
    }
}
