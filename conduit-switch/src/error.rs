use conduit_core::{CoreError, ErrorCategory};
use thiserror::Error;

/// Error domain for the keyed session multiplexer (§4.3).
///
/// Every variant maps onto a stable `switch.*` code via
/// [`From<SwitchError> for CoreError`] so callers composing this crate
/// into a larger pipeline can propagate with `?` and still get a code
/// suitable for metrics/alerting.
#[derive(Debug, Clone, Error)]
pub enum SwitchError {
    /// The target session's sub-pipeline failed to start; every stream
    /// waiting on it receives a synthesized `StreamEnd{ProtocolError}`.
    #[error("session failed to start for key `{key}`")]
    SessionStartFailed { key: String },

    /// A write landed on a stream whose session has already closed.
    #[error("stream write rejected: session for key `{key}` is closed")]
    SessionClosed { key: String },

    /// `max_queue` was reached and the session cannot accept another
    /// concurrent stream.
    #[error("session for key `{key}` is at its queue capacity")]
    QueueExhausted { key: String },
}

impl From<SwitchError> for CoreError {
    fn from(value: SwitchError) -> Self {
        let (code, category) = match &value {
            SwitchError::SessionStartFailed { .. } => {
                ("switch.session_start_failed", ErrorCategory::Retryable)
            }
            SwitchError::SessionClosed { .. } => {
                ("switch.session_closed", ErrorCategory::Permanent)
            }
            SwitchError::QueueExhausted { .. } => {
                ("switch.queue_exhausted", ErrorCategory::ResourceExhausted)
            }
        };
        CoreError::new(code, value.to_string())
            .with_category(category)
            .with_cause(value)
    }
}
