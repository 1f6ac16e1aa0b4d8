use alloc::sync::Arc;
use core::any::Any;

/// Closed set of reasons a stream can end, per §3. Every variant here is
/// delivered in-band as an event (§7) — none of them cross a filter
/// boundary as a thrown error.
#[derive(Clone)]
pub enum StreamEnd {
    NoError,
    /// The stream should be retried from scratch by whoever owns it; the
    /// multiplexer's reply-routing FSM treats this identically to
    /// `NoError` when forwarding downstream (see DESIGN.md, Open Question
    /// on `Replay`).
    Replay,
    RuntimeError(Arc<dyn Any + Send + Sync>),
    ReadError,
    WriteError,
    CannotResolve,
    ConnectionCanceled,
    ConnectionReset,
    ConnectionRefused,
    ConnectionTimeout,
    ReadTimeout,
    WriteTimeout,
    IdleTimeout,
    BufferOverflow,
    ProtocolError,
    Unauthorized,
}

impl StreamEnd {
    pub fn is_error(&self) -> bool {
        !matches!(self, StreamEnd::NoError | StreamEnd::Replay)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            StreamEnd::NoError => "NoError",
            StreamEnd::Replay => "Replay",
            StreamEnd::RuntimeError(_) => "RuntimeError",
            StreamEnd::ReadError => "ReadError",
            StreamEnd::WriteError => "WriteError",
            StreamEnd::CannotResolve => "CannotResolve",
            StreamEnd::ConnectionCanceled => "ConnectionCanceled",
            StreamEnd::ConnectionReset => "ConnectionReset",
            StreamEnd::ConnectionRefused => "ConnectionRefused",
            StreamEnd::ConnectionTimeout => "ConnectionTimeout",
            StreamEnd::ReadTimeout => "ReadTimeout",
            StreamEnd::WriteTimeout => "WriteTimeout",
            StreamEnd::IdleTimeout => "IdleTimeout",
            StreamEnd::BufferOverflow => "BufferOverflow",
            StreamEnd::ProtocolError => "ProtocolError",
            StreamEnd::Unauthorized => "Unauthorized",
        }
    }
}

impl core::fmt::Debug for StreamEnd {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.kind_name())
    }
}

/// `RuntimeError` carries an opaque `Arc<dyn Any>`, which has no
/// structural equality of its own — two `RuntimeError`s are equal only if
/// they share the same allocation. Every other variant compares by kind.
impl PartialEq for StreamEnd {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (StreamEnd::RuntimeError(a), StreamEnd::RuntimeError(b)) => Arc::ptr_eq(a, b),
            (StreamEnd::RuntimeError(_), _) | (_, StreamEnd::RuntimeError(_)) => false,
            _ => self.kind_name() == other.kind_name(),
        }
    }
}

impl Eq for StreamEnd {}
