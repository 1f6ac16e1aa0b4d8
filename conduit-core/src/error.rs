use std::boxed::Box;
use std::fmt;
use std::string::String;

/// Stable, cross-crate error domain for the runtime core.
///
/// # Why
/// Construction-time failures (bad layout, unresolved `link` target, a
/// listener that cannot bind) need a shape that survives being logged,
/// matched on by a retry policy, and handed across an `Arc` boundary
/// without forcing every caller to know about a specific failure's
/// concrete type. `CoreError` is that shape: a stable `code`, a message
/// for humans, an optional `cause` chain, and a [`ErrorCategory`] a caller
/// can switch on without string-matching the code.
///
/// # What
/// - `code` is a `&'static str` in `<domain>.<reason>` form
///   (`"pipeline.link_cycle"`, `"session.closed"`).
/// - `category` defaults to `ErrorCategory::Permanent` unless set.
/// - `with_cause` attaches a boxed source; `source()` exposes it via the
///   standard `std::error::Error` chain.
#[derive(Debug)]
pub struct CoreError {
    code: &'static str,
    message: String,
    category: ErrorCategory,
    cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl CoreError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            category: ErrorCategory::Permanent,
            cause: None,
        }
    }

    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|c| c.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Structured disposition hint attached to a [`CoreError`], so callers can
/// decide on retry/backoff/circuit-breaking without parsing `code`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorCategory {
    /// Retrying the same operation may succeed (e.g. a transient resolve
    /// failure).
    Retryable,
    /// Retrying will not help; the caller must change something first.
    Permanent,
    /// A configured limit was hit (`max_connections`, `max_queue`, ...).
    ResourceExhausted,
    /// The operation was cancelled by its caller, not by a failure.
    Cancelled,
}

pub type Result<T> = core::result::Result<T, CoreError>;
