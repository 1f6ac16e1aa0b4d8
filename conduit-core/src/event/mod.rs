//! The event model (L1): [`Event`], the `Data` rope, and message boundary
//! types.
//!
//! Every event is immutable once it leaves its producer and is shared via
//! `Arc<Event>` rather than cloned structurally — cloning an `Event` clones
//! the `Arc`, which is the reference-counting discipline §3 calls for.
//! `Data` chunks are themselves `Arc`-backed so that sharing one `Data`
//! across multiple downstream sinks (e.g. a `fork` filter) never copies
//! payload bytes.

pub mod data;
pub mod message;
pub mod stream_end;

pub use data::{concat, Data, CHUNK_SIZE};
pub use message::{Head, MessageEnd, MessageStart};
pub use stream_end::StreamEnd;

/// The closed set of event variants flowing through a pipeline.
///
/// # Why
/// A sum type (rather than a trait object per variant) is the right shape
/// here per §9's design note: the variant set is closed by §3 and will not
/// grow — protocol-specific payloads live inside `MessageStart`'s opaque
/// head, not as new `Event` variants. A tagged enum lets `process()` match
/// exhaustively and the compiler catches a missed `StreamEnd` handler,
/// which is exactly the framing bug (§3's framing invariant) this model
/// exists to prevent.
#[derive(Clone, Debug)]
pub enum Event {
    Data(Data),
    MessageStart(MessageStart),
    MessageEnd(MessageEnd),
    StreamEnd(StreamEnd),
}

impl Event {
    pub fn is_message_start(&self) -> bool {
        matches!(self, Event::MessageStart(_))
    }

    pub fn is_message_end(&self) -> bool {
        matches!(self, Event::MessageEnd(_))
    }

    pub fn is_stream_end(&self) -> bool {
        matches!(self, Event::StreamEnd(_))
    }

    pub fn as_data(&self) -> Option<&Data> {
        match self {
            Event::Data(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_stream_end(&self) -> Option<&StreamEnd> {
        match self {
            Event::StreamEnd(e) => Some(e),
            _ => None,
        }
    }
}

impl core::fmt::Debug for MessageStart {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MessageStart")
            .field("has_head", &self.head().is_some())
            .finish()
    }
}

impl core::fmt::Debug for MessageEnd {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MessageEnd")
            .field("has_tail", &self.tail().is_some())
            .field("has_payload", &self.payload().is_some())
            .finish()
    }
}

/// Validates the framing regex from §3:
/// `(MessageStart Data* MessageEnd)* StreamEnd?`.
///
/// # Why
/// This is small enough to be a pure function rather than a stateful
/// filter, which makes it usable both as a runtime assertion in debug
/// builds (the multiplexer's own `InputContext`-boundary assertion in
/// §4.3) and as a standalone property in tests (§8).
#[derive(Default)]
pub struct FramingValidator {
    in_message: bool,
    ended: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FramingViolation {
    DataOutsideMessageEnd,
    DoubleMessageStart,
    MessageEndWithoutStart,
    EventAfterStreamEnd,
}

impl FramingValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, event: &Event) -> Result<(), FramingViolation> {
        if self.ended {
            return Err(FramingViolation::EventAfterStreamEnd);
        }
        match event {
            Event::MessageStart(_) => {
                if self.in_message {
                    return Err(FramingViolation::DoubleMessageStart);
                }
                self.in_message = true;
            }
            Event::MessageEnd(_) => {
                if !self.in_message {
                    return Err(FramingViolation::MessageEndWithoutStart);
                }
                self.in_message = false;
            }
            Event::Data(_) => {
                // Raw Data outside a message is explicitly allowed by §3.
            }
            Event::StreamEnd(_) => {
                self.ended = true;
            }
        }
        Ok(())
    }
}
