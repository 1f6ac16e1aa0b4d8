use crate::event::Event;

use super::target::{EventTarget, Input};

/// A filter that is both a function and a source (§4.1): it has
/// `input`/`output` for the forward path into a sub-pipeline it fronts,
/// and `forward`/`reply` for the backward path out of that sub-pipeline.
/// Used by `mux`/`demux`-shaped filters, which is why `conduit-switch`'s
/// `Stream` implements it.
pub trait EventProxy: EventTarget {
    /// Install the forward-path outlet (mirrors `EventFunction::chain`).
    fn chain(&self, next: Option<Input>);

    /// Deliver an event travelling backward, out of the sub-pipeline this
    /// proxy fronts, toward whatever opened the stream.
    fn reply(&self, event: Event);
}
