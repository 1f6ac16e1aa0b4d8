use crate::event::Event;

/// Contract for stages that originate events rather than react to them
/// (§4.1) — sockets and tasks, primarily. An `EventSource` emits forward
/// through its own [`super::function::OutputChain`] (embedded by the
/// concrete type, not part of this trait) and accepts `reply` events
/// flowing backward from whatever it is chained to.
pub trait EventSource {
    /// Deliver a reply event travelling back toward the source (e.g. an
    /// outbound socket telling an inbound "here is what to write").
    fn reply(&self, event: Event);
}
