use alloc::sync::Arc;

use crate::event::Event;

/// Inlet contract (§4.1): a stage that receives events and never emits.
///
/// `input` takes `&self` rather than `&mut self` because every stage is
/// shared behind an `Arc` the moment it is chained to by more than one
/// producer (a fan-out `fork`, a multiplexed session's stream queue); any
/// mutable state a concrete target needs must use interior mutability
/// (`RefCell` for single-threaded reactor state, or atomics/locks for
/// anything touched across an `AsyncWrapper` boundary).
/// Not `Send`/`Sync`-bound on purpose: per §5, a pipeline instance lives
/// and dies on one worker thread, and its filters use plain interior
/// mutability (`RefCell`), not atomics or locks, on the assumption that
/// nothing else ever touches them concurrently. The type system enforces
/// thread-confinement for us — `Arc<dyn EventTarget>` built over
/// non-`Sync` filter state simply isn't `Send`, so it cannot leak across
/// a thread boundary by accident. Code that *does* need to cross threads
/// goes through `runtime::queue`'s explicit shared projection instead.
pub trait EventTarget {
    fn input(&self, event: Event);
}

/// A retaining handle to an `EventTarget`. Obtaining one is how the
/// refcount discipline in §3 is expressed in Rust: holding an `Input`
/// keeps the target alive; dropping the last one releases it.
pub type Input = Arc<dyn EventTarget>;

/// Shared no-op sink: what an unset chain resolves to. Installing this
/// explicitly (rather than leaving the chain `None`) still retains a
/// target and satisfies the refcount discipline described in §4.1,
/// without the caller needing to special-case "no chain" at every
/// `emit` site.
pub struct DummyTarget;

impl EventTarget for DummyTarget {
    fn input(&self, _event: Event) {}
}

pub fn dummy_input() -> Input {
    Arc::new(DummyTarget)
}
