use arc_swap::ArcSwapOption;

use crate::event::Event;

use super::target::{EventTarget, Input};

/// One-in-one-out transducer (§4.1): receives on `input`, emits zero or
/// more events on a chained `output`.
///
/// `EventFunction` itself is just the contract; [`OutputChain`] is the
/// reusable building block every concrete function (filters, pipeline
/// instances, streams) embeds to implement it, so the chain-swap logic
/// isn't duplicated per filter.
pub trait EventFunction: EventTarget {
    /// Install (or clear, with `None`) the outlet this function emits to.
    fn chain(&self, next: Option<Input>);
}

/// Lock-free swappable outlet used by every `EventFunction`/`EventProxy`
/// implementation in this crate.
///
/// # Why
/// A pipeline instance's output chain is read on every `process()` call
/// but written only at wiring time (`PipelineLayout::alloc`) and,
/// exceptionally, during a graceful reload when an in-flight instance's
/// downstream sink is re-pointed. `ArcSwapOption` gives the hot path a
/// lock-free load while keeping the rare write side simple, matching the
/// read-mostly access pattern §5 describes for pipeline layouts.
pub struct OutputChain {
    next: ArcSwapOption<dyn EventTarget>,
}

impl OutputChain {
    pub fn new() -> Self {
        Self {
            next: ArcSwapOption::from(None),
        }
    }

    pub fn chain(&self, next: Option<Input>) {
        self.next.store(next);
    }

    /// Emit one event downstream. A null chain drops the event silently,
    /// per §4.1's connection contract.
    pub fn emit(&self, event: Event) {
        if let Some(target) = self.next.load_full() {
            target.input(event);
        }
    }

    pub fn is_chained(&self) -> bool {
        self.next.load().is_some()
    }
}

impl Default for OutputChain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Data;
    use crate::plumbing::target::dummy_input;
    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTarget(Arc<AtomicUsize>);
    impl EventTarget for CountingTarget {
        fn input(&self, _event: Event) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn unset_chain_drops_silently() {
        let chain = OutputChain::new();
        assert!(!chain.is_chained());
        chain.emit(Event::Data(Data::from_bytes(b"x")));
    }

    #[test]
    fn chained_output_receives_events() {
        let count = Arc::new(AtomicUsize::new(0));
        let chain = OutputChain::new();
        chain.chain(Some(Arc::new(CountingTarget(count.clone()))));
        chain.emit(Event::Data(Data::from_bytes(b"x")));
        chain.emit(Event::Data(Data::from_bytes(b"y")));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn clearing_chain_falls_back_to_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        let chain = OutputChain::new();
        chain.chain(Some(Arc::new(CountingTarget(count.clone()))));
        chain.chain(None);
        chain.emit(Event::Data(Data::from_bytes(b"x")));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        let _ = dummy_input();
    }
}
