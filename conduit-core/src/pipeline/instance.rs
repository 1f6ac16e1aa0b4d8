use alloc::boxed::Box;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::context::Context;
use crate::event::Event;
use crate::plumbing::{AutoRelease, EventFunction, EventTarget, Input, InputContext, OutputChain};

use super::filter::{Filter, FilterIo};
use super::layout::PipelineLayout;

/// A live, wired instance of a [`PipelineLayout`] (§4.2/§3). Implements
/// [`EventFunction`] so it composes like any other stage: something
/// upstream (an inbound socket, a fork filter, a mux reply path) holds an
/// `Input` pointing at it, and it `chain`s to wherever its own output
/// goes.
///
/// Filters are driven left to right by recursive calls through
/// [`FilterIo::emit`] rather than each filter holding a handle to the
/// next — that keeps rewiring (a reload re-pointing the tail of the
/// chain) a single `OutputChain::chain` call instead of a walk over every
/// filter.
pub struct PipelineInstance {
    layout: Arc<PipelineLayout>,
    filters: Vec<RefCell<Box<dyn Filter>>>,
    context: RefCell<Arc<Context>>,
    slot_count: usize,
    output: OutputChain,
    self_weak: Weak<PipelineInstance>,
    stream_ended: AtomicBool,
}

impl PipelineInstance {
    /// Constructed only by [`PipelineLayout::alloc`] — `Arc::new_cyclic`
    /// gives the instance a weak handle to itself so `finish()` can
    /// schedule its own release through [`InputContext`] without the
    /// instance needing to be handed its `Arc` from outside.
    pub(crate) fn new_arc(
        layout: Arc<PipelineLayout>,
        filters: Vec<RefCell<Box<dyn Filter>>>,
        slot_count: usize,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            layout,
            filters,
            context: RefCell::new(Arc::new(Context::new(slot_count))),
            slot_count,
            output: OutputChain::new(),
            self_weak: weak.clone(),
            stream_ended: AtomicBool::new(false),
        })
    }

    pub fn layout(&self) -> &Arc<PipelineLayout> {
        &self.layout
    }

    pub fn context(&self) -> Arc<Context> {
        self.context.borrow().clone()
    }

    /// Drive filter `index` with `event`; filters past the end of the
    /// chain fall through to the instance's own output chain. Recursion
    /// depth is bounded by the filter count of one pipeline, which the
    /// layout builder keeps small (§1's scope), so this never risks a
    /// stack blowup the way general-purpose recursion would.
    pub(crate) fn process_at(&self, index: usize, event: Event) {
        if self.stream_ended.load(Ordering::Acquire) {
            return;
        }
        if index >= self.filters.len() {
            let is_end = event.is_stream_end();
            self.output.emit(event);
            if is_end {
                self.finish();
            }
            return;
        }
        let io = FilterIo {
            instance: self,
            index,
        };
        self.filters[index].borrow_mut().process(&io, event);
    }

    /// Mark this instance as done and, if it wants automatic pooling,
    /// schedule its release at the current `InputContext` frame's exit
    /// (§4.1's auto-release rule). Idempotent: a chain that emits more
    /// than one `StreamEnd` (which should not happen per §3's framing
    /// invariant, but filters are not trusted blindly) only releases
    /// once.
    fn finish(&self) {
        if self.stream_ended.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(strong) = self.self_weak.upgrade() {
            InputContext::auto_release(strong as Arc<dyn AutoRelease>);
        }
    }

    /// A stable handle that emits straight to this instance's own output
    /// chain, bypassing any filters that would otherwise sit downstream.
    ///
    /// `FilterIo` is deliberately not storable past the `process()` call
    /// that hands it out, but a filter fronting a sub-pipeline whose
    /// replies arrive asynchronously (long after that call returned) needs
    /// something it *can* hold onto — this is that something. Meaningful
    /// only when the filter holding it is the last stage of its own
    /// pipeline; calling it from anywhere else skips whatever would have
    /// run after that filter.
    pub fn tail_sink(&self) -> Input {
        let instance = self
            .self_weak
            .upgrade()
            .expect("tail_sink called while the instance is being dropped");
        Arc::new(TailSink(instance))
    }

    /// Restore filters, context, and output chain to a fresh-allocation
    /// state so the free list in [`PipelineLayout`] can hand this
    /// instance to an unrelated connection.
    pub(crate) fn reset_filters(&self) {
        for filter in &self.filters {
            filter.borrow_mut().reset();
        }
        *self.context.borrow_mut() = Arc::new(Context::new(self.slot_count));
        self.output.chain(None);
        self.stream_ended.store(false, Ordering::Release);
    }
}

impl EventTarget for PipelineInstance {
    fn input(&self, event: Event) {
        self.process_at(0, event);
    }
}

impl EventFunction for PipelineInstance {
    fn chain(&self, next: Option<Input>) {
        self.output.chain(next);
    }
}

impl AutoRelease for PipelineInstance {
    fn release(self: Arc<Self>) {
        let layout = Arc::clone(&self.layout);
        layout.recycle(self);
    }
}

struct TailSink(Arc<PipelineInstance>);

impl EventTarget for TailSink {
    fn input(&self, event: Event) {
        self.0.output.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Data, StreamEnd};
    use crate::pipeline::filter::FilterIo;
    use crate::pipeline::layout::{PipelineLayout, PipelineType};
    use alloc::sync::Arc as StdArc;
    use core::sync::atomic::AtomicUsize;

    struct Echo;
    impl Filter for Echo {
        fn clone_box(&self) -> Box<dyn Filter> {
            Box::new(Echo)
        }
        fn process(&mut self, io: &FilterIo<'_>, event: Event) {
            io.emit(event);
        }
        fn name(&self) -> &'static str {
            "echo"
        }
    }

    struct CountingTarget(StdArc<AtomicUsize>);
    impl EventTarget for CountingTarget {
        fn input(&self, _event: Event) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn echo_layout() -> Arc<PipelineLayout> {
        PipelineLayout::new(
            "echo",
            PipelineType::Named,
            alloc::vec![Box::new(Echo) as Box<dyn Filter>],
            0,
        )
        .unwrap()
    }

    #[test]
    fn events_flow_through_filter_to_output_chain() {
        let layout = echo_layout();
        let instance = layout.alloc();
        let count = StdArc::new(AtomicUsize::new(0));
        instance.chain(Some(StdArc::new(CountingTarget(count.clone()))));
        instance.input(Event::Data(Data::from_bytes(b"hi")));
        instance.input(Event::Data(Data::from_bytes(b"there")));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn stream_end_triggers_auto_release_into_free_list() {
        let layout = echo_layout();
        let instance = layout.alloc();
        instance.chain(Some(crate::plumbing::dummy_input()));
        assert_eq!(layout.pooled_count(), 0);
        {
            let _ctx = InputContext::enter();
            instance.input(Event::StreamEnd(StreamEnd::NoError));
            assert_eq!(layout.pooled_count(), 0, "must not release mid-frame");
        }
        assert_eq!(layout.pooled_count(), 1, "must release at frame exit");
    }

    #[test]
    fn events_after_stream_end_are_dropped() {
        let layout = echo_layout();
        let instance = layout.alloc();
        let count = StdArc::new(AtomicUsize::new(0));
        instance.chain(Some(StdArc::new(CountingTarget(count.clone()))));
        {
            let _ctx = InputContext::enter();
            instance.input(Event::StreamEnd(StreamEnd::NoError));
        }
        instance.input(Event::Data(Data::from_bytes(b"late")));
        assert_eq!(count.load(Ordering::SeqCst), 1, "only the StreamEnd reached the output");
    }

    #[test]
    fn recycled_instance_has_fresh_context_and_chain() {
        let layout = echo_layout();
        let instance = layout.alloc();
        instance.context().set(crate::context::SlotId(0), 7u32);
        instance.chain(Some(crate::plumbing::dummy_input()));
        {
            let _ctx = InputContext::enter();
            instance.input(Event::StreamEnd(StreamEnd::NoError));
        }
        let reused = layout.alloc();
        assert_eq!(reused.context().get::<u32>(crate::context::SlotId(0)), None);
        assert!(!reused.output.is_chained());
    }
}
