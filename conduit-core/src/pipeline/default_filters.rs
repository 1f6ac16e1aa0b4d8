//! Minimal filters used by integration tests across the workspace and as
//! a reference for how little a filter needs to implement.

use alloc::boxed::Box;

use crate::event::Event;

use super::filter::{Filter, FilterIo};

/// Forwards every event unchanged. The simplest possible filter, and the
/// one the echo scenario (§8) wires a listener's pipeline to.
#[derive(Default)]
pub struct EchoFilter;

impl Filter for EchoFilter {
    fn clone_box(&self) -> Box<dyn Filter> {
        Box::new(EchoFilter)
    }

    fn process(&mut self, io: &FilterIo<'_>, event: Event) {
        io.emit(event);
    }

    fn name(&self) -> &'static str {
        "echo"
    }
}

/// Swallows every event. Used where a pipeline needs to terminate a
/// chain without forwarding (an `Exit` pipeline with no further stages).
#[derive(Default)]
pub struct SinkFilter;

impl Filter for SinkFilter {
    fn clone_box(&self) -> Box<dyn Filter> {
        Box::new(SinkFilter)
    }

    fn process(&mut self, _io: &FilterIo<'_>, _event: Event) {}

    fn name(&self) -> &'static str {
        "sink"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Data;
    use crate::pipeline::layout::{PipelineLayout, PipelineType};
    use crate::plumbing::{dummy_input, EventFunction, EventTarget};
    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTarget(Arc<AtomicUsize>);
    impl EventTarget for CountingTarget {
        fn input(&self, _event: Event) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn echo_filter_forwards_every_event() {
        let layout = PipelineLayout::new(
            "echo-test",
            PipelineType::Listen,
            alloc::vec![Box::new(EchoFilter) as Box<dyn Filter>],
            0,
        )
        .unwrap();
        let instance = layout.alloc();
        let count = Arc::new(AtomicUsize::new(0));
        instance.chain(Some(Arc::new(CountingTarget(count.clone()))));
        instance.input(Event::Data(Data::from_bytes(b"ping")));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sink_filter_drops_every_event() {
        let layout = PipelineLayout::new(
            "sink-test",
            PipelineType::Exit,
            alloc::vec![Box::new(SinkFilter) as Box<dyn Filter>],
            0,
        )
        .unwrap();
        let instance = layout.alloc();
        instance.chain(Some(dummy_input()));
        instance.input(Event::Data(Data::from_bytes(b"swallowed")));
    }
}
