use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use conduit_core::{
    dummy_input, EchoFilter, Event, EventFunction, EventTarget, Filter, InputContext,
    PipelineLayout, PipelineType, StreamEnd,
};

struct CountingSink(Arc<AtomicUsize>);
impl EventTarget for CountingSink {
    fn input(&self, _event: Event) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// §8 scenario 1 ("echo"), exercised purely at the pipeline level: a
/// listen-shaped layout whose single filter echoes input to output, run
/// twice through two fresh instances, must produce identical outputs for
/// identical inputs (§8's determinism property).
#[test]
fn echo_layout_is_deterministic_across_fresh_instances() {
    let layout = PipelineLayout::new(
        "echo",
        PipelineType::Listen,
        vec![Box::new(EchoFilter) as Box<dyn Filter>],
        0,
    )
    .unwrap();

    for _ in 0..2 {
        let instance = layout.alloc();
        let count = Arc::new(AtomicUsize::new(0));
        instance.chain(Some(Arc::new(CountingSink(count.clone()))));
        let _ctx = InputContext::enter();
        instance.input(Event::Data(conduit_core::Data::from_bytes(b"hello")));
        instance.input(Event::StreamEnd(StreamEnd::NoError));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}

/// §8's auto-release property: every pipeline marked auto-release within
/// an `InputContext` frame is released by the time the frame exits, and
/// the layout's free list reflects it immediately afterward.
#[test]
fn auto_release_returns_instance_to_free_list_at_frame_exit() {
    let layout = PipelineLayout::new(
        "echo",
        PipelineType::Listen,
        vec![Box::new(EchoFilter) as Box<dyn Filter>],
        0,
    )
    .unwrap();
    let instance = layout.alloc();
    instance.chain(Some(dummy_input()));
    assert_eq!(layout.pooled_count(), 0);
    {
        let _ctx = InputContext::enter();
        instance.input(Event::StreamEnd(StreamEnd::NoError));
    }
    assert_eq!(layout.pooled_count(), 1);
    assert_eq!(layout.active_count(), 0);
}

/// A pooled instance handed back out via `alloc()` must not leak the
/// previous connection's context slots or output chain (§3's "never
/// copied across pipeline instances" lifecycle note).
#[test]
fn reused_instance_starts_with_a_clean_slate() {
    let layout = PipelineLayout::new(
        "echo",
        PipelineType::Listen,
        vec![Box::new(EchoFilter) as Box<dyn Filter>],
        1,
    )
    .unwrap();
    let first = layout.alloc();
    first
        .context()
        .set(conduit_core::SlotId(0), String::from("leftover"));
    first.chain(Some(dummy_input()));
    {
        let _ctx = InputContext::enter();
        first.input(Event::StreamEnd(StreamEnd::NoError));
    }
    let second = layout.alloc();
    assert_eq!(
        second.context().get::<String>(conduit_core::SlotId(0)),
        None
    );
}
