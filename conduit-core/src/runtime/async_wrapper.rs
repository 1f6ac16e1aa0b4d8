use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::event::Event;
use crate::pipeline::PipelineLayout;
use crate::plumbing::{EventFunction, EventTarget, Input};

use super::queue::{EventQueue, EventQueueReceiver};

/// Bridges two reactor threads (§4.5): a caller on the source thread
/// sends events in, they cross via an [`EventQueue`], and a pipeline
/// instantiated on the destination thread writes replies back through a
/// second queue running the opposite direction.
///
/// Round-robins across `registered` layout instances on first event per
/// logical stream, matching the "possibly round-robin across N
/// registered instances" note in §4.5 — this is the load-balancing knob
/// a multi-worker fan-out filter uses.
pub struct AsyncWrapper {
    to_destination: EventQueue,
    destination_notify: Arc<Notify>,
    closed: Arc<core::sync::atomic::AtomicBool>,
}

/// The destination-side half, run as a task on the destination thread's
/// reactor. Owns the reconstruction side of the queue and the round-robin
/// selection over registered pipeline layouts.
pub struct AsyncWrapperSink {
    from_source: EventQueueReceiver,
    layouts: Vec<Arc<PipelineLayout>>,
    next_layout: AtomicUsize,
    instances: Mutex<Vec<Option<Input>>>,
    reply_output: EventQueue,
}

impl AsyncWrapper {
    /// Build a wrapper with `layouts.len()` destination pipeline slots,
    /// one lazily instantiated per logical stream on first event
    /// (§4.5's "creates a pipeline on first event").
    pub fn new(
        layouts: Vec<Arc<PipelineLayout>>,
    ) -> (Self, AsyncWrapperSink, EventQueueReceiver) {
        let (to_destination, from_source) = EventQueue::channel();
        let (reply_output, reply_input) = EventQueue::channel();
        let notify = Arc::new(Notify::new());
        let closed = Arc::new(core::sync::atomic::AtomicBool::new(false));
        let slot_count = layouts.len().max(1);
        let sink = AsyncWrapperSink {
            from_source,
            layouts,
            next_layout: AtomicUsize::new(0),
            instances: Mutex::new((0..slot_count).map(|_| None).collect()),
            reply_output,
        };
        (
            Self {
                to_destination,
                destination_notify: notify,
                closed,
            },
            sink,
            reply_input,
        )
    }

    /// Push `event` to the destination thread and wake it. Never blocks
    /// the caller — matches §5's "no user-visible lock is taken on the
    /// fast path" for the send side.
    pub fn send(&self, event: Event) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        self.to_destination.enqueue(event);
        self.destination_notify.notify_one();
    }

    /// Drain the input queue to its release path without delivering
    /// anything further, per §4.5's cancellation contract.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.to_destination.is_closed()
    }
}

impl AsyncWrapperSink {
    /// Run on the destination thread's reactor: dequeue one event,
    /// dispatch it to its (lazily allocated) pipeline instance, and
    /// return whether more events may follow. Callers loop this inside
    /// their own task until it returns `false`.
    pub async fn pump_one(&mut self) -> bool {
        let Some(event) = self.from_source.dequeue().await else {
            return false;
        };
        let slot = self.next_layout.load(Ordering::Relaxed) % self.layouts.len().max(1);
        let input = self.instance_for(slot);
        input.input(event);
        true
    }

    fn instance_for(&self, slot: usize) -> Input {
        let mut instances = self.instances.lock().unwrap();
        if let Some(existing) = instances[slot].clone() {
            return existing;
        }
        let layout = &self.layouts[slot % self.layouts.len()];
        let instance = layout.alloc();
        let reply_sink = ReplySink {
            queue: self.reply_output_handle(),
        };
        instance.chain(Some(Arc::new(reply_sink)));
        let input: Input = instance;
        instances[slot] = Some(input.clone());
        input
    }

    fn reply_output_handle(&self) -> EventQueue {
        self.reply_output.clone()
    }

    pub fn advance_round_robin(&self) {
        self.next_layout.fetch_add(1, Ordering::Relaxed);
    }
}

/// Forwards events emitted by a destination-side pipeline back across the
/// wrapper to the source thread.
struct ReplySink {
    queue: EventQueue,
}

impl EventTarget for ReplySink {
    fn input(&self, event: Event) {
        self.queue.enqueue(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Data;
    use crate::pipeline::{EchoFilter, Filter, PipelineType};

    fn echo_layout() -> Arc<PipelineLayout> {
        PipelineLayout::new(
            "async-echo",
            PipelineType::Named,
            alloc::vec![Box::new(EchoFilter) as Box<dyn Filter>],
            0,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn event_crosses_and_echoes_back() {
        let (wrapper, mut sink, mut replies) = AsyncWrapper::new(alloc::vec![echo_layout()]);
        wrapper.send(Event::Data(Data::from_bytes(b"ping")));
        assert!(sink.pump_one().await);
        let reply = replies.dequeue().await.unwrap();
        assert_eq!(reply.as_data().unwrap().to_vec(), b"ping");
    }

    #[tokio::test]
    async fn closing_stops_delivery() {
        let (wrapper, _sink, _replies) = AsyncWrapper::new(alloc::vec![echo_layout()]);
        wrapper.close();
        wrapper.send(Event::Data(Data::from_bytes(b"dropped")));
        assert!(wrapper.is_closed());
    }
}
