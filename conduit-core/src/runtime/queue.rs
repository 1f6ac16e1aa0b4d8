use alloc::boxed::Box;
use alloc::sync::Arc;

use tokio::sync::mpsc;

use crate::event::{Data, Event, Head, MessageEnd, MessageStart, StreamEnd};

/// A cross-thread-safe projection of one [`Event`] (§4.5). `Data` is
/// already `Arc`-backed chunk-wise so it crosses for free; `MessageStart`
/// and `MessageEnd` carry an `Arc<dyn Head>` for the same reason. The
/// projection exists only so `Event` itself never needs a `Send + Sync`
/// bound — most of the crate runs thread-confined, and only this module
/// pays the cost of crossing.
#[derive(Clone)]
pub enum SharedEvent {
    Data(Data),
    MessageStart(Option<Arc<dyn Head>>),
    MessageEnd(Option<Arc<dyn Head>>, Option<Arc<Data>>),
    StreamEnd(StreamEnd),
}

impl SharedEvent {
    pub fn project(event: Event) -> Self {
        match event {
            Event::Data(d) => SharedEvent::Data(d),
            Event::MessageStart(m) => SharedEvent::MessageStart(m.into_head()),
            Event::MessageEnd(m) => {
                let (tail, payload) = m.into_parts();
                SharedEvent::MessageEnd(tail, payload.map(Arc::new))
            }
            Event::StreamEnd(e) => SharedEvent::StreamEnd(e),
        }
    }

    /// Reconstitute a thread-local [`Event`] on the consumer side.
    pub fn reconstitute(self) -> Event {
        match self {
            SharedEvent::Data(d) => Event::Data(d),
            SharedEvent::MessageStart(head) => {
                let m = match head {
                    Some(h) => MessageStart::with_head(h),
                    None => MessageStart::new(),
                };
                Event::MessageStart(m)
            }
            SharedEvent::MessageEnd(tail, payload) => {
                let mut m = MessageEnd::new();
                if let Some(t) = tail {
                    m = m.with_tail(t);
                }
                if let Some(p) = payload {
                    m = m.with_payload((*p).clone());
                }
                Event::MessageEnd(m)
            }
            SharedEvent::StreamEnd(e) => Event::StreamEnd(e),
        }
    }
}

/// Unbounded, `Send`-safe producer/consumer pair for events crossing a
/// thread boundary (§4.5). Built on `tokio::sync::mpsc` rather than a
/// hand-rolled lock-free ring: the teacher reaches for Tokio's channel
/// primitives everywhere a cross-thread handoff is needed, and an
/// unbounded MPSC already gives the "producer never blocks on enqueue"
/// property §4.5 implies (backpressure is handled one layer up, by the
/// `AsyncWrapper`'s own queue-depth bookkeeping, not by blocking here).
#[derive(Clone)]
pub struct EventQueue {
    sender: mpsc::UnboundedSender<SharedEvent>,
}

pub struct EventQueueReceiver {
    receiver: mpsc::UnboundedReceiver<SharedEvent>,
}

impl EventQueue {
    pub fn channel() -> (EventQueue, EventQueueReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (EventQueue { sender }, EventQueueReceiver { receiver })
    }

    /// Copy `event` into its shared projection and hand it to the
    /// consumer thread. Never blocks.
    pub fn enqueue(&self, event: Event) {
        let _ = self.sender.send(SharedEvent::project(event));
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl EventQueueReceiver {
    /// Reconstitute and return the next event, or `None` once every
    /// `EventQueue` producer handle has dropped.
    pub async fn dequeue(&mut self) -> Option<Event> {
        self.receiver.recv().await.map(SharedEvent::reconstitute)
    }

    pub fn try_dequeue(&mut self) -> Option<Event> {
        self.receiver.try_recv().ok().map(SharedEvent::reconstitute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_cross_preserving_fifo_order() {
        let (tx, mut rx) = EventQueue::channel();
        tx.enqueue(Event::Data(Data::from_bytes(b"first")));
        tx.enqueue(Event::Data(Data::from_bytes(b"second")));
        let a = rx.dequeue().await.unwrap();
        let b = rx.dequeue().await.unwrap();
        assert_eq!(a.as_data().unwrap().to_vec(), b"first");
        assert_eq!(b.as_data().unwrap().to_vec(), b"second");
    }

    #[tokio::test]
    async fn dequeue_returns_none_after_producer_drops() {
        let (tx, mut rx) = EventQueue::channel();
        drop(tx);
        assert!(rx.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn stream_end_projects_and_reconstitutes() {
        let (tx, mut rx) = EventQueue::channel();
        tx.enqueue(Event::StreamEnd(StreamEnd::ConnectionReset));
        let evt = rx.dequeue().await.unwrap();
        assert_eq!(evt.as_stream_end(), Some(&StreamEnd::ConnectionReset));
    }
}
