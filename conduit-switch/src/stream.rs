use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use conduit_core::{Data, Event, EventProxy, EventTarget, MessageStart, OutputChain, StreamEnd};

use crate::session::Session;

fn next_stream_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// One caller's share of a [`Session`] (§4.3). A `Stream` is itself an
/// `EventTarget` on the forward path (`write_stream`: caller events flow
/// in through `input`) and an [`EventProxy`] on the reply path (the
/// session's reply-routing FSM calls `reply` on the head of its queue,
/// which forwards to whatever this stream was `chain`ed to).
///
/// `pending`/`buffer`/`pending_start` implement §4.3's "write_stream: if
/// caller is pending, buffer" rule (spec.md:115-116): a stream opened
/// against a session whose sub-pipeline has not started yet accumulates
/// its caller's events here instead of forwarding them, and
/// [`Session::start`]/[`Session::fail_start`] drain every stream still in
/// this state once the session resolves one way or the other. `buffer`
/// holds at most the body of the one in-flight message being accumulated
/// (matching the single `buffer: Data`/`pending_start: Option<MessageStart>`
/// pair spec.md models); a `MessageEnd`/`StreamEnd` arriving before the
/// session resolves is held in `pending_tail` instead of being folded into
/// `buffer`, since it terminates rather than extends the message.
pub struct Stream {
    id: u64,
    session: Arc<Session>,
    one_way: bool,
    queued_count: Cell<usize>,
    started: Cell<bool>,
    dedicated: Cell<bool>,
    pending: Cell<bool>,
    buffer: RefCell<Data>,
    pending_start: RefCell<Option<MessageStart>>,
    pending_tail: RefCell<Option<Event>>,
    output: OutputChain,
}

impl Stream {
    pub(crate) fn new(session: Arc<Session>, one_way: bool) -> Arc<Self> {
        let pending = session.is_pending();
        Arc::new(Self {
            id: next_stream_id(),
            session,
            one_way,
            queued_count: Cell::new(0),
            started: Cell::new(false),
            dedicated: Cell::new(false),
            pending: Cell::new(pending),
            buffer: RefCell::new(Data::new()),
            pending_start: RefCell::new(None),
            pending_tail: RefCell::new(None),
            output: OutputChain::new(),
        })
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.pending.get()
    }

    fn buffer_event(&self, event: Event) {
        match event {
            Event::MessageStart(head) => {
                *self.pending_start.borrow_mut() = Some(head);
            }
            Event::Data(data) => {
                self.buffer.borrow_mut().push_data(data);
            }
            other => {
                *self.pending_tail.borrow_mut() = Some(other);
            }
        }
    }

    /// The session this stream was opened against finished starting:
    /// replay whatever got buffered, in order, now that it has somewhere
    /// to go.
    pub(crate) fn flush_pending(&self) {
        self.pending.set(false);
        if let Some(head) = self.pending_start.borrow_mut().take() {
            self.session.forward_to_pipeline(Event::MessageStart(head));
        }
        let buffered = self.buffer.borrow_mut().shift(usize::MAX);
        if !buffered.is_empty() {
            self.session.forward_to_pipeline(Event::Data(buffered));
        }
        if let Some(tail) = self.pending_tail.borrow_mut().take() {
            self.session.forward_to_pipeline(tail);
        }
    }

    /// The session this stream was opened against failed to start:
    /// whatever got buffered never had a sub-pipeline to reach, so answer
    /// with a synthesized failure instead of replaying it.
    pub(crate) fn fail_pending(&self) {
        self.pending.set(false);
        *self.pending_start.borrow_mut() = None;
        *self.buffer.borrow_mut() = Data::new();
        *self.pending_tail.borrow_mut() = None;
        self.reply(Event::StreamEnd(StreamEnd::ProtocolError));
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_one_way(&self) -> bool {
        self.one_way
    }

    pub fn is_dedicated(&self) -> bool {
        self.dedicated.get()
    }

    pub fn queued_count(&self) -> usize {
        self.queued_count.get()
    }

    pub(crate) fn mark_dedicated(&self) {
        self.dedicated.set(true);
    }

    /// Record that a request has been written and is awaiting its reply,
    /// for streams enqueued onto the session's reply-routing FIFO.
    pub(crate) fn mark_queued(&self) {
        if !self.one_way {
            self.queued_count.set(self.queued_count.get() + 1);
        }
    }

    pub(crate) fn decrement_queued(&self) -> usize {
        let n = self.queued_count.get().saturating_sub(1);
        self.queued_count.set(n);
        n
    }

    pub(crate) fn is_started(&self) -> bool {
        self.started.get()
    }

    pub(crate) fn mark_started(&self) {
        self.started.set(true);
    }

    pub(crate) fn clear_started(&self) {
        self.started.set(false);
    }

    /// Detach from the session: queued replies still in flight will not
    /// reach this stream's output after this call.
    pub(crate) fn close(self: &Arc<Self>) {
        self.session.close_stream(self);
    }
}

impl EventTarget for Stream {
    /// `write_stream` (§4.3): forward to the shared session's sub-pipeline,
    /// tracking a `MessageStart` as one more queued request awaiting its
    /// reply unless this stream is one-way or already dedicated. While the
    /// session is still starting, events accumulate in `buffer`/
    /// `pending_start` instead (see the type-level doc comment) and are
    /// replayed once it resolves.
    fn input(&self, event: Event) {
        if !self.dedicated.get() && !self.one_way && event.is_message_start() {
            self.mark_queued();
        }
        if self.pending.get() {
            self.buffer_event(event);
            return;
        }
        self.session.forward_to_pipeline(event);
    }
}

impl EventProxy for Stream {
    fn chain(&self, next: Option<conduit_core::Input>) {
        self.output.chain(next);
    }

    /// Deliver a reply event that the session's routing FSM decided
    /// belongs to this stream.
    fn reply(&self, event: Event) {
        self.output.emit(event);
    }
}
