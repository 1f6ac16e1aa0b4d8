use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use conduit_core::runtime::MuxOptions;
use conduit_core::{Event, EventProxy, EventTarget, Input, PipelineInstance, StreamEnd};
use tracing::{debug, trace};

use crate::key::SessionKey;
use crate::stream::Stream;

/// One shared sub-pipeline instance and the streams currently sharing it
/// (§4.3). `Session` is itself the `EventTarget` chained to its
/// sub-pipeline's output, so replies arrive at `input` and get routed to
/// whichever stream is at the head of the FIFO.
pub struct Session {
    share_count: Cell<usize>,
    message_count: Cell<usize>,
    free_time: Cell<Instant>,
    is_pending: Cell<bool>,
    is_closed: Cell<bool>,
    max_queue: usize,
    max_messages: usize,
    pipeline: RefCell<Option<Arc<PipelineInstance>>>,
    stream_queue: RefCell<VecDeque<Arc<Stream>>>,
    pending_streams: RefCell<Vec<Arc<Stream>>>,
    dedicated_stream: RefCell<Option<Arc<Stream>>>,
}

impl Session {
    pub(crate) fn new(options: &MuxOptions) -> Arc<Self> {
        Arc::new(Self {
            share_count: Cell::new(0),
            message_count: Cell::new(0),
            free_time: Cell::new(Instant::now()),
            is_pending: Cell::new(true),
            is_closed: Cell::new(false),
            max_queue: options.max_queue,
            max_messages: options.max_messages,
            pipeline: RefCell::new(None),
            stream_queue: RefCell::new(VecDeque::new()),
            pending_streams: RefCell::new(Vec::new()),
            dedicated_stream: RefCell::new(None),
        })
    }

    pub fn share_count(&self) -> usize {
        self.share_count.get()
    }

    pub fn message_count(&self) -> usize {
        self.message_count.get()
    }

    pub fn is_pending(&self) -> bool {
        self.is_pending.get()
    }

    pub fn is_closed(&self) -> bool {
        self.is_closed.get()
    }

    /// Whether this session may take on one more sharer, per
    /// `max_queue`/`max_messages` (0 means unbounded, per
    /// [`MuxOptions`]'s own convention).
    pub fn can_accept(&self) -> bool {
        !self.is_closed.get()
            && (self.max_queue == 0 || self.share_count.get() < self.max_queue)
            && (self.max_messages == 0 || self.message_count.get() < self.max_messages)
    }

    pub(crate) fn bump_share(&self) {
        self.share_count.set(self.share_count.get() + 1);
        self.message_count.set(self.message_count.get() + 1);
    }

    /// Wire the freshly allocated sub-pipeline and flush every stream that
    /// was opened while this session was still pending (§4.3
    /// "pending-session fan-in"/"write_stream: if caller is pending,
    /// buffer").
    pub(crate) fn start(self: &Arc<Self>, pipeline: Arc<PipelineInstance>, reply_sink: Input) {
        pipeline.chain(Some(reply_sink));
        *self.pipeline.borrow_mut() = Some(pipeline);
        self.is_pending.set(false);
        self.free_time.set(Instant::now());
        for stream in self.pending_streams.borrow_mut().drain(..) {
            stream.flush_pending();
        }
    }

    /// The sub-pipeline failed to start: close the session and answer
    /// every stream that was opened while pending with a synthesized
    /// `StreamEnd{ProtocolError}` (§4.3 failure mode) instead of
    /// replaying whatever they buffered.
    pub(crate) fn fail_start(self: &Arc<Self>) {
        self.is_closed.set(true);
        self.is_pending.set(false);
        for stream in self.pending_streams.borrow_mut().drain(..) {
            self.stream_queue
                .borrow_mut()
                .retain(|s| !Arc::ptr_eq(s, &stream));
            stream.fail_pending();
        }
    }

    pub(crate) fn open_stream(self: &Arc<Self>, one_way: bool) -> Arc<Stream> {
        let stream = Stream::new(Arc::clone(self), one_way);
        if !one_way {
            self.stream_queue.borrow_mut().push_back(Arc::clone(&stream));
        }
        if stream.is_pending() {
            self.pending_streams.borrow_mut().push(Arc::clone(&stream));
        }
        stream
    }

    /// The caller drops interest in `stream`. If nothing is still queued
    /// on it the stream is removed from the reply FIFO right away;
    /// otherwise it stays so a reply already in flight has somewhere to
    /// land. Either way this only releases this stream's share of the
    /// session — recycling the session itself is solely the idle
    /// ticker's job (§4.3, `mux.cpp`'s `Muxer::reset` never frees a
    /// session directly).
    pub fn close_stream(&self, stream: &Arc<Stream>) {
        if stream.queued_count() == 0 {
            self.stream_queue
                .borrow_mut()
                .retain(|s| !Arc::ptr_eq(s, stream));
        }
        self.release_share();
    }

    pub(crate) fn release_share(&self) {
        let n = self.share_count.get().saturating_sub(1);
        self.share_count.set(n);
        if n == 0 {
            self.free_time.set(Instant::now());
        }
    }

    /// Forward a caller-originated event into the shared sub-pipeline.
    pub(crate) fn forward_to_pipeline(&self, event: Event) {
        if let Some(pipeline) = self.pipeline.borrow().as_ref() {
            pipeline.input(event);
        }
    }

    /// Switch this session into dedicated (tunnel) mode: from now on
    /// every reply goes straight to `stream`, bypassing the reply-routing
    /// FSM entirely, sticky until the session closes (§4.3).
    pub(crate) fn dedicate(&self, stream: &Arc<Stream>) {
        stream.mark_dedicated();
        *self.dedicated_stream.borrow_mut() = Some(Arc::clone(stream));
    }

    /// §4.3's reply-routing FSM: dispatch one event from the
    /// sub-pipeline's output to the head of the stream queue.
    ///
    /// `MessageStart`/`Data` always go to the head without consuming it.
    /// `MessageEnd` completes the head's in-flight request: if that was
    /// its last queued reply the stream leaves the queue, otherwise it
    /// stays for its next one. `StreamEnd` ends the shared sub-pipeline
    /// itself — every still-queued stream gets a cloned copy, since none
    /// of them will see a `MessageEnd` of their own now. `Replay` is
    /// treated identically to `NoError` here, matching
    /// `conduit_core::StreamEnd`'s own documented routing rule.
    fn route_reply(&self, event: Event) {
        match event {
            Event::MessageStart(_) | Event::Data(_) => {
                if let Some(head) = self.stream_queue.borrow().front().cloned() {
                    head.reply(event);
                } else {
                    trace!("mux reply with no stream queued, dropping");
                }
            }
            Event::MessageEnd(_) => {
                let head = self.stream_queue.borrow().front().cloned();
                let Some(head) = head else {
                    trace!("mux reply with no stream queued, dropping");
                    return;
                };
                head.reply(event);
                if head.decrement_queued() == 0 {
                    self.stream_queue
                        .borrow_mut()
                        .retain(|s| !Arc::ptr_eq(s, &head));
                }
            }
            Event::StreamEnd(kind) => {
                debug!(?kind, "mux session sub-pipeline ended");
                *self.pipeline.borrow_mut() = None;
                let streams: Vec<_> = self.stream_queue.borrow_mut().drain(..).collect();
                for stream in streams {
                    stream.reply(Event::StreamEnd(kind.clone()));
                }
            }
        }
    }

    /// Eligible for the idle ticker to recycle (§4.3): no current
    /// sharers, plus one of closed / message-cap hit / idle past
    /// `max_idle`.
    pub(crate) fn recycle_eligible(&self, now: Instant, max_idle: Duration) -> bool {
        if self.share_count.get() != 0 {
            return false;
        }
        self.is_closed.get()
            || (self.max_messages != 0 && self.message_count.get() >= self.max_messages)
            || now.duration_since(self.free_time.get()) >= max_idle
    }

    /// Tear the session down: unlink its sub-pipeline and answer any
    /// still-queued streams with `StreamEnd{NoError}`.
    pub(crate) fn unlink(&self) {
        self.is_closed.set(true);
        if let Some(pipeline) = self.pipeline.borrow_mut().take() {
            pipeline.input(Event::StreamEnd(StreamEnd::NoError));
        }
        for stream in self.stream_queue.borrow_mut().drain(..) {
            stream.reply(Event::StreamEnd(StreamEnd::NoError));
        }
    }
}

impl EventTarget for Session {
    fn input(&self, event: Event) {
        if let Some(dedicated) = self.dedicated_stream.borrow().clone() {
            dedicated.reply(event);
            return;
        }
        self.route_reply(event);
    }
}

/// Weakly-held identity for an object-keyed cluster, plus the strong
/// pointer identity used as the pool's map key (§4.3: object keys are
/// held weakly so a cluster never outlives the object it was keyed by).
pub(crate) enum ClusterKey {
    Value(Arc<str>),
    Object {
        weak: Weak<dyn std::any::Any + Send + Sync>,
    },
}

impl ClusterKey {
    fn is_collected(&self) -> bool {
        matches!(self, ClusterKey::Object { weak } if weak.strong_count() == 0)
    }

    pub(crate) fn from_session_key(key: &SessionKey) -> Self {
        match key {
            SessionKey::Value(v) => ClusterKey::Value(Arc::clone(v)),
            SessionKey::Object(_) => ClusterKey::Object {
                weak: key.weak().expect("object key always yields a weak handle"),
            },
        }
    }
}

/// All sessions sharing one key (§4.3). Kept sorted ascending by
/// `share_count` so `find_available` always inspects the least-loaded
/// session first — `select()`'s "bin-pack before opening a new session"
/// rule.
pub struct SessionCluster {
    key: ClusterKey,
    max_idle: Duration,
    sessions: RefCell<Vec<Arc<Session>>>,
}

impl SessionCluster {
    pub(crate) fn new(key: ClusterKey, max_idle: Duration) -> Arc<Self> {
        Arc::new(Self {
            key,
            max_idle,
            sessions: RefCell::new(Vec::new()),
        })
    }

    pub fn session_count(&self) -> usize {
        self.sessions.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.borrow().is_empty()
    }

    pub(crate) fn find_available(&self) -> Option<Arc<Session>> {
        self.sessions.borrow().iter().find(|s| s.can_accept()).cloned()
    }

    pub(crate) fn insert(&self, session: Arc<Session>) {
        self.sessions.borrow_mut().push(session);
        self.resort();
    }

    pub(crate) fn resort(&self) {
        self.sessions
            .borrow_mut()
            .sort_by_key(|s| s.share_count());
    }

    /// Walk sessions from the front (lowest `share_count`) evicting every
    /// one that is recycle-eligible, stopping at the first session that
    /// still has sharers — per §4.3 only clusters whose head is free are
    /// visited at all, and once a non-zero-share session is reached
    /// nothing after it (by sort order) can be free either.
    pub(crate) fn tick(&self, now: Instant) {
        let weak_gone = self.key.is_collected();
        let mut sessions = self.sessions.borrow_mut();
        while let Some(head) = sessions.first() {
            if head.share_count() != 0 {
                break;
            }
            if !(weak_gone || head.recycle_eligible(now, self.max_idle)) {
                break;
            }
            let evicted = sessions.remove(0);
            evicted.unlink();
        }
    }
}
