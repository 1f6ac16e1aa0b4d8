use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use conduit_core::runtime::MuxOptions;
use conduit_core::{Context, Event, EventProxy, EventTarget, Filter, FilterIo, PipelineLayout, SlotId};

use crate::key::SessionKey;
use crate::pool::SessionPool;
use crate::session::Session;
use crate::stream::Stream;

/// The `mux`/`demux` filter (§4.3/§6): opens a stream against whichever
/// session `key_fn` resolves to, forwards this pipeline's events into it,
/// and chains the stream's replies to this instance's own tail so they
/// flow back out as if `mux` were an ordinary pass-through filter.
///
/// One `Muxer` template (built once per `mux` declaration) owns the
/// shared [`SessionPool`]; `clone_box` shallow-copies that and the other
/// immutable configuration into each `PipelineInstance`'s own copy, which
/// starts with no session or stream of its own.
pub struct Muxer {
    pool: Arc<SessionPool>,
    sub_layout: Arc<PipelineLayout>,
    options: MuxOptions,
    key_fn: Arc<dyn Fn(&Context) -> SessionKey>,
    dedicate_slot: Option<SlotId>,
    session: RefCell<Option<Arc<Session>>>,
    stream: RefCell<Option<Arc<Stream>>>,
}

impl Muxer {
    pub fn new(
        pool: Arc<SessionPool>,
        sub_layout: Arc<PipelineLayout>,
        options: MuxOptions,
        key_fn: impl Fn(&Context) -> SessionKey + 'static,
    ) -> Self {
        Self {
            pool,
            sub_layout,
            options,
            key_fn: Arc::new(key_fn),
            dedicate_slot: None,
            session: RefCell::new(None),
            stream: RefCell::new(None),
        }
    }

    /// Once `ctx.get::<bool>(slot) == Some(true)` on some processed
    /// event, the session this instance is using switches into dedicated
    /// (tunnel) mode — for protocol filters upstream (e.g. one that just
    /// saw a successful `CONNECT`) to signal "stop demultiplexing, this
    /// stream now owns the whole connection".
    pub fn with_dedicate_slot(mut self, slot: SlotId) -> Self {
        self.dedicate_slot = Some(slot);
        self
    }

    fn ensure_stream(&self, io: &FilterIo<'_>) {
        if self.stream.borrow().is_some() {
            return;
        }
        let key = (self.key_fn)(&io.context());
        let session = self.pool.select(key, &self.options, &self.sub_layout);
        let stream = session.open_stream(self.options.is_one_way);
        stream.chain(Some(io.tail_sink()));
        *self.session.borrow_mut() = Some(session);
        *self.stream.borrow_mut() = Some(stream);
    }

    fn detach(&self) {
        if let (Some(session), Some(stream)) =
            (self.session.borrow_mut().take(), self.stream.borrow_mut().take())
        {
            session.close_stream(&stream);
        }
    }
}

impl Filter for Muxer {
    fn clone_box(&self) -> Box<dyn Filter> {
        Box::new(Muxer {
            pool: Arc::clone(&self.pool),
            sub_layout: Arc::clone(&self.sub_layout),
            options: self.options,
            key_fn: Arc::clone(&self.key_fn),
            dedicate_slot: self.dedicate_slot,
            session: RefCell::new(None),
            stream: RefCell::new(None),
        })
    }

    fn reset(&mut self) {
        self.detach();
    }

    fn process(&mut self, io: &FilterIo<'_>, event: Event) {
        if event.is_stream_end() {
            // Caller hangup: drop this instance's share of the session
            // but let the event keep going — the shared sub-pipeline
            // itself is untouched, only this pipeline is tearing down.
            self.detach();
            io.emit(event);
            return;
        }

        self.ensure_stream(io);

        if let Some(slot) = self.dedicate_slot {
            if io.context().get::<bool>(slot) == Some(true) {
                if let (Some(session), Some(stream)) =
                    (self.session.borrow().clone(), self.stream.borrow().clone())
                {
                    session.dedicate(&stream);
                }
            }
        }

        if let Some(stream) = self.stream.borrow().as_ref() {
            stream.input(event);
        }
    }

    fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        match self.session.borrow().as_ref() {
            Some(session) => write!(out, "mux(shares={})", session.share_count()),
            None => out.write_str("mux(unattached)"),
        }
    }

    fn name(&self) -> &'static str {
        "mux"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::{Data, MessageEnd, MessageStart, PipelineType, StreamEnd};
    use std::sync::atomic::{AtomicUsize, Ordering};

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

    fn sub_layout() -> Arc<PipelineLayout> {
        PipelineLayout::new(
            "echo",
            PipelineType::Named,
            vec![Box::new(Echo) as Box<dyn Filter>],
            0,
        )
        .unwrap()
    }

    struct Collect(Arc<AtomicUsize>);
    impl EventTarget for Collect {
        fn input(&self, _event: Event) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn two_instances_sharing_a_key_see_one_session() {
        let pool = SessionPool::new();
        let options = MuxOptions::builder().build().unwrap();
        let template = Muxer::new(pool, sub_layout(), options, |_ctx| SessionKey::value("svc"));
        let outer_layout = PipelineLayout::new(
            "outer",
            PipelineType::Named,
            vec![Box::new(template) as Box<dyn Filter>],
            0,
        )
        .unwrap();

        let a = outer_layout.alloc();
        let b = outer_layout.alloc();
        let replies = Arc::new(AtomicUsize::new(0));
        a.chain(Some(Arc::new(Collect(replies.clone())) as conduit_core::Input));
        b.chain(Some(Arc::new(Collect(replies.clone())) as conduit_core::Input));

        a.input(Event::MessageStart(MessageStart::new()));
        a.input(Event::Data(Data::from_bytes(b"x")));
        a.input(Event::MessageEnd(MessageEnd::new()));

        b.input(Event::MessageStart(MessageStart::new()));
        b.input(Event::MessageEnd(MessageEnd::new()));

        assert_eq!(replies.load(Ordering::SeqCst), 5, "echo loops every event back");
    }

    #[test]
    fn stream_end_detaches_without_closing_the_shared_session() {
        let pool = SessionPool::new();
        let options = MuxOptions::builder().build().unwrap();
        let template = Muxer::new(pool.clone(), sub_layout(), options, |_ctx| {
            SessionKey::value("svc")
        });
        let outer_layout = PipelineLayout::new(
            "outer",
            PipelineType::Named,
            vec![Box::new(template) as Box<dyn Filter>],
            0,
        )
        .unwrap();

        let a = outer_layout.alloc();
        a.chain(Some(conduit_core::dummy_input()));
        a.input(Event::MessageStart(MessageStart::new()));
        {
            let _ctx = conduit_core::InputContext::enter();
            a.input(Event::StreamEnd(StreamEnd::NoError));
        }
        assert_eq!(pool.cluster_count(), 1, "caller hangup must not tear the session down");
    }
}
