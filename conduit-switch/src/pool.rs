use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use conduit_core::runtime::MuxOptions;
use conduit_core::{EventProxy, EventTarget, Input, PipelineLayout};
use tracing::trace;

use crate::key::SessionKey;
use crate::session::{ClusterKey, Session, SessionCluster};
use crate::stream::Stream;

/// Keyed session pool backing `mux`/`merge` (§4.3). One pool exists per
/// `mux` filter declaration (shared by every `PipelineInstance` cloned
/// from that filter's template); it is not `Send`/`Sync` and is never
/// shared across worker threads, matching §5's "session pool: per-thread
/// only".
#[derive(Default)]
pub struct SessionPool {
    by_value: RefCell<HashMap<Arc<str>, Arc<SessionCluster>>>,
    by_object: RefCell<HashMap<usize, Arc<SessionCluster>>>,
}

impl SessionPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn cluster_count(&self) -> usize {
        self.by_value.borrow().len() + self.by_object.borrow().len()
    }

    fn cluster_for(&self, key: &SessionKey, max_idle: std::time::Duration) -> Arc<SessionCluster> {
        match key {
            SessionKey::Value(v) => {
                let mut map = self.by_value.borrow_mut();
                Arc::clone(map.entry(Arc::clone(v)).or_insert_with(|| {
                    SessionCluster::new(ClusterKey::from_session_key(key), max_idle)
                }))
            }
            SessionKey::Object(o) => {
                let ptr = Arc::as_ptr(o) as *const () as usize;
                let mut map = self.by_object.borrow_mut();
                Arc::clone(map.entry(ptr).or_insert_with(|| {
                    SessionCluster::new(ClusterKey::from_session_key(key), max_idle)
                }))
            }
        }
    }

    /// `select` (§4.3): reuse the least-loaded acceptable session in the
    /// cluster for `key`, or start a fresh one against `layout`.
    ///
    /// `layout.alloc()` itself cannot fail in this runtime, but a layout
    /// that a reload has since [`retire`](PipelineLayout::retire)d refuses
    /// to start new work at all (§4.6): selecting against one fails the
    /// session immediately instead of handing out a sub-pipeline that
    /// would just be orphaned, which is this crate's real, production
    /// trigger for [`Session::fail_start`]'s `StreamEnd{ProtocolError}`
    /// path. Every stream opened against the session before this resolves
    /// sees that same pending-then-fail sequence through
    /// [`Stream`]'s own buffer.
    pub fn select(
        self: &Arc<Self>,
        key: SessionKey,
        options: &MuxOptions,
        layout: &Arc<PipelineLayout>,
    ) -> Arc<Session> {
        let cluster = self.cluster_for(&key, options.max_idle);
        if let Some(existing) = cluster.find_available() {
            existing.bump_share();
            cluster.resort();
            trace!(shares = existing.share_count(), "reused existing mux session");
            return existing;
        }

        let session = Session::new(options);
        cluster.insert(Arc::clone(&session));
        session.bump_share();
        cluster.resort();

        if layout.is_retired() {
            trace!("mux sub-pipeline layout retired, failing new session");
            session.fail_start();
            return session;
        }

        let instance = layout.alloc();
        let reply_sink: Input = Arc::clone(&session) as Input;
        session.start(instance, reply_sink);
        trace!("started new mux session");
        session
    }

    pub fn open_stream(&self, session: &Arc<Session>, one_way: bool) -> Arc<Stream> {
        session.open_stream(one_way)
    }

    /// Drive idle recycling (§4.3): evict recycle-eligible sessions from
    /// every cluster, then drop clusters left with nothing in them. Has
    /// no timer of its own — whatever owns the reactor loop calls this
    /// once a second, keeping this crate free of a hard dependency on any
    /// particular async runtime.
    pub fn tick(&self, now: Instant) {
        self.by_value.borrow_mut().retain(|_, cluster| {
            cluster.tick(now);
            !cluster.is_empty()
        });
        self.by_object.borrow_mut().retain(|_, cluster| {
            cluster.tick(now);
            !cluster.is_empty()
        });
    }
}
