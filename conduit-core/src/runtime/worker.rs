use alloc::string::String;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use arc_swap::ArcSwap;
use tokio::sync::oneshot;

use crate::error::CoreError;
use crate::pipeline::PipelineLayout;

/// Outcome of a worker's start barrier (§4.6 Startup protocol step 1),
/// adopted from the original source's `worker-thread.cpp` blocking-start
/// pattern: the spawning thread awaits exactly one of these per worker
/// before treating the process as live.
#[derive(Debug)]
pub enum StartOutcome {
    Started,
    Failed(CoreError),
}

/// One OS thread running a single-threaded cooperative reactor (§4.6,
/// §5). `WorkerThread` itself does not own the reactor loop — that lives
/// in `conduit-transport-tcp`'s runtime glue, which actually has sockets
/// to drive — it owns the lifecycle bookkeeping every worker needs
/// regardless of what it's listening on: the start barrier, the pipeline
/// drain count for graceful shutdown, and the atomic generation counter
/// a reload bumps.
pub struct WorkerThread {
    name: String,
    generation: AtomicUsize,
    live_pipelines: AtomicUsize,
    stopping: AtomicBool,
}

impl WorkerThread {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            generation: AtomicUsize::new(0),
            live_pipelines: AtomicUsize::new(0),
            stopping: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `start_entry_module` (loading layouts/tasks/listeners, per
    /// §4.6 step 2) and report the outcome on a one-shot channel. The
    /// caller (main) holds the receiver and blocks on it as the start
    /// barrier; `force` lets a caller proceed even if `start_entry_module`
    /// fails, matching "failure aborts start unless `force=true`".
    pub fn spawn<F>(self: &Arc<Self>, force: bool, start_entry_module: F) -> oneshot::Receiver<StartOutcome>
    where
        F: FnOnce() -> Result<(), CoreError> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let worker = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let outcome = match start_entry_module() {
                Ok(()) => StartOutcome::Started,
                Err(err) if force => {
                    tracing::warn!(worker = worker.name(), error = %err, "start failed, proceeding (force)");
                    StartOutcome::Started
                }
                Err(err) => StartOutcome::Failed(err),
            };
            let _ = tx.send(outcome);
        });
        rx
    }

    pub fn pipeline_started(&self) {
        self.live_pipelines.fetch_add(1, Ordering::AcqRel);
    }

    pub fn pipeline_ended(&self) {
        self.live_pipelines.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn live_pipeline_count(&self) -> usize {
        self.live_pipelines.load(Ordering::Acquire)
    }

    /// §4.6 Reload protocol step 2: bump the generation counter once a
    /// replacement module has bound successfully. In-flight pipelines
    /// keep running against their own (already-captured) layout `Arc`s —
    /// bumping the generation only changes what *new* inbound work binds
    /// to, never what existing instances reference.
    pub fn advance_generation(&self) -> usize {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn generation(&self) -> usize {
        self.generation.load(Ordering::Acquire)
    }

    /// §4.6 Shutdown, graceful branch: mark stopping so listeners refuse
    /// new inbound work; the caller is responsible for running exit
    /// hooks and waiting on `live_pipeline_count() == 0` before actually
    /// tearing the reactor down.
    pub fn begin_graceful_shutdown(&self) {
        self.stopping.store(true, Ordering::Release);
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    pub fn is_drained(&self) -> bool {
        self.live_pipeline_count() == 0
    }
}

/// The hot-swappable binding from one entry point (a `listen()`
/// registration) to the [`PipelineLayout`] new inbound work should bind
/// to right now — §4.6 reload protocol step 3, "swap the generation's
/// listeners onto the new layout". Grounded on the same lock-free
/// whole-value-replace pattern the original source's `worker-thread.cpp`
/// uses for reload and that `OutputChain` already uses in this crate for
/// its read-mostly, rarely-written chain pointer.
///
/// Reading the current layout (`current()`) never blocks. A reload
/// installs the replacement and retires the outgoing layout so it drains
/// (`PipelineLayout::retire`) rather than keeps pooling instances;
/// in-flight pipeline instances hold their own `Arc<PipelineLayout>`
/// captured at `alloc` time and are unaffected. Only the next accepted
/// connection sees the new layout.
pub struct LayoutSlot {
    current: ArcSwap<PipelineLayout>,
}

impl LayoutSlot {
    pub fn new(initial: Arc<PipelineLayout>) -> Self {
        Self {
            current: ArcSwap::from(initial),
        }
    }

    pub fn current(&self) -> Arc<PipelineLayout> {
        self.current.load_full()
    }

    /// Install `replacement` for new work, retire the outgoing layout, and
    /// bump `worker`'s generation counter (§4.6 reload step 3). Returns
    /// the retired layout so the caller can watch
    /// [`PipelineLayout::active_count`] drain it to zero before, say,
    /// logging the reload complete.
    pub fn reload(&self, replacement: Arc<PipelineLayout>, worker: &WorkerThread) -> Arc<PipelineLayout> {
        let previous = self.current.swap(replacement);
        previous.retire();
        worker.advance_generation();
        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_start_reports_started() {
        let worker = WorkerThread::new("w0");
        let rx = worker.spawn(false, || Ok(()));
        match rx.await.unwrap() {
            StartOutcome::Started => {}
            StartOutcome::Failed(e) => panic!("unexpected failure: {e}"),
        }
    }

    #[tokio::test]
    async fn failed_start_without_force_reports_failed() {
        let worker = WorkerThread::new("w0");
        let rx = worker.spawn(false, || Err(CoreError::new("worker.bind_failed", "bad layout")));
        match rx.await.unwrap() {
            StartOutcome::Failed(_) => {}
            StartOutcome::Started => panic!("expected failure to propagate"),
        }
    }

    #[tokio::test]
    async fn failed_start_with_force_reports_started() {
        let worker = WorkerThread::new("w0");
        let rx = worker.spawn(true, || Err(CoreError::new("worker.bind_failed", "bad layout")));
        match rx.await.unwrap() {
            StartOutcome::Started => {}
            StartOutcome::Failed(_) => panic!("force=true must swallow the failure"),
        }
    }

    #[test]
    fn generation_advances_monotonically_across_reloads() {
        let worker = WorkerThread::new("w0");
        assert_eq!(worker.generation(), 0);
        assert_eq!(worker.advance_generation(), 1);
        assert_eq!(worker.advance_generation(), 2);
    }

    #[test]
    fn drain_tracks_live_pipeline_count() {
        let worker = WorkerThread::new("w0");
        worker.pipeline_started();
        worker.pipeline_started();
        assert!(!worker.is_drained());
        worker.pipeline_ended();
        assert!(!worker.is_drained());
        worker.pipeline_ended();
        assert!(worker.is_drained());
    }

    fn pass_through_layout(name: &str) -> Arc<PipelineLayout> {
        use crate::event::Event;
        use crate::pipeline::filter::{Filter, FilterIo};
        use crate::pipeline::PipelineType;

        struct PassThrough;
        impl Filter for PassThrough {
            fn clone_box(&self) -> alloc::boxed::Box<dyn Filter> {
                alloc::boxed::Box::new(PassThrough)
            }
            fn process(&mut self, io: &FilterIo<'_>, event: Event) {
                io.emit(event);
            }
            fn name(&self) -> &'static str {
                "pass-through"
            }
        }

        PipelineLayout::new(
            name,
            PipelineType::Listen,
            alloc::vec![alloc::boxed::Box::new(PassThrough) as alloc::boxed::Box<dyn Filter>],
            0,
        )
        .unwrap()
    }

    #[test]
    fn reload_installs_the_replacement_and_retires_the_outgoing_layout() {
        let original = pass_through_layout("v1");
        let slot = LayoutSlot::new(Arc::clone(&original));
        assert_eq!(slot.current().name(), "v1");

        let worker = WorkerThread::new("w0");
        let replacement = pass_through_layout("v2");
        let retired = slot.reload(Arc::clone(&replacement), &worker);

        assert_eq!(slot.current().name(), "v2");
        assert!(retired.is_retired());
        assert!(!replacement.is_retired());
        assert_eq!(worker.generation(), 1, "reload bumps the worker's generation");
    }

    #[test]
    fn in_flight_instances_keep_their_own_layout_across_a_reload() {
        let original = pass_through_layout("v1");
        let slot = LayoutSlot::new(Arc::clone(&original));
        let in_flight = slot.current().alloc();

        slot.reload(pass_through_layout("v2"), &WorkerThread::new("w0"));

        assert_eq!(in_flight.layout().name(), "v1");
        assert_eq!(slot.current().name(), "v2");
    }
}
