use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::CoreError;

use super::filter::Filter;
use super::instance::PipelineInstance;

/// Named role a layout fills, per §4.2. Purely descriptive — nothing in
/// this crate branches on it except diagnostics; the listener/task/admin
/// surfaces that care about a layout's role live in the crates that
/// actually expose those entry points.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PipelineType {
    Named,
    Listen,
    Task,
    Exit,
    Admin,
    Watch,
}

/// A bound, reusable filter chain template plus its instance pool
/// (§4.2). One `PipelineLayout` is built per reactor thread from the same
/// source description — layouts are never shared across threads, which is
/// why the free list below is a plain `Mutex` rather than anything
/// lock-free: contention is impossible by construction, so the lock is
/// never actually held by more than one thread.
pub struct PipelineLayout {
    name: Arc<str>,
    kind: PipelineType,
    templates: Vec<Box<dyn Filter>>,
    slot_count: usize,
    free_list: Mutex<Vec<Arc<PipelineInstance>>>,
    active_count: AtomicUsize,
    shutting_down: AtomicBool,
}

impl PipelineLayout {
    /// Binds every filter template once, then wraps the layout for
    /// sharing. A bind failure (an unresolved `link` target, a malformed
    /// static config) aborts the whole layout — partially-bound layouts
    /// are never exposed, matching §4.2's "`bind()` — called once at
    /// layout load" contract.
    pub fn new(
        name: impl Into<Arc<str>>,
        kind: PipelineType,
        mut filters: Vec<Box<dyn Filter>>,
        slot_count: usize,
    ) -> Result<Arc<Self>, CoreError> {
        let name: Arc<str> = name.into();
        // A `link` filter's bind() consults this stack to catch a target
        // that is still being bound further up — see `super::link`.
        super::link::push_binding(&name);
        let bind_result: Result<(), CoreError> = (|| {
            for filter in filters.iter_mut() {
                filter.bind()?;
            }
            Ok(())
        })();
        super::link::pop_binding();
        bind_result?;
        Ok(Arc::new(Self {
            name,
            kind,
            templates: filters,
            slot_count,
            free_list: Mutex::new(Vec::new()),
            active_count: AtomicUsize::new(0),
            shutting_down: AtomicBool::new(false),
        }))
    }

    /// Produce a pipeline instance ready to receive events: reused from
    /// the free list when one is available, freshly cloned from the
    /// bound templates otherwise.
    pub fn alloc(self: &Arc<Self>) -> Arc<PipelineInstance> {
        let reused = self.free_list.lock().unwrap().pop();
        self.active_count.fetch_add(1, Ordering::AcqRel);
        if let Some(instance) = reused {
            instance.reset_filters();
            return instance;
        }
        let filters = self
            .templates
            .iter()
            .map(|f| RefCell::new(f.clone_box()))
            .collect();
        PipelineInstance::new_arc(Arc::clone(self), filters, self.slot_count)
    }

    /// Return `instance` to the free list for reuse, unless this layout
    /// has since been retired (a reload superseded it) — in that case the
    /// instance is dropped instead of pooled, per §4.6's reload handoff.
    pub(crate) fn recycle(&self, instance: Arc<PipelineInstance>) {
        self.active_count.fetch_sub(1, Ordering::AcqRel);
        if self.shutting_down.load(Ordering::Acquire) {
            return;
        }
        instance.reset_filters();
        self.free_list.lock().unwrap().push(instance);
    }

    /// Mark the layout as retired: no further instances are pooled, and
    /// the existing free list is dropped. Active instances keep running
    /// until their own `StreamEnd` unwinds them, per §4.6's drain rule.
    pub fn retire(&self) {
        self.shutting_down.store(true, Ordering::Release);
        self.free_list.lock().unwrap().clear();
    }

    /// Whether `retire()` has been called — a reload superseded this
    /// layout. Callers that hold onto a layout across an `await`-free
    /// boundary (e.g. a keyed session pool deciding whether to start a
    /// fresh sub-pipeline against it) consult this to refuse starting new
    /// work against a layout that is being drained, per §4.6.
    pub fn is_retired(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PipelineType {
        self.kind
    }

    pub fn active_count(&self) -> usize {
        self.active_count.load(Ordering::Acquire)
    }

    pub fn pooled_count(&self) -> usize {
        self.free_list.lock().unwrap().len()
    }
}
