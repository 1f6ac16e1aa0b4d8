use alloc::boxed::Box;
use alloc::sync::Arc;
use core::fmt;

use crate::context::Context;
use crate::error::CoreError;
use crate::event::Event;

use super::instance::PipelineInstance;
use crate::plumbing::EventFunction;

/// The unit of composition (§4.2). A filter instance belongs to exactly
/// one [`PipelineInstance`] for its whole lifetime; what moves between
/// pipeline instances is the *template* a [`super::layout::PipelineLayout`]
/// clones from, never a live filter.
///
/// # Contracts
/// - `bind` runs once, on the layout's template, before any instance is
///   ever allocated — this is where a filter resolves a named pipeline
///   reference or validates its own configuration, and the only place it
///   is allowed to fail.
/// - `clone_box` produces the per-instance copy `PipelineLayout::alloc`
///   hands out. Shallow-copy references to immutable layout data (the
///   resolved target from `bind`); deep-copy anything the instance will
///   mutate.
/// - `reset` restores a recycled instance's filter to the state
///   `clone_box` would have produced, so the free-list in
///   [`super::layout::PipelineLayout`] can hand it to an unrelated
///   connection without carrying over stale state.
/// - `process` is the hot path: react to one event, optionally call
///   `FilterIo::emit` zero or more times.
pub trait Filter {
    fn bind(&mut self) -> Result<(), CoreError> {
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Filter>;

    fn reset(&mut self) {}

    fn process(&mut self, io: &FilterIo<'_>, event: Event);

    /// Short, single-line description for `pipy dump`-style diagnostics.
    /// Most filters can rely on the default; only filters with
    /// per-instance state worth surfacing (a mux's share key, a link's
    /// resolved target) override it.
    fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        out.write_str(self.name())
    }

    fn name(&self) -> &'static str;
}

/// Handed to a filter's `process()` call: its one-hop downstream outlet
/// and a read-only view of the instance it belongs to.
///
/// Deliberately not `Clone`/storable — a filter must not hold onto an
/// `emit` capability past the `process()` call it was given in, since the
/// chain it closes over can be re-pointed by a later reload.
pub struct FilterIo<'a> {
    pub(crate) instance: &'a PipelineInstance,
    pub(crate) index: usize,
}

impl<'a> FilterIo<'a> {
    /// Deliver `event` to the next filter in the chain, or to the
    /// instance's output chain if this is the last filter.
    pub fn emit(&self, event: Event) {
        self.instance.process_at(self.index + 1, event);
    }

    pub fn context(&self) -> Arc<Context> {
        self.instance.context()
    }

    /// A persisted handle to this instance's own output chain, for
    /// filters whose downstream reply arrives outside the call stack of
    /// any single `process()` invocation. See
    /// [`PipelineInstance::tail_sink`].
    pub fn tail_sink(&self) -> crate::plumbing::Input {
        self.instance.tail_sink()
    }

    /// Allocate a sub-pipeline instance from `layout`, wired to reply
    /// through `reply_sink` if given. Filters that front a sub-pipeline
    /// (`fork`, `link`, `mux`) call this from `process`, typically once
    /// per declared slot — see §4.2's sub-pipeline start note.
    pub fn start_sub_pipeline(
        &self,
        layout: &Arc<super::layout::PipelineLayout>,
        reply_sink: Option<crate::plumbing::Input>,
    ) -> Arc<PipelineInstance> {
        let sub = layout.alloc();
        if reply_sink.is_some() {
            sub.chain(reply_sink);
        }
        sub
    }
}
