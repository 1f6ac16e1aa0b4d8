use alloc::boxed::Box;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::cell::RefCell;

use crate::event::Event;

use super::filter::{Filter, FilterIo};
use super::instance::PipelineInstance;
use super::layout::PipelineLayout;

/// Clones each event to one or more sub-pipelines while continuing to emit
/// downstream unmodified (§4.2, "Fork"). Replies from the forked
/// sub-pipelines are not routed back anywhere — a fork's sub-pipelines are
/// one-way fan-out targets, unlike a mux/demux joint filter.
pub struct ForkFilter {
    targets: Vec<Weak<PipelineLayout>>,
    subs: RefCell<Vec<Arc<PipelineInstance>>>,
}

impl ForkFilter {
    pub fn new(targets: Vec<Weak<PipelineLayout>>) -> Self {
        Self {
            targets,
            subs: RefCell::new(Vec::new()),
        }
    }
}

impl Filter for ForkFilter {
    fn clone_box(&self) -> Box<dyn Filter> {
        Box::new(ForkFilter {
            targets: self.targets.clone(),
            subs: RefCell::new(Vec::new()),
        })
    }

    fn reset(&mut self) {
        self.subs.borrow_mut().clear();
    }

    fn process(&mut self, io: &FilterIo<'_>, event: Event) {
        if self.subs.borrow().is_empty() {
            let started: Vec<Arc<PipelineInstance>> = self
                .targets
                .iter()
                .filter_map(Weak::upgrade)
                .map(|layout| io.start_sub_pipeline(&layout, None))
                .collect();
            *self.subs.borrow_mut() = started;
        }
        for sub in self.subs.borrow().iter() {
            crate::plumbing::EventTarget::input(sub.as_ref(), event.clone());
        }
        io.emit(event);
    }

    fn dump(&self, out: &mut dyn core::fmt::Write) -> core::fmt::Result {
        write!(out, "fork({})", self.targets.len())
    }

    fn name(&self) -> &'static str {
        "fork"
    }
}
