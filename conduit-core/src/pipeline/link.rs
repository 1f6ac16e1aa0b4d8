use alloc::boxed::Box;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use crate::error::CoreError;
use crate::event::Event;

use super::filter::{Filter, FilterIo};
use super::instance::PipelineInstance;
use super::layout::PipelineLayout;

thread_local! {
    static BINDING_STACK: RefCell<Vec<Arc<str>>> = RefCell::new(Vec::new());
}

pub(crate) fn push_binding(name: &Arc<str>) {
    BINDING_STACK.with(|stack| stack.borrow_mut().push(Arc::clone(name)));
}

pub(crate) fn pop_binding() {
    BINDING_STACK.with(|stack| {
        stack.borrow_mut().pop();
    });
}

fn is_on_binding_stack(name: &str) -> bool {
    BINDING_STACK.with(|stack| stack.borrow().iter().any(|n| &**n == name))
}

/// Splices a named sub-pipeline into the main chain: the target's output
/// becomes this filter's own output (§4.2, "Link / Use").
///
/// Resolving a name to a layout is the layout builder's job, which this
/// crate doesn't implement — the caller hands in a [`Weak`] handle via
/// [`LinkFilter::set_target`] once the target exists. The handle is weak
/// so a pipeline that links to itself by name doesn't keep its own
/// layout alive through its own filter template.
pub struct LinkFilter {
    target_name: Arc<str>,
    target: RefCell<Option<Weak<PipelineLayout>>>,
    sub: RefCell<Option<Arc<PipelineInstance>>>,
}

impl LinkFilter {
    pub fn new(target_name: impl Into<Arc<str>>) -> Self {
        Self {
            target_name: target_name.into(),
            target: RefCell::new(None),
            sub: RefCell::new(None),
        }
    }

    pub fn set_target(&self, target: Weak<PipelineLayout>) {
        *self.target.borrow_mut() = Some(target);
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }
}

impl Filter for LinkFilter {
    /// Per the open question this crate resolves explicitly (see
    /// `DESIGN.md`): a `link` whose target name is already further up the
    /// layout-binding call stack would recurse into a layout still being
    /// constructed, so it is rejected here rather than left to infinite-
    /// loop or budget itself at runtime.
    fn bind(&mut self) -> Result<(), CoreError> {
        if is_on_binding_stack(&self.target_name) {
            return Err(CoreError::new(
                "pipeline.link_cycle",
                alloc::format!(
                    "link target `{}` is already being bound further up the call stack",
                    self.target_name
                ),
            ));
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Filter> {
        Box::new(LinkFilter {
            target_name: Arc::clone(&self.target_name),
            target: RefCell::new(self.target.borrow().clone()),
            sub: RefCell::new(None),
        })
    }

    fn reset(&mut self) {
        *self.sub.borrow_mut() = None;
    }

    fn process(&mut self, io: &FilterIo<'_>, event: Event) {
        if self.sub.borrow().is_none() {
            let Some(layout) = self.target.borrow().as_ref().and_then(Weak::upgrade) else {
                return;
            };
            let sub = io.start_sub_pipeline(&layout, Some(io.tail_sink()));
            *self.sub.borrow_mut() = Some(sub);
        }
        if let Some(sub) = self.sub.borrow().as_ref() {
            crate::plumbing::EventTarget::input(sub.as_ref(), event);
        }
    }

    fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        write!(out, "link({})", self.target_name)
    }

    fn name(&self) -> &'static str {
        "link"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Data;
    use crate::pipeline::layout::PipelineType;
    use crate::plumbing::{dummy_input, EventFunction, EventTarget};

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

    #[test]
    fn unresolved_target_drops_events_silently() {
        let filter = LinkFilter::new("missing");
        let layout = PipelineLayout::new(
            "caller",
            PipelineType::Named,
            alloc::vec![Box::new(filter) as Box<dyn Filter>],
            0,
        )
        .unwrap();
        let instance = layout.alloc();
        instance.chain(Some(dummy_input()));
        instance.input(Event::Data(Data::from_bytes(b"x")));
    }

    #[test]
    fn self_referential_link_is_rejected_at_bind_time() {
        let target_name: Arc<str> = Arc::from("recursive");
        push_binding(&target_name);
        let mut filter = LinkFilter::new(Arc::clone(&target_name));
        let err = filter.bind().unwrap_err();
        pop_binding();
        assert_eq!(err.code(), "pipeline.link_cycle");
    }

    #[test]
    fn resolved_target_forwards_and_reuses_one_sub_instance() {
        let target = PipelineLayout::new(
            "target",
            PipelineType::Named,
            alloc::vec![Box::new(Echo) as Box<dyn Filter>],
            0,
        )
        .unwrap();
        let filter = LinkFilter::new("target");
        filter.set_target(Arc::downgrade(&target));
        let caller = PipelineLayout::new(
            "caller",
            PipelineType::Named,
            alloc::vec![Box::new(filter) as Box<dyn Filter>],
            0,
        )
        .unwrap();
        let instance = caller.alloc();
        let count = Arc::new(core::sync::atomic::AtomicUsize::new(0));
        struct Counting(Arc<core::sync::atomic::AtomicUsize>);
        impl crate::plumbing::EventTarget for Counting {
            fn input(&self, _event: Event) {
                self.0.fetch_add(1, core::sync::atomic::Ordering::SeqCst);
            }
        }
        instance.chain(Some(Arc::new(Counting(count.clone()))));
        instance.input(Event::Data(Data::from_bytes(b"a")));
        instance.input(Event::Data(Data::from_bytes(b"b")));
        assert_eq!(count.load(core::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(target.active_count(), 1, "one sub-pipeline instance reused across events");
    }
}
