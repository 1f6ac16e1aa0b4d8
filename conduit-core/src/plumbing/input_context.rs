use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use std::cell::RefCell;

/// Anything an [`InputContext`] frame can defer-release at frame exit: a
/// pipeline instance returning to its layout's free list, a buffered
/// event flush, a deferred socket close. One trait covers all three so
/// the frame bookkeeping doesn't need to know about pipelines or sockets.
pub trait AutoRelease {
    fn release(self: Arc<Self>);
}

#[derive(Default)]
struct Frame {
    pipelines: Vec<Arc<dyn AutoRelease>>,
    flushes: Vec<Box<dyn FnOnce()>>,
    closes: Vec<Box<dyn FnOnce()>>,
}

thread_local! {
    static STACK: RefCell<Vec<Frame>> = RefCell::new(Vec::new());
}

/// Thread-local RAII frame delimiting one "tick" of event processing
/// (§4.1). Filters that cause reentrant emission (a parser handing back
/// several messages from one `read`) would otherwise force per-event pool
/// churn; instead, deferred releases accumulate in the current frame and
/// run once, in order, when the outermost `InputContext` for this thread
/// drops:
///
/// 1. pipeline instances marked auto-release return to their layout pool;
/// 2. buffered events that asked for end-of-context delivery flush;
/// 3. sockets that requested a deferred close, close.
///
/// Frames nest (a filter's `process()` can itself enter a new frame while
/// handling an event raised from within an outer frame); only the
/// outermost frame's drop actually runs the deferred work for itself —
/// inner frames run their own deferred work at their own (earlier) drop,
/// which is what lets a sub-pipeline's auto-release happen before its
/// caller's frame completes, honoring the ordering in-flight `process()`
/// calls need (§3, "PipelineInstance" lifecycle).
pub struct InputContext {
    _not_send: core::marker::PhantomData<*const ()>,
}

impl InputContext {
    pub fn enter() -> Self {
        STACK.with(|s| s.borrow_mut().push(Frame::default()));
        Self {
            _not_send: core::marker::PhantomData,
        }
    }

    /// Mark `releasable` for release at the current frame's exit. Called
    /// with no active frame (e.g. from test code that forgot to enter
    /// one) releases immediately rather than leaking.
    pub fn auto_release(releasable: Arc<dyn AutoRelease>) {
        let handled = STACK.with(|s| {
            let mut stack = s.borrow_mut();
            if let Some(frame) = stack.last_mut() {
                frame.pipelines.push(releasable.clone());
                true
            } else {
                false
            }
        });
        if !handled {
            releasable.release();
        }
    }

    pub fn defer_flush(f: impl FnOnce() + 'static) {
        let leftover = STACK.with(|s| {
            let mut stack = s.borrow_mut();
            if let Some(frame) = stack.last_mut() {
                frame.flushes.push(Box::new(f));
                None
            } else {
                Some(f)
            }
        });
        if let Some(f) = leftover {
            f();
        }
    }

    pub fn defer_close(f: impl FnOnce() + 'static) {
        let leftover = STACK.with(|s| {
            let mut stack = s.borrow_mut();
            if let Some(frame) = stack.last_mut() {
                frame.closes.push(Box::new(f));
                None
            } else {
                Some(f)
            }
        });
        if let Some(f) = leftover {
            f();
        }
    }

    /// Number of frames currently open on this thread. Exposed for tests
    /// asserting the stack unwinds correctly across nested `enter()`s.
    pub fn depth() -> usize {
        STACK.with(|s| s.borrow().len())
    }
}

impl Drop for InputContext {
    fn drop(&mut self) {
        let frame = STACK.with(|s| s.borrow_mut().pop());
        let Some(frame) = frame else { return };
        for pipeline in frame.pipelines {
            pipeline.release();
        }
        for flush in frame.flushes {
            flush();
        }
        for close in frame.closes {
            close();
        }
    }
}
