use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::any::Any;
use core::cell::RefCell;

/// Per-pipeline mutable scratch space: a typed slot vector indexed by
/// module, plus an optional parent for inheritance (§3, "Context").
///
/// # Why
/// The layout builder (out of scope, §1) reserves variable slots ahead of
/// time via `define_variable`; at runtime, filters read/write those slots
/// through a stable integer index rather than a name lookup, which keeps
/// the hot path allocation-free. `Context` is the runtime-side half of
/// that contract: a `Vec<Option<Box<dyn Any>>>` indexed by
/// [`SlotId`], shared by every filter of one pipeline instance and never
/// copied across pipeline instances (§3's lifecycle note) — only a fresh
/// `Context::child()` may inherit a parent's slots by reference.
pub struct Context {
    slots: RefCell<Vec<Option<Box<dyn Any + Send + Sync>>>>,
    parent: Option<Arc<Context>>,
}

/// Stable index into a [`Context`]'s slot vector, handed out by the layout
/// builder's `define_variable` at bind time.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SlotId(pub usize);

impl Context {
    pub fn new(slot_count: usize) -> Self {
        let mut slots = Vec::with_capacity(slot_count);
        slots.resize_with(slot_count, || None);
        Self {
            slots: RefCell::new(slots),
            parent: None,
        }
    }

    /// A context sharing no slots with `self` but reachable from it via
    /// `parent()` for inheritance lookups. Per §3, slots never flow
    /// implicitly between pipeline instances — a child only gets a
    /// *reference* to the parent, never a copy of its slots.
    pub fn child(self: &Arc<Self>, slot_count: usize) -> Context {
        let mut slots = Vec::with_capacity(slot_count);
        slots.resize_with(slot_count, || None);
        Context {
            slots: RefCell::new(slots),
            parent: Some(Arc::clone(self)),
        }
    }

    pub fn parent(&self) -> Option<&Arc<Context>> {
        self.parent.as_ref()
    }

    pub fn set(&self, slot: SlotId, value: impl Any + Send + Sync) {
        let mut slots = self.slots.borrow_mut();
        if slot.0 >= slots.len() {
            slots.resize_with(slot.0 + 1, || None);
        }
        slots[slot.0] = Some(Box::new(value));
    }

    pub fn get<T: Any + Send + Sync + Clone>(&self, slot: SlotId) -> Option<T> {
        let slots = self.slots.borrow();
        slots
            .get(slot.0)
            .and_then(|entry| entry.as_ref())
            .and_then(|boxed| boxed.downcast_ref::<T>())
            .cloned()
    }

    /// Walk up the parent chain until `slot` is set, per the inheritance
    /// contract in §3.
    pub fn get_inherited<T: Any + Send + Sync + Clone>(&self, slot: SlotId) -> Option<T> {
        if let Some(v) = self.get::<T>(slot) {
            return Some(v);
        }
        self.parent.as_ref().and_then(|p| p.get_inherited(slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_roundtrips() {
        let ctx = Context::new(4);
        ctx.set(SlotId(2), 42u32);
        assert_eq!(ctx.get::<u32>(SlotId(2)), Some(42));
        assert_eq!(ctx.get::<u32>(SlotId(0)), None);
    }

    #[test]
    fn child_inherits_from_parent_not_siblings() {
        let parent = Arc::new(Context::new(2));
        parent.set(SlotId(0), "shared".to_string());
        let child = parent.child(2);
        assert_eq!(
            child.get_inherited::<String>(SlotId(0)),
            Some("shared".to_string())
        );
        assert_eq!(child.get::<String>(SlotId(0)), None);
    }
}
