use alloc::boxed::Box;
use core::any::Any;

/// Opaque protocol metadata carried by a [`crate::event::Event::MessageStart`].
///
/// Concrete protocol filters (HTTP, DNS, RESP, ...) are out of scope here
/// per §1 — the core only needs to move the head object through the
/// pipeline untouched and let filters downcast it via `as_any`.
pub trait Head: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Send + Sync> Head for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Start-of-message boundary. Carries an optional protocol head (request
/// line + headers, for example); the head type itself is opaque to the
/// core per §1 / §3.
#[derive(Clone)]
pub struct MessageStart {
    head: Option<alloc::sync::Arc<dyn Head>>,
}

impl MessageStart {
    pub fn new() -> Self {
        Self { head: None }
    }

    pub fn with_head(head: alloc::sync::Arc<dyn Head>) -> Self {
        Self { head: Some(head) }
    }

    pub fn head(&self) -> Option<&(dyn Head + 'static)> {
        self.head.as_deref()
    }

    /// Consume `self`, handing back the head `Arc` rather than a
    /// borrowed reference. Used by [`crate::runtime::queue`] to project a
    /// `MessageStart` across a thread boundary without cloning the head.
    pub fn into_head(self) -> Option<alloc::sync::Arc<dyn Head>> {
        self.head
    }
}

impl Default for MessageStart {
    fn default() -> Self {
        Self::new()
    }
}

/// End-of-message boundary. Carries an optional tail (trailers) and an
/// optional payload, matching §3's `MessageEnd { tail, payload }`.
#[derive(Clone, Default)]
pub struct MessageEnd {
    tail: Option<alloc::sync::Arc<dyn Head>>,
    payload: Option<Box<super::data::Data>>,
}

impl MessageEnd {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tail(mut self, tail: alloc::sync::Arc<dyn Head>) -> Self {
        self.tail = Some(tail);
        self
    }

    pub fn with_payload(mut self, payload: super::data::Data) -> Self {
        self.payload = Some(Box::new(payload));
        self
    }

    pub fn tail(&self) -> Option<&(dyn Head + 'static)> {
        self.tail.as_deref()
    }

    pub fn payload(&self) -> Option<&super::data::Data> {
        self.payload.as_deref()
    }

    /// Consume `self`, handing back `(tail, payload)` by value. See
    /// [`MessageStart::into_head`] for why this exists alongside the
    /// borrowing accessors.
    pub fn into_parts(self) -> (Option<alloc::sync::Arc<dyn Head>>, Option<super::data::Data>) {
        (self.tail, self.payload.map(|boxed| *boxed))
    }
}
