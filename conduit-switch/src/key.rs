use std::any::Any;
use std::sync::{Arc, Weak};

/// What a caller wants to share a session by (§4.3). A value key groups
/// callers that resolve to the same logical target — typically a host
/// string pulled out of the request. An object key groups callers by
/// identity of some other object already on hand (e.g. a route's own
/// `Arc` marker), held only weakly so a cluster never outlives the thing
/// it was keyed by.
#[derive(Clone)]
pub enum SessionKey {
    Value(Arc<str>),
    Object(Arc<dyn Any + Send + Sync>),
}

impl SessionKey {
    pub fn value(v: impl Into<Arc<str>>) -> Self {
        SessionKey::Value(v.into())
    }

    pub fn object(o: Arc<dyn Any + Send + Sync>) -> Self {
        SessionKey::Object(o)
    }
}

/// The map key a [`crate::pool::SessionPool`] actually indexes by: an
/// object key is reduced to its pointer identity so two callers sharing
/// the same `Arc` hash to the same bucket without the pool needing `Hash`
/// on the pointee.
#[derive(Clone, PartialEq, Eq, Hash)]
pub(crate) enum KeyIdentity {
    Value(Arc<str>),
    Object(usize),
}

impl SessionKey {
    pub(crate) fn identity(&self) -> KeyIdentity {
        match self {
            SessionKey::Value(v) => KeyIdentity::Value(Arc::clone(v)),
            SessionKey::Object(o) => {
                KeyIdentity::Object(Arc::as_ptr(o) as *const () as usize)
            }
        }
    }

    pub(crate) fn weak(&self) -> Option<Weak<dyn Any + Send + Sync>> {
        match self {
            SessionKey::Value(_) => None,
            SessionKey::Object(o) => Some(Arc::downgrade(o)),
        }
    }
}
