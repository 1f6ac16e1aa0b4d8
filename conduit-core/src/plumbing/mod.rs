//! Event plumbing (L2): how one pipeline stage feeds the next, and the
//! `InputContext` frame that governs deferred resource release.

pub mod function;
pub mod input_context;
pub mod proxy;
pub mod source;
pub mod target;

pub use function::{EventFunction, OutputChain};
pub use input_context::{AutoRelease, InputContext};
pub use proxy::EventProxy;
pub use source::EventSource;
pub use target::{dummy_input, EventTarget, Input};
