//! Keyed session multiplexer (L4, §4.3): shares one sub-pipeline across
//! many callers keyed by value or object identity, with idle recycling
//! and dedicated (tunnel) streams. Builds on `conduit-core`'s event and
//! pipeline primitives; everything here is confined to a single worker
//! thread, matching §5's "session pool: per-thread only" rule — this
//! crate never reaches for an async runtime or a thread-safe map.

mod error;
mod key;
mod muxer;
mod pool;
mod session;
mod stream;

pub use error::SwitchError;
pub use key::SessionKey;
pub use muxer::Muxer;
pub use pool::SessionPool;
pub use session::{Session, SessionCluster};
pub use stream::Stream;
