//! Domain-agnostic L5 scheduling primitives: the shared [`Port`] admission
//! gate, the cross-thread [`queue::EventQueue`] and [`async_wrapper`]
//! bridge, and the [`worker`] lifecycle bookkeeping every worker thread
//! needs regardless of what it's listening on.
//!
//! Everything here requires `std` — sockets, OS threads, and
//! `tokio`-backed channels are not `no_std`-portable, unlike the event
//! model and pipeline modules.

pub mod async_wrapper;
pub mod config;
pub mod port;
pub mod queue;
pub mod worker;

pub use async_wrapper::{AsyncWrapper, AsyncWrapperSink};
pub use config::{ListenOptions, ListenOptionsBuilder, MuxOptions, MuxOptionsBuilder};
pub use port::{Port, PortRegistry};
pub use queue::{EventQueue, EventQueueReceiver, SharedEvent};
pub use worker::{LayoutSlot, StartOutcome, WorkerThread};
