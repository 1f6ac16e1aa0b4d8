#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]

//! Event-pipeline runtime core: the event model, pipeline/filter
//! composition, and the thread-confined plumbing that wires them
//! together. Everything above L3 (listeners, session multiplexing,
//! worker-thread orchestration) lives in sibling crates — this crate is
//! deliberately data-plane-only.
//!
//! # Memory model
//! Like the runtime this crate is descended from, the event model and
//! pipeline machinery (`event`, `plumbing`, `pipeline`, `context`) are
//! `alloc`-only and work under `no_std`. Anything that needs OS threads,
//! timers, or a `std::error::Error` chain (`error`, `runtime`) is gated
//! behind the `std` feature, which is on by default.

extern crate alloc;

pub mod context;
pub mod event;
pub mod pipeline;
pub mod plumbing;

#[cfg(feature = "std")]
pub mod error;
#[cfg(feature = "std")]
pub mod runtime;

pub use context::{Context, SlotId};
pub use event::{concat, Data, Event, Head, MessageEnd, MessageStart, StreamEnd, CHUNK_SIZE};
pub use pipeline::{
    EchoFilter, Filter, FilterIo, ForkFilter, LinkFilter, PipelineInstance, PipelineLayout,
    PipelineType, SinkFilter,
};
pub use plumbing::{dummy_input, AutoRelease, EventFunction, EventProxy, EventSource, EventTarget, Input, InputContext, OutputChain};

#[cfg(feature = "std")]
pub use error::{CoreError, ErrorCategory, Result};
