//! Port-aware TCP/UDP admission path (§4.4): listeners that bind sockets,
//! enforce the shared [`Port`](conduit_core::runtime::Port) admission gate
//! across every listener on the same `(protocol, ip, port)`, and chain
//! each accepted connection or datagram peer into a fresh pipeline
//! instance.
//!
//! Everything here is `std`-only — sockets and OS timers are not
//! `no_std`-portable, same split as `conduit-core`'s own `runtime` module.

pub mod error;
pub mod inbound;
pub mod listener;
pub mod udp;

pub use error::TransportError;
pub use inbound::TcpInbound;
pub use listener::TcpListener;
pub use udp::UdpListener;
