use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use conduit_core::runtime::{LayoutSlot, ListenOptions, Port, PortRegistry, WorkerThread};
use conduit_core::{EventFunction, Input, PipelineLayout};
use tokio::net::TcpListener as TokioTcpListener;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::error::TransportError;
use crate::inbound::TcpInbound;

fn next_listener_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// One `listen(tcp, ip, port, ...)` registration (§4.4). Owns the bound
/// socket and its own per-listener connection cap; the shared [`Port`] it
/// is attached to additionally caps admission across every listener bound
/// to the same `(protocol, ip, port)`.
pub struct TcpListener {
    id: u64,
    local_addr: SocketAddr,
    port: Arc<Port>,
    max_connections: usize,
    num_connections: AtomicUsize,
    paused: AtomicBool,
    resume: Notify,
}

impl TcpListener {
    /// Bind the socket and register with the shared [`Port`] for this
    /// `(protocol, ip, port)` — looked up (or created, with `options`'s
    /// `max_port_connections`) in `registry` — but do not start accepting
    /// yet: `serve` drives the acceptor loop once the caller has a
    /// pipeline layout ready to chain inbounds into.
    pub async fn bind(
        addr: SocketAddr,
        registry: &PortRegistry,
        options: &ListenOptions,
    ) -> Result<(Arc<Self>, TokioTcpListener), TransportError> {
        let std_listener =
            TokioTcpListener::bind(addr)
                .await
                .map_err(|source| TransportError::BindFailed {
                    protocol: "tcp",
                    addr: addr.to_string(),
                    source,
                })?;
        let local_addr = std_listener.local_addr().unwrap_or(addr);
        let port = registry.get_or_create(&format!("tcp/{local_addr}"), options.max_port_connections);
        let id = next_listener_id();
        port.attach_listener(id);
        let listener = Arc::new(Self {
            id,
            local_addr,
            port,
            max_connections: options.max_connections,
            num_connections: AtomicUsize::new(0),
            paused: AtomicBool::new(false),
            resume: Notify::new(),
        });
        Ok((listener, std_listener))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn has_capacity(&self) -> bool {
        self.max_connections == 0
            || self.num_connections.load(Ordering::Acquire) < self.max_connections
    }

    /// Run the accept loop (§4.4 steps 1-3) until the socket errors out,
    /// `worker` enters graceful shutdown, or the caller drops the returned
    /// task. Every admitted connection allocates against whatever layout
    /// `layout` currently points to — a [`LayoutSlot::reload`] mid-`serve`
    /// takes effect on the very next accept, while connections already
    /// admitted keep running their own already-captured instance (§4.6).
    ///
    /// Drive this with `tokio::task::spawn_local` inside the worker
    /// thread's `LocalSet`, not `tokio::spawn` — pipeline instances hold
    /// `RefCell`-backed state that must never cross threads (§5).
    pub async fn serve(
        self: Arc<Self>,
        std_listener: TokioTcpListener,
        layout: Arc<LayoutSlot>,
        options: Arc<ListenOptions>,
        worker: Arc<WorkerThread>,
    ) {
        loop {
            while !self.has_capacity() || !self.port.has_capacity() {
                if worker.is_stopping() {
                    info!(listener = self.id, "worker stopping, not resuming a paused listener");
                    return;
                }
                self.paused.store(true, Ordering::Release);
                self.resume.notified().await;
            }
            self.paused.store(false, Ordering::Release);

            if worker.is_stopping() {
                info!(listener = self.id, "worker stopping, tcp listener draining");
                return;
            }

            let (stream, peer_addr) = match std_listener.accept().await {
                Ok(pair) => pair,
                Err(source) => {
                    let err = TransportError::AcceptFailed {
                        addr: self.local_addr.to_string(),
                        source,
                    };
                    warn!(listener = self.id, %err, "tcp accept failed, stopping listener");
                    break;
                }
            };

            if !self.port.try_admit() {
                // Lost the race against another listener on the same port;
                // drop the connection rather than blocking admission.
                continue;
            }
            self.num_connections.fetch_add(1, Ordering::AcqRel);
            worker.pipeline_started();

            let local_addr = stream.local_addr().unwrap_or(self.local_addr);
            let instance = layout.current().alloc();
            let listener = Arc::clone(&self);
            let port_for_inbound = Arc::clone(&self.port);
            let worker_for_inbound = Arc::clone(&worker);

            let inbound = TcpInbound::accept(
                stream,
                peer_addr,
                local_addr,
                instance.clone() as Input,
                Arc::clone(&options),
                port_for_inbound,
                move || {
                    listener.num_connections.fetch_sub(1, Ordering::AcqRel);
                    worker_for_inbound.pipeline_ended();
                    if listener.paused.load(Ordering::Acquire) {
                        listener.resume.notify_one();
                    }
                },
            );
            instance.chain(Some(inbound as Input));
            info!(listener = self.id, %peer_addr, "tcp connection admitted");
        }
    }
}

impl Drop for TcpListener {
    fn drop(&mut self) {
        self.port.detach_listener(self.id);
    }
}
