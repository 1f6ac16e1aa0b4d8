use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use conduit_core::runtime::{ListenOptions, Port, PortRegistry};
use conduit_core::{Data, Event, EventFunction, EventTarget, Input, InputContext, PipelineLayout, StreamEnd};
use tokio::net::UdpSocket;
use tracing::warn;

use crate::error::TransportError;

/// Write-side handle for one UDP peer: sends go back out the shared
/// socket addressed to this peer's endpoint (§4.4: "UDP... multiplexes
/// peers by source endpoint; each peer is its own Inbound analogue").
struct UdpPeer {
    addr: SocketAddr,
    socket: Arc<UdpSocket>,
}

impl EventTarget for UdpPeer {
    fn input(&self, event: Event) {
        if let Event::Data(data) = event {
            let socket = Arc::clone(&self.socket);
            let addr = self.addr;
            tokio::spawn(async move {
                let flat = data.to_vec();
                if let Err(source) = socket.send_to(&flat, addr).await {
                    warn!(%addr, %source, "udp send failed");
                }
            });
        }
        // StreamEnd has nothing socket-level to tear down for a
        // connectionless peer; the pipeline instance already unwound
        // itself before this event reached here.
    }
}

struct PeerState {
    pipeline_input: Input,
    last_activity: Instant,
}

/// One bound UDP socket and its live peer table (§4.4). Each distinct
/// source endpoint gets its own pipeline instance and its own idle timer,
/// mirroring a TCP inbound's lifecycle without a real per-peer connection.
pub struct UdpListener {
    local_addr: SocketAddr,
    socket: Arc<UdpSocket>,
    port: Arc<Port>,
    idle_timeout: Option<Duration>,
    peers: Mutex<HashMap<SocketAddr, PeerState>>,
}

impl UdpListener {
    pub async fn bind(
        addr: SocketAddr,
        registry: &PortRegistry,
        options: &ListenOptions,
    ) -> Result<Arc<Self>, TransportError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| TransportError::BindFailed {
                protocol: "udp",
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = socket.local_addr().unwrap_or(addr);
        let port = registry.get_or_create(&format!("udp/{local_addr}"), options.max_port_connections);
        Ok(Arc::new(Self {
            local_addr,
            socket: Arc::new(socket),
            port,
            idle_timeout: options.idle_timeout,
            peers: Mutex::new(HashMap::new()),
        }))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Drive datagram receipt and the idle-eviction tick concurrently
    /// until the socket errors out.
    ///
    /// Spawned sub-tasks use `spawn_local`: both touch pipeline instances
    /// allocated from `layout`, and per §5 those stay pinned to whichever
    /// worker thread's `LocalSet` is driving this future.
    pub async fn serve(self: Arc<Self>, layout: Arc<PipelineLayout>) {
        let recv_task = {
            let this = Arc::clone(&self);
            let layout = Arc::clone(&layout);
            tokio::task::spawn_local(async move { this.recv_loop(layout).await })
        };
        let tick_task = {
            let this = Arc::clone(&self);
            tokio::task::spawn_local(async move { this.idle_tick_loop().await })
        };
        let _ = tokio::join!(recv_task, tick_task);
    }

    async fn recv_loop(self: Arc<Self>, layout: Arc<PipelineLayout>) {
        let mut buf = vec![0u8; conduit_core::CHUNK_SIZE];
        loop {
            let (n, addr) = match self.socket.recv_from(&mut buf).await {
                Ok(pair) => pair,
                Err(source) => {
                    warn!(%source, "udp recv failed, stopping listener");
                    break;
                }
            };

            let pipeline_input = {
                let mut peers = self.peers.lock().unwrap();
                if let Some(state) = peers.get_mut(&addr) {
                    state.last_activity = Instant::now();
                    state.pipeline_input.clone()
                } else {
                    if !self.port.try_admit() {
                        continue;
                    }
                    let instance = layout.alloc();
                    let write_side: Input = Arc::new(UdpPeer {
                        addr,
                        socket: Arc::clone(&self.socket),
                    });
                    instance.chain(Some(write_side));
                    let pipeline_input = instance.clone() as Input;
                    peers.insert(
                        addr,
                        PeerState {
                            pipeline_input: pipeline_input.clone(),
                            last_activity: Instant::now(),
                        },
                    );
                    pipeline_input
                }
            };

            let _ctx = InputContext::enter();
            pipeline_input.input(Event::Data(Data::from_bytes(&buf[..n])));
        }
    }

    async fn idle_tick_loop(self: Arc<Self>) {
        let Some(timeout) = self.idle_timeout else {
            return;
        };
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        loop {
            tick.tick().await;
            let expired: Vec<(SocketAddr, Input)> = {
                let peers = self.peers.lock().unwrap();
                peers
                    .iter()
                    .filter(|(_, state)| state.last_activity.elapsed() >= timeout)
                    .map(|(addr, state)| (*addr, state.pipeline_input.clone()))
                    .collect()
            };
            for (addr, pipeline_input) in expired {
                self.peers.lock().unwrap().remove(&addr);
                self.port.release();
                let _ctx = InputContext::enter();
                pipeline_input.input(Event::StreamEnd(StreamEnd::IdleTimeout));
            }
        }
    }
}
