use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use conduit_core::runtime::{ListenOptions, Port};
use conduit_core::{Data, Event, EventTarget, Input, InputContext, StreamEnd, CHUNK_SIZE};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// What the write side of [`TcpInbound`] hands to the socket-owning task.
enum WriteCommand {
    Data(Data),
    ShutdownSend,
    Close,
}

/// Last-activity clock the tick watcher compares against the configured
/// read/write/idle timeouts (§4.4's "tick watcher" note) — a single
/// per-second interval rather than a bespoke timer per timeout kind,
/// since all three watch the same two events (a read completed, a write
/// completed).
struct Activity {
    last_read: Mutex<Instant>,
    last_write: Mutex<Instant>,
}

impl Activity {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            last_read: Mutex::new(now),
            last_write: Mutex::new(now),
        }
    }

    fn touch_read(&self) {
        *self.last_read.lock().unwrap() = Instant::now();
    }

    fn touch_write(&self) {
        *self.last_write.lock().unwrap() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        let r = *self.last_read.lock().unwrap();
        let w = *self.last_write.lock().unwrap();
        Instant::now().duration_since(r.max(w))
    }

    fn read_idle_for(&self) -> Duration {
        Instant::now().duration_since(*self.last_read.lock().unwrap())
    }

    fn write_idle_for(&self) -> Duration {
        Instant::now().duration_since(*self.last_write.lock().unwrap())
    }
}

fn next_inbound_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// One accepted TCP connection's read and write halves, chained into a
/// pipeline instance (§4.4). The read half drives events into the
/// pipeline's input; the pipeline's output chains back to this type's
/// `EventTarget::input`, which becomes the write side.
///
/// Both halves and the per-second timeout tick live in a single actor
/// task (`run`) rather than three independent tasks — a socket close or
/// timeout needs to stop reading *and* writing together, which is one
/// `select!` loop instead of coordinated cancellation across tasks.
///
/// The actor is spawned with `spawn_local`, not `spawn`: it holds the
/// pipeline's own `Input`, and per §5 a pipeline instance's filters use
/// plain `RefCell` state on the assumption that nothing reaches them from
/// another thread, so the task must stay pinned to the worker thread that
/// owns its `LocalSet` rather than hop across a multi-threaded pool.
pub struct TcpInbound {
    id: u64,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    buffer_limit: usize,
    queued_bytes: AtomicUsize,
    closed: std::sync::atomic::AtomicBool,
    to_writer: mpsc::UnboundedSender<WriteCommand>,
    pipeline_input: Input,
}

impl TcpInbound {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept a connected socket and spawn its actor task. `pipeline_input`
    /// is the freshly allocated pipeline's own `Input` (its `process_at(0,
    /// _)` entry point) — events read off the wire are pushed there.
    /// `on_close` runs exactly once, after both directions of the
    /// connection are done, so the caller can release port/listener
    /// counters (§4.4 step 3).
    pub fn accept(
        stream: TcpStream,
        peer_addr: SocketAddr,
        local_addr: SocketAddr,
        pipeline_input: Input,
        options: Arc<ListenOptions>,
        port: Arc<Port>,
        on_close: impl FnOnce() + 'static,
    ) -> Arc<Self> {
        if options.no_delay {
            let _ = stream.set_nodelay(true);
        }

        let (to_writer, cmd_rx) = mpsc::unbounded_channel();
        let inbound = Arc::new(Self {
            id: next_inbound_id(),
            peer_addr,
            local_addr,
            buffer_limit: options.buffer_limit,
            queued_bytes: AtomicUsize::new(0),
            closed: std::sync::atomic::AtomicBool::new(false),
            to_writer,
            pipeline_input: pipeline_input.clone(),
        });

        let actor_inbound = Arc::clone(&inbound);
        tokio::task::spawn_local(async move {
            run(stream, cmd_rx, pipeline_input, options, actor_inbound).await;
            port.release();
            on_close();
        });

        inbound
    }

    fn mark_closed_once(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }
}

impl EventTarget for TcpInbound {
    /// Pipeline output arriving to be written to the socket (§4.4: "chain
    /// the pipeline output back to the inbound write-side").
    fn input(&self, event: Event) {
        match event {
            Event::Data(data) => {
                let len = data.len();
                if self.buffer_limit != 0
                    && self.queued_bytes.fetch_add(len, Ordering::AcqRel) + len > self.buffer_limit
                {
                    self.queued_bytes.fetch_sub(len, Ordering::AcqRel);
                    if self.mark_closed_once() {
                        let _ = self.to_writer.send(WriteCommand::Close);
                        self.pipeline_input
                            .input(Event::StreamEnd(StreamEnd::BufferOverflow));
                    }
                    return;
                }
                let _ = self.to_writer.send(WriteCommand::Data(data));
            }
            Event::StreamEnd(StreamEnd::NoError) => {
                let _ = self.to_writer.send(WriteCommand::ShutdownSend);
            }
            Event::StreamEnd(_) => {
                if self.mark_closed_once() {
                    let _ = self.to_writer.send(WriteCommand::Close);
                }
            }
            // A raw TCP transport only ever sees Data/StreamEnd on its
            // write side; framing filters upstream translate Message
            // boundaries to bytes before they reach here.
            Event::MessageStart(_) | Event::MessageEnd(_) => {}
        }
    }
}

/// §5's soft backpressure path: once the write side has `congestion_limit`
/// bytes still queued for the peer, the read side pauses instead of
/// pulling in more than we can keep up with writing back out. `0` means
/// "no soft limit", matching every other cap in [`ListenOptions`].
fn is_congested(limit: usize, queued_bytes: usize) -> bool {
    limit != 0 && queued_bytes >= limit
}

async fn run(
    stream: TcpStream,
    mut cmd_rx: mpsc::UnboundedReceiver<WriteCommand>,
    pipeline_input: Input,
    options: Arc<ListenOptions>,
    inbound: Arc<TcpInbound>,
) {
    let (mut read_half, mut write_half) = tokio::io::split(stream);
    let activity = Activity::new();
    let mut write_open = true;
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut tick = tokio::time::interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let emit = |event: Event| {
        let _ctx = InputContext::enter();
        pipeline_input.input(event);
    };

    loop {
        tokio::select! {
            _ = tick.tick() => {
                if let Some(timeout) = options.idle_timeout {
                    if activity.idle_for() >= timeout {
                        emit(Event::StreamEnd(StreamEnd::IdleTimeout));
                        break;
                    }
                }
                if let Some(timeout) = options.read_timeout {
                    if activity.read_idle_for() >= timeout {
                        emit(Event::StreamEnd(StreamEnd::ReadTimeout));
                        break;
                    }
                }
                if let Some(timeout) = options.write_timeout {
                    if write_open && activity.write_idle_for() >= timeout {
                        emit(Event::StreamEnd(StreamEnd::WriteTimeout));
                        break;
                    }
                }
            }
            cmd = cmd_rx.recv(), if write_open => {
                match cmd {
                    Some(WriteCommand::Data(data)) => {
                        if let Err(_e) = write_data(&mut write_half, &data).await {
                            emit(Event::StreamEnd(StreamEnd::WriteError));
                            break;
                        }
                        let len = data.len();
                        inbound.queued_bytes.fetch_sub(len, Ordering::AcqRel);
                        activity.touch_write();
                    }
                    Some(WriteCommand::ShutdownSend) => {
                        let _ = write_half.shutdown().await;
                        write_open = false;
                    }
                    Some(WriteCommand::Close) | None => break,
                }
            }
            result = read_half.read(&mut buf),
                if !is_congested(options.congestion_limit, inbound.queued_bytes.load(Ordering::Acquire)) => {
                match result {
                    Ok(0) => {
                        emit(Event::StreamEnd(StreamEnd::NoError));
                        break;
                    }
                    Ok(n) => {
                        activity.touch_read();
                        emit(Event::Data(Data::from_bytes(&buf[..n])));
                    }
                    Err(_e) => {
                        emit(Event::StreamEnd(StreamEnd::ConnectionReset));
                        break;
                    }
                }
            }
        }
    }
}

async fn write_data<W: tokio::io::AsyncWrite + Unpin>(
    write_half: &mut W,
    data: &Data,
) -> std::io::Result<()> {
    let flat = data.to_vec();
    write_half.write_all(&flat).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::{EchoFilter, EventFunction, Filter, PipelineLayout, PipelineType};
    use std::sync::atomic::AtomicBool;
    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
    use tokio::net::TcpListener as TokioTcpListener;

    #[test]
    fn congestion_limit_of_zero_never_pauses() {
        assert!(!is_congested(0, 1_000_000));
    }

    #[test]
    fn congestion_pauses_once_queued_bytes_reach_the_limit() {
        assert!(!is_congested(1024, 1000));
        assert!(is_congested(1024, 1024));
        assert!(is_congested(1024, 2048));
    }

    async fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = TokioTcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr);
        let (server, client) = tokio::join!(
            async { listener.accept().await.unwrap().0 },
            client
        );
        (server, client.unwrap())
    }

    #[tokio::test]
    async fn echoes_bytes_written_by_peer_through_pipeline() {
        tokio::task::LocalSet::new()
            .run_until(async {
                let (server, mut client) = loopback_pair().await;
                let layout = PipelineLayout::new(
                    "echo",
                    PipelineType::Listen,
                    vec![Box::new(EchoFilter) as Box<dyn Filter>],
                    0,
                )
                .unwrap();
                let instance = layout.alloc();
                let options = Arc::new(ListenOptions::builder().build().unwrap());
                let port = Port::new("tcp/test", 0);
                let closed = Arc::new(AtomicBool::new(false));
                let closed2 = closed.clone();

                let peer_addr = server.peer_addr().unwrap();
                let local_addr = server.local_addr().unwrap();
                let inbound = TcpInbound::accept(
                    server,
                    peer_addr,
                    local_addr,
                    instance.clone() as Input,
                    options,
                    port,
                    move || closed2.store(true, Ordering::SeqCst),
                );
                instance.chain(Some(inbound as Input));

                client.write_all(b"ping").await.unwrap();
                let mut buf = [0u8; 4];
                client.read_exact(&mut buf).await.unwrap();
                assert_eq!(&buf, b"ping");
            })
            .await;
    }
}
