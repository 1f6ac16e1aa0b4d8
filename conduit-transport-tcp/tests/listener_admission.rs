use std::sync::Arc;
use std::time::Duration;

use conduit_core::runtime::{LayoutSlot, ListenOptions, PortRegistry, WorkerThread};
use conduit_core::{Event, Filter, FilterIo, PipelineLayout, PipelineType};
use conduit_transport_tcp::TcpListener;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// §8 scenario 1 ("echo"): bytes written by the client come back
/// unchanged, and EOF from the peer propagates as `StreamEnd{NoError}`.
#[tokio::test]
async fn echo_scenario_round_trips_bytes_and_closes_on_peer_eof() {
    tokio::task::LocalSet::new()
        .run_until(async {
            let registry = PortRegistry::new();
            let options = ListenOptions::builder().build().unwrap();
            let (listener, std_listener) =
                TcpListener::bind("127.0.0.1:0".parse().unwrap(), &registry, &options)
                    .await
                    .unwrap();
            let addr = listener.local_addr();
            let layout = PipelineLayout::new(
                "echo",
                PipelineType::Listen,
                vec![Box::new(conduit_core::EchoFilter) as Box<dyn Filter>],
                0,
            )
            .unwrap();
            tokio::task::spawn_local(listener.serve(
                std_listener,
                Arc::new(LayoutSlot::new(layout)),
                Arc::new(options),
                WorkerThread::new("w0"),
            ));

            let mut client = TcpStream::connect(addr).await.unwrap();
            client.write_all(b"hello").await.unwrap();
            let mut buf = [0u8; 5];
            client.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"hello");

            client.shutdown().await.unwrap();
            let mut trailing = Vec::new();
            client.read_to_end(&mut trailing).await.unwrap();
            assert!(
                trailing.is_empty(),
                "peer half-close must not echo further bytes"
            );
        })
        .await;
}

/// A filter that emits a fixed-size burst on its first input event,
/// regardless of what arrived — stands in for a server-driven response
/// too large to fit the test's `bufferLimit`, per §8 scenario 4.
struct BurstOnFirstEvent {
    fired: bool,
    burst_len: usize,
}

impl Filter for BurstOnFirstEvent {
    fn clone_box(&self) -> Box<dyn Filter> {
        Box::new(BurstOnFirstEvent {
            fired: false,
            burst_len: self.burst_len,
        })
    }

    fn reset(&mut self) {
        self.fired = false;
    }

    fn process(&mut self, io: &FilterIo<'_>, event: Event) {
        if event.is_stream_end() {
            io.emit(event);
            return;
        }
        if !self.fired {
            self.fired = true;
            io.emit(Event::Data(conduit_core::Data::from_bytes(
                &vec![0u8; self.burst_len],
            )));
        }
    }

    fn name(&self) -> &'static str {
        "burst-on-first-event"
    }
}

/// §8 scenario 4 ("buffer overflow"): a client that connects but never
/// reads forces the inbound's write buffer past `bufferLimit`, which must
/// emit `StreamEnd{BufferOverflow}` and close the socket rather than
/// buffer unboundedly.
#[tokio::test]
async fn buffer_overflow_closes_the_socket() {
    tokio::task::LocalSet::new()
        .run_until(async {
            let registry = PortRegistry::new();
            let options = ListenOptions::builder()
                .with_buffer_limit(1024)
                .build()
                .unwrap();
            let (listener, std_listener) =
                TcpListener::bind("127.0.0.1:0".parse().unwrap(), &registry, &options)
                    .await
                    .unwrap();
            let addr = listener.local_addr();
            let layout = PipelineLayout::new(
                "burst",
                PipelineType::Listen,
                vec![Box::new(BurstOnFirstEvent {
                    fired: false,
                    burst_len: 4096,
                }) as Box<dyn Filter>],
                0,
            )
            .unwrap();
            tokio::task::spawn_local(listener.serve(
                std_listener,
                Arc::new(LayoutSlot::new(layout)),
                Arc::new(options),
                WorkerThread::new("w0"),
            ));

            let mut client = TcpStream::connect(addr).await.unwrap();
            client.write_all(b"x").await.unwrap();

            // Never read: the writer task's queue fills past `buffer_limit`
            // and the inbound must close from its side.
            let mut probe = [0u8; 1];
            let result = tokio::time::timeout(Duration::from_secs(5), async {
                loop {
                    match client.read(&mut probe).await {
                        Ok(0) => return,
                        Ok(_) => continue,
                        Err(_) => return,
                    }
                }
            })
            .await;
            assert!(result.is_ok(), "server must close the socket after overflow");
        })
        .await;
}

/// §8 scenario 5 ("port cap"): a listener capped at `maxConnections: 2`
/// never reports more than two live inbounds at once.
#[tokio::test]
async fn port_cap_limits_concurrent_admissions() {
    tokio::task::LocalSet::new()
        .run_until(async {
            let registry = PortRegistry::new();
            let options = ListenOptions::builder()
                .with_max_port_connections(2)
                .build()
                .unwrap();
            let (listener, std_listener) =
                TcpListener::bind("127.0.0.1:0".parse().unwrap(), &registry, &options)
                    .await
                    .unwrap();
            let addr = listener.local_addr();
            let port_for_assert = registry.get_or_create(&format!("tcp/{addr}"), 2);
            let layout = PipelineLayout::new(
                "echo",
                PipelineType::Listen,
                vec![Box::new(conduit_core::EchoFilter) as Box<dyn Filter>],
                0,
            )
            .unwrap();
            tokio::task::spawn_local(listener.serve(
                std_listener,
                Arc::new(LayoutSlot::new(layout)),
                Arc::new(options),
                WorkerThread::new("w0"),
            ));

            let first = TcpStream::connect(addr).await.unwrap();
            let second = TcpStream::connect(addr).await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert!(port_for_assert.num_connections() <= 2);

            drop(first);
            drop(second);
        })
        .await;
}
