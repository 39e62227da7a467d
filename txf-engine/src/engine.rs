use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use txf_core::listener::{Connection, Connector, Listener, ListenerFactory};

use crate::receiver::Receiver;
use crate::role::{RoleStrategy, TransferSummary};
use crate::tcp::{TcpConnector, TcpListenerFactory};
use crate::transmitter::{DEFAULT_MAX_PATH_LEN, Transmitter};

// ── Engine events (engine → UI) ─────────────────────────────────────

/// Events emitted by the engine for the CLI to observe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    /// The listener is bound and waiting for its single connection.
    Listening { addr: String },
    /// A connection was accepted or established.
    Connected { peer: String },
    /// The transfer finished and was acknowledged.
    TransferComplete { file_name: String, size: u32 },
    /// The transfer was aborted.
    TransferFailed { message: String },
}

// ── Configuration ───────────────────────────────────────────────────

/// Settings shared by the transport and both roles.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Deadline for each socket read, write and connect. `None` blocks
    /// indefinitely.
    pub io_timeout: Option<Duration>,
    /// Directory where the receiver stores the incoming file.
    pub receive_dir: PathBuf,
    /// Bound passed to path normalization on the transmitter side.
    pub max_path_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            io_timeout: None,
            receive_dir: PathBuf::from("."),
            max_path_len: DEFAULT_MAX_PATH_LEN,
        }
    }
}

impl EngineConfig {
    /// Builds the transmitter described by this configuration.
    #[must_use]
    pub fn transmitter(&self) -> Transmitter {
        Transmitter::new(self.max_path_len)
    }

    /// Builds the receiver described by this configuration.
    #[must_use]
    pub fn receiver(&self) -> Receiver {
        Receiver::new(self.receive_dir.clone())
    }

    /// Builds a TCP engine honouring `io_timeout`.
    #[must_use]
    pub fn tcp_engine(&self) -> Engine<TcpListenerFactory, TcpConnector> {
        Engine::new(
            TcpListenerFactory::new(self.io_timeout),
            TcpConnector::new(self.io_timeout),
        )
    }
}

// ── Engine ──────────────────────────────────────────────────────────

/// Runs exactly one transfer per call, in either listening or connecting
/// mode, with any [`RoleStrategy`].
///
/// The engine is generic over:
/// - `F: ListenerFactory` — creates the listener for listening mode
/// - `K: Connector`       — creates the connection for connecting mode
///
/// so TCP can be swapped for an in-memory transport in tests.
pub struct Engine<F, K> {
    factory: F,
    connector: K,
    events: broadcast::Sender<EngineEvent>,
}

impl<F, K> Engine<F, K>
where
    F: ListenerFactory,
    K: Connector,
{
    pub fn new(factory: F, connector: K) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            factory,
            connector,
            events,
        }
    }

    /// Subscribes to the events of every subsequent transfer.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Listening mode: prepare, bind, accept one connection, transfer.
    ///
    /// `finish` runs on every path once `init` has succeeded, and the
    /// accepted connection is shut down whether or not the transfer worked.
    /// A failing `init` aborts before the address is bound.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails; the chain names the step.
    pub async fn listen<S: RoleStrategy>(
        &self,
        addr: &str,
        arg: &str,
        strategy: &S,
    ) -> anyhow::Result<TransferSummary> {
        info!(role = strategy.name(), addr = %addr, "Listening mode");

        let mut ctx = match strategy.init(arg).await {
            Ok(ctx) => ctx,
            Err(e) => return Err(self.failed(anyhow::Error::new(e).context("init failed"))),
        };

        let outcome = async {
            let mut listener = self.factory.bind(addr).await?;
            let _ = self.events.send(EngineEvent::Listening {
                addr: listener.local_addr(),
            });

            let mut conn = listener.accept().await?;
            let peer = conn.peer();
            info!(peer = %peer, "Connection accepted");
            let _ = self.events.send(EngineEvent::Connected { peer });

            let result = strategy.run(&mut conn, &mut ctx).await;
            if let Err(e) = conn.shutdown().await {
                debug!(error = %e, "Shutdown after transfer failed");
            }
            drop(conn);
            result.context("transfer failed")
        }
        .await;

        strategy.finish(ctx).await;
        self.report(outcome)
    }

    /// Connecting mode: prepare, connect, transfer.
    ///
    /// `finish` runs on every path once `init` has succeeded.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails; the chain names the step.
    pub async fn connect<S: RoleStrategy>(
        &self,
        addr: &str,
        arg: &str,
        strategy: &S,
    ) -> anyhow::Result<TransferSummary> {
        info!(role = strategy.name(), addr = %addr, "Connecting mode");

        let mut ctx = match strategy.init(arg).await {
            Ok(ctx) => ctx,
            Err(e) => return Err(self.failed(anyhow::Error::new(e).context("init failed"))),
        };

        let outcome = async {
            let mut conn = self.connector.connect(addr).await?;
            let peer = conn.peer();
            let _ = self.events.send(EngineEvent::Connected { peer });

            let result = strategy.run(&mut conn, &mut ctx).await;
            if let Err(e) = conn.shutdown().await {
                debug!(error = %e, "Shutdown after transfer failed");
            }
            result.context("transfer failed")
        }
        .await;

        strategy.finish(ctx).await;
        self.report(outcome)
    }

    fn report(&self, outcome: anyhow::Result<TransferSummary>) -> anyhow::Result<TransferSummary> {
        match outcome {
            Ok(summary) => {
                info!(file = %summary.file_name, size = summary.size, "Transfer complete");
                let _ = self.events.send(EngineEvent::TransferComplete {
                    file_name: summary.file_name.clone(),
                    size: summary.size,
                });
                Ok(summary)
            }
            Err(e) => Err(self.failed(e)),
        }
    }

    fn failed(&self, e: anyhow::Error) -> anyhow::Error {
        let message = format!("{e:#}");
        warn!(error = %message, "Transfer aborted");
        let _ = self.events.send(EngineEvent::TransferFailed { message });
        e
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::error::{Stage, TransferError};
    use crate::pipe::{PipeTransport, pipe};
    use crate::role::WorkContext;
    use txf_core::protocol::{HEADER_LEN, Magic, TransferHeader};

    /// Wraps a strategy and counts `finish` calls.
    struct Tracked<S> {
        inner: S,
        finished: Arc<AtomicUsize>,
    }

    impl<S> Tracked<S> {
        fn new(inner: S) -> (Self, Arc<AtomicUsize>) {
            let finished = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    inner,
                    finished: finished.clone(),
                },
                finished,
            )
        }
    }

    impl<S: RoleStrategy> RoleStrategy for Tracked<S> {
        fn name(&self) -> &'static str {
            self.inner.name()
        }

        fn init<'a>(
            &'a self,
            arg: &'a str,
        ) -> impl Future<Output = Result<WorkContext, TransferError>> + Send + 'a {
            self.inner.init(arg)
        }

        fn run<'a, C: Connection>(
            &'a self,
            conn: &'a mut C,
            ctx: &'a mut WorkContext,
        ) -> impl Future<Output = Result<TransferSummary, TransferError>> + Send + 'a {
            self.inner.run(conn, ctx)
        }

        fn finish(&self, ctx: WorkContext) -> impl Future<Output = ()> + Send + '_ {
            async move {
                let had_file = ctx.file.is_some();
                self.inner.finish(ctx).await;
                debug!(had_file, "Tracked finish");
                self.finished.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn tcp_engine() -> Engine<TcpListenerFactory, TcpConnector> {
        EngineConfig {
            io_timeout: Some(Duration::from_secs(5)),
            ..EngineConfig::default()
        }
        .tcp_engine()
    }

    async fn wait_for_listening(rx: &mut broadcast::Receiver<EngineEvent>) -> String {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match rx.recv().await {
                    Ok(EngineEvent::Listening { addr }) => return addr,
                    Ok(_) => {}
                    Err(e) => panic!("event channel error: {e}"),
                }
            }
        })
        .await
        .expect("timed out waiting for Listening event")
    }

    fn write_source(dir: &std::path::Path, name: &str, len: usize) -> (PathBuf, Vec<u8>) {
        let content: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let path = dir.join(name);
        std::fs::write(&path, &content).unwrap();
        (path, content)
    }

    /// A receiver listens on loopback, a transmitter connects and sends 2500 bytes; both succeed and the copy is identical.
    #[tokio::test]
    async fn when_transmitter_connects_to_listening_receiver_expect_file_copied() {
        let send_dir = tempfile::tempdir().unwrap();
        let recv_dir = tempfile::tempdir().unwrap();
        let (src, content) = write_source(send_dir.path(), "report.bin", 2500);

        let server = Arc::new(tcp_engine());
        let mut events = server.subscribe();
        let receiver = Receiver::new(recv_dir.path());

        let server_task = {
            let server = server.clone();
            tokio::spawn(async move { server.listen("127.0.0.1:0", "", &receiver).await })
        };
        let addr = wait_for_listening(&mut events).await;

        let client = tcp_engine();
        let (tx, finished) = Tracked::new(Transmitter::default());
        let sent = client
            .connect(&addr, src.to_str().unwrap(), &tx)
            .await
            .unwrap();
        let received = server_task.await.unwrap().unwrap();

        assert_eq!(sent.file_name, "report.bin");
        assert_eq!(sent.size, 2500);
        assert_eq!(received, sent);
        assert_eq!(finished.load(Ordering::SeqCst), 1);

        let copy = tokio::fs::read(recv_dir.path().join("report.bin"))
            .await
            .unwrap();
        assert_eq!(copy.len(), 2500);
        assert_eq!(copy, content);
    }

    /// The mirrored wiring: a transmitter listens and a receiver connects.
    #[tokio::test]
    async fn when_receiver_connects_to_listening_transmitter_expect_file_copied() {
        let send_dir = tempfile::tempdir().unwrap();
        let recv_dir = tempfile::tempdir().unwrap();
        let (src, content) = write_source(send_dir.path(), "exact.bin", 3 * 1024);

        let server = Arc::new(tcp_engine());
        let mut events = server.subscribe();
        let server_task = {
            let server = server.clone();
            let arg = src.to_str().unwrap().to_string();
            tokio::spawn(async move {
                server
                    .listen("127.0.0.1:0", &arg, &Transmitter::default())
                    .await
            })
        };
        let addr = wait_for_listening(&mut events).await;

        let received = tcp_engine()
            .connect(&addr, "ignored", &Receiver::new(recv_dir.path()))
            .await
            .unwrap();
        server_task.await.unwrap().unwrap();

        assert_eq!(received.size, 3 * 1024);
        let copy = tokio::fs::read(recv_dir.path().join("exact.bin"))
            .await
            .unwrap();
        assert_eq!(copy, content);
    }

    /// A peer sending magic DEAD makes the listening receiver fail with a protocol error and send nothing back.
    #[tokio::test]
    async fn when_header_magic_is_invalid_expect_protocol_failure_without_ack() {
        let recv_dir = tempfile::tempdir().unwrap();
        let (server_end, mut peer) = pipe(4096);
        let engine = Engine::new(PipeTransport::new(server_end), PipeTransport::unavailable());
        let mut events = engine.subscribe();

        let mut raw = TransferHeader::new(Magic::Send, 5, "x.bin").encode();
        raw[..4].copy_from_slice(b"DEAD");
        peer.stream_mut().write_all(&raw).await.unwrap();

        let (rx, finished) = Tracked::new(Receiver::new(recv_dir.path()));
        let err = engine.listen("pipe", "", &rx).await.unwrap_err();

        let cause = err.downcast_ref::<TransferError>().unwrap();
        assert!(matches!(
            cause,
            TransferError::Protocol {
                stage: Stage::Header,
                ..
            }
        ));
        assert_eq!(finished.load(Ordering::SeqCst), 1);

        let mut rest = Vec::new();
        peer.stream_mut().read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty(), "no acknowledgment expected");

        let mut seen = Vec::new();
        while let Ok(ev) = events.try_recv() {
            seen.push(ev);
        }
        assert!(matches!(seen.last(), Some(EngineEvent::TransferFailed { .. })));
    }

    /// The receiving peer disappears mid-body; the transmitter's run aborts on a short send and finish still releases the file.
    #[tokio::test]
    async fn when_peer_severs_mid_body_expect_transport_failure_and_finish() {
        let send_dir = tempfile::tempdir().unwrap();
        let (src, _) = write_source(send_dir.path(), "big.bin", 64 * 1024);

        let (client_end, mut peer) = pipe(512);
        let engine = Engine::new(PipeTransport::unavailable(), PipeTransport::new(client_end));

        let severing_peer = tokio::spawn(async move {
            let mut buf = vec![0u8; HEADER_LEN + 2000];
            peer.stream_mut().read_exact(&mut buf).await.unwrap();
            drop(peer);
        });

        let (tx, finished) = Tracked::new(Transmitter::default());
        let err = engine
            .connect("pipe", src.to_str().unwrap(), &tx)
            .await
            .unwrap_err();
        severing_peer.await.unwrap();

        let cause = err.downcast_ref::<TransferError>().unwrap();
        match cause {
            TransferError::Transport {
                stage,
                expected,
                actual,
            } => {
                assert_eq!(*stage, Stage::Data);
                assert!(actual < expected);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    /// The transmitter never gets an acknowledgment because the peer closes right after the body.
    #[tokio::test]
    async fn when_ack_is_missing_expect_ack_stage_failure() {
        let send_dir = tempfile::tempdir().unwrap();
        let (src, _) = write_source(send_dir.path(), "small.bin", 100);

        let (client_end, mut peer) = pipe(4096);
        let engine = Engine::new(PipeTransport::unavailable(), PipeTransport::new(client_end));

        let silent_peer = tokio::spawn(async move {
            let mut buf = vec![0u8; HEADER_LEN + 100];
            peer.stream_mut().read_exact(&mut buf).await.unwrap();
            drop(peer);
        });

        let err = engine
            .connect("pipe", src.to_str().unwrap(), &Transmitter::default())
            .await
            .unwrap_err();
        silent_peer.await.unwrap();

        assert!(matches!(
            err.downcast_ref::<TransferError>(),
            Some(TransferError::Transport {
                stage: Stage::Ack,
                actual: 0,
                ..
            })
        ));
    }

    /// A reply with the wrong magic is a protocol failure on the transmitter side.
    #[tokio::test]
    async fn when_ack_magic_is_wrong_expect_protocol_failure() {
        let send_dir = tempfile::tempdir().unwrap();
        let (src, _) = write_source(send_dir.path(), "small.bin", 10);

        let (client_end, mut peer) = pipe(4096);
        let engine = Engine::new(PipeTransport::unavailable(), PipeTransport::new(client_end));

        let rogue_peer = tokio::spawn(async move {
            let mut buf = vec![0u8; HEADER_LEN + 10];
            peer.stream_mut().read_exact(&mut buf).await.unwrap();
            // Echo the request instead of acknowledging it.
            peer.stream_mut().write_all(&buf[..HEADER_LEN]).await.unwrap();
            peer
        });

        let err = engine
            .connect("pipe", src.to_str().unwrap(), &Transmitter::default())
            .await
            .unwrap_err();
        drop(rogue_peer.await.unwrap());

        assert!(matches!(
            err.downcast_ref::<TransferError>(),
            Some(TransferError::Protocol {
                stage: Stage::Ack,
                expected: Magic::Rcvd,
                ..
            })
        ));
    }

    /// A transmitter with an unreadable file fails in init, before the listener is bound and without calling finish.
    #[tokio::test]
    async fn when_init_fails_expect_no_bind_and_no_finish() {
        let engine = tcp_engine();
        let mut events = engine.subscribe();
        let (tx, finished) = Tracked::new(Transmitter::default());

        let err = engine
            .listen("127.0.0.1:0", "/definitely/not/here.bin", &tx)
            .await
            .unwrap_err();

        assert!(format!("{err:#}").starts_with("init failed"));
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        assert!(matches!(
            events.try_recv(),
            Ok(EngineEvent::TransferFailed { .. })
        ));
    }

    /// A bind failure after a successful init still runs finish.
    #[tokio::test]
    async fn when_bind_fails_expect_finish_still_called() {
        let send_dir = tempfile::tempdir().unwrap();
        let (src, _) = write_source(send_dir.path(), "a.bin", 1);

        let engine = tcp_engine();
        let (tx, finished) = Tracked::new(Transmitter::default());
        let result = engine
            .listen("999.999.999.999:0", src.to_str().unwrap(), &tx)
            .await;

        assert!(result.is_err());
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn when_connect_fails_expect_error_and_finish() {
        let engine = tcp_engine();
        let (rx, finished) = Tracked::new(Receiver::default());

        let result = engine.connect("127.0.0.1:1", "", &rx).await;
        assert!(result.is_err());
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }
}
