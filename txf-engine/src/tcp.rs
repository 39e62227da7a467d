use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, anyhow};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net;
use tracing::{debug, info};

use txf_core::listener::{Connection, Connector, Listener, ListenerFactory};

/// Pending connections the kernel may queue before `accept`.
const LISTEN_BACKLOG: u32 = 1;

/// Awaits `fut`, failing with a timeout error once `limit` elapses.
async fn with_deadline<T>(
    limit: Option<Duration>,
    what: &'static str,
    fut: impl Future<Output = std::io::Result<T>>,
) -> anyhow::Result<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| anyhow!("{what} timed out after {limit:?}"))?
            .with_context(|| format!("failed to {what}")),
        None => fut.await.with_context(|| format!("failed to {what}")),
    }
}

async fn resolve(addr: &str) -> anyhow::Result<SocketAddr> {
    net::lookup_host(addr)
        .await
        .with_context(|| format!("failed to resolve {addr}"))?
        .next()
        .with_context(|| format!("no address found for {addr}"))
}

/// A TCP connection wrapping a [`tokio::net::TcpStream`].
///
/// Every read and write is bounded by `io_timeout` when one is set; an
/// expired deadline is reported like any other I/O failure.
pub struct TcpConnection {
    stream: net::TcpStream,
    peer_addr: String,
    io_timeout: Option<Duration>,
}

impl TcpConnection {
    fn new(stream: net::TcpStream, peer_addr: SocketAddr, io_timeout: Option<Duration>) -> Self {
        Self {
            stream,
            peer_addr: peer_addr.to_string(),
            io_timeout,
        }
    }

    /// Returns a shared reference to the underlying stream.
    pub fn stream(&self) -> &net::TcpStream {
        &self.stream
    }
}

impl Connection for TcpConnection {
    fn peer(&self) -> String {
        self.peer_addr.clone()
    }

    fn read<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> impl Future<Output = anyhow::Result<usize>> + Send + 'a {
        async move {
            with_deadline(
                self.io_timeout,
                "read from TCP connection",
                self.stream.read(buf),
            )
            .await
        }
    }

    fn write<'a>(
        &'a mut self,
        buf: &'a [u8],
    ) -> impl Future<Output = anyhow::Result<usize>> + Send + 'a {
        async move {
            with_deadline(
                self.io_timeout,
                "write to TCP connection",
                self.stream.write(buf),
            )
            .await
        }
    }

    fn shutdown(&mut self) -> impl Future<Output = anyhow::Result<()>> + Send + '_ {
        async move {
            self.stream
                .shutdown()
                .await
                .context("failed to shut down TCP connection")
        }
    }
}

/// A TCP listener wrapping a [`tokio::net::TcpListener`].
pub struct TcpListener {
    inner: net::TcpListener,
    local_addr: String,
    io_timeout: Option<Duration>,
}

impl Listener for TcpListener {
    type Conn = TcpConnection;

    fn local_addr(&self) -> String {
        self.local_addr.clone()
    }

    fn accept(&mut self) -> impl Future<Output = anyhow::Result<Self::Conn>> + Send + '_ {
        async move {
            let (stream, addr) = self
                .inner
                .accept()
                .await
                .context("failed to accept TCP connection")?;
            debug!(peer = %addr, "Accepted TCP connection");
            Ok(TcpConnection::new(stream, addr, self.io_timeout))
        }
    }
}

/// Factory that binds [`TcpListener`] instances on the given address.
///
/// Sockets are created with `SO_REUSEADDR` and a backlog of one, since a
/// listener only ever serves a single transfer.
#[derive(Debug, Clone, Default)]
pub struct TcpListenerFactory {
    io_timeout: Option<Duration>,
}

impl TcpListenerFactory {
    /// Creates a factory whose connections bound each read/write by
    /// `io_timeout` (`None` blocks indefinitely).
    #[must_use]
    pub fn new(io_timeout: Option<Duration>) -> Self {
        Self { io_timeout }
    }
}

impl ListenerFactory for TcpListenerFactory {
    type L = TcpListener;

    fn bind<'a>(
        &'a self,
        addr: &'a str,
    ) -> impl Future<Output = anyhow::Result<Self::L>> + Send + 'a {
        async move {
            let sock_addr = resolve(addr).await?;
            let socket = if sock_addr.is_ipv4() {
                net::TcpSocket::new_v4()
            } else {
                net::TcpSocket::new_v6()
            }
            .context("failed to create TCP socket")?;
            socket
                .set_reuseaddr(true)
                .context("failed to set SO_REUSEADDR")?;
            socket
                .bind(sock_addr)
                .with_context(|| format!("failed to bind TCP listener on {addr}"))?;
            let inner = socket
                .listen(LISTEN_BACKLOG)
                .with_context(|| format!("failed to listen on {addr}"))?;

            let local_addr = inner
                .local_addr()
                .context("failed to retrieve local address")?
                .to_string();
            info!(addr = %local_addr, "TCP listener bound");
            Ok(TcpListener {
                inner,
                local_addr,
                io_timeout: self.io_timeout,
            })
        }
    }
}

/// Connector that opens outbound TCP connections.
///
/// `io_timeout` also bounds the connect attempt itself.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    io_timeout: Option<Duration>,
}

impl TcpConnector {
    #[must_use]
    pub fn new(io_timeout: Option<Duration>) -> Self {
        Self { io_timeout }
    }
}

impl Connector for TcpConnector {
    type Conn = TcpConnection;

    fn connect<'a>(
        &'a self,
        addr: &'a str,
    ) -> impl Future<Output = anyhow::Result<Self::Conn>> + Send + 'a {
        async move {
            let stream = with_deadline(
                self.io_timeout,
                "connect to peer",
                net::TcpStream::connect(addr),
            )
            .await
            .with_context(|| format!("failed to connect to {addr}"))?;
            let peer = stream
                .peer_addr()
                .context("failed to retrieve peer address")?;
            info!(peer = %peer, "Connected");
            Ok(TcpConnection::new(stream, peer, self.io_timeout))
        }
    }
}
