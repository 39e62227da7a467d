//! In-memory [`Connection`] used by the engine tests.

use std::future::Future;

use anyhow::Context;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use txf_core::listener::{Connection, Connector, Listener, ListenerFactory};

/// One end of a [`tokio::io::duplex`] pipe.
pub struct PipeConnection {
    stream: DuplexStream,
    name: &'static str,
}

impl PipeConnection {
    pub fn stream_mut(&mut self) -> &mut DuplexStream {
        &mut self.stream
    }
}

/// Returns both ends of a pipe buffering at most `max_buf` bytes per
/// direction.
pub fn pipe(max_buf: usize) -> (PipeConnection, PipeConnection) {
    let (a, b) = tokio::io::duplex(max_buf);
    (
        PipeConnection {
            stream: a,
            name: "pipe-a",
        },
        PipeConnection {
            stream: b,
            name: "pipe-b",
        },
    )
}

impl Connection for PipeConnection {
    fn peer(&self) -> String {
        self.name.to_string()
    }

    fn read<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> impl Future<Output = anyhow::Result<usize>> + Send + 'a {
        async move { self.stream.read(buf).await.context("failed to read from pipe") }
    }

    fn write<'a>(
        &'a mut self,
        buf: &'a [u8],
    ) -> impl Future<Output = anyhow::Result<usize>> + Send + 'a {
        async move { self.stream.write(buf).await.context("failed to write to pipe") }
    }

    fn shutdown(&mut self) -> impl Future<Output = anyhow::Result<()>> + Send + '_ {
        async move {
            self.stream
                .shutdown()
                .await
                .context("failed to shut down pipe")
        }
    }
}

/// Listener that hands out one pre-built connection, then fails.
pub struct PipeListener {
    conn: Option<PipeConnection>,
}

impl Listener for PipeListener {
    type Conn = PipeConnection;

    fn local_addr(&self) -> String {
        "pipe".into()
    }

    fn accept(&mut self) -> impl Future<Output = anyhow::Result<Self::Conn>> + Send + '_ {
        async move { self.conn.take().context("pipe listener already used") }
    }
}

/// Factory and connector over a single pre-built pipe end.
///
/// `bind` and `connect` both take the stored end; a second call fails.
pub struct PipeTransport {
    conn: std::sync::Mutex<Option<PipeConnection>>,
}

impl PipeTransport {
    pub fn new(conn: PipeConnection) -> Self {
        Self {
            conn: std::sync::Mutex::new(Some(conn)),
        }
    }

    /// A transport whose `bind` and `connect` always fail.
    pub fn unavailable() -> Self {
        Self {
            conn: std::sync::Mutex::new(None),
        }
    }

    fn take(&self) -> anyhow::Result<PipeConnection> {
        self.conn
            .lock()
            .expect("pipe transport lock poisoned")
            .take()
            .context("pipe transport unavailable")
    }
}

impl ListenerFactory for PipeTransport {
    type L = PipeListener;

    fn bind<'a>(
        &'a self,
        _addr: &'a str,
    ) -> impl Future<Output = anyhow::Result<Self::L>> + Send + 'a {
        async move { Ok(PipeListener { conn: Some(self.take()?) }) }
    }
}

impl Connector for PipeTransport {
    type Conn = PipeConnection;

    fn connect<'a>(
        &'a self,
        _addr: &'a str,
    ) -> impl Future<Output = anyhow::Result<Self::Conn>> + Send + 'a {
        async move { self.take() }
    }
}
