use std::future::Future;
use std::io;

use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use txf_core::block::{recv_all, send_all};
use txf_core::listener::Connection;
use txf_core::path::{extract_filename, normalize_path};
use txf_core::protocol::{
    BLOCK_SIZE, HEADER_LEN, MAX_FILE_SIZE, Magic, TransferHeader, chunk_sizes,
};

use crate::error::{Stage, TransferError};
use crate::role::{RoleStrategy, TransferSummary, WorkContext};

/// Default bound on the local path handed to [`Transmitter::init`].
pub const DEFAULT_MAX_PATH_LEN: usize = 260;

/// The data source: reads a local file and sends it.
#[derive(Debug, Clone)]
pub struct Transmitter {
    max_path_len: usize,
}

impl Transmitter {
    /// Creates a transmitter that normalizes paths to at most
    /// `max_path_len - 1` characters.
    #[must_use]
    pub fn new(max_path_len: usize) -> Self {
        Self { max_path_len }
    }
}

impl Default for Transmitter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PATH_LEN)
    }
}

impl RoleStrategy for Transmitter {
    fn name(&self) -> &'static str {
        "transmitter"
    }

    fn init<'a>(
        &'a self,
        arg: &'a str,
    ) -> impl Future<Output = Result<WorkContext, TransferError>> + Send + 'a {
        async move {
            let path = normalize_path(arg, self.max_path_len);
            let name = extract_filename(&path);
            if name.is_empty() {
                return Err(TransferError::InvalidFileName(arg.to_string()));
            }

            let file = tokio::fs::File::open(&path)
                .await
                .map_err(|e| TransferError::resource("open", &path, e))?;
            let meta = file
                .metadata()
                .await
                .map_err(|e| TransferError::resource("stat", &path, e))?;
            if !meta.is_file() {
                let kind = if meta.is_dir() {
                    io::ErrorKind::IsADirectory
                } else {
                    io::ErrorKind::InvalidInput
                };
                return Err(TransferError::resource("open", &path, io::Error::from(kind)));
            }
            let len = meta.len();
            let size = u32::try_from(len)
                .ok()
                .filter(|&s| s <= MAX_FILE_SIZE)
                .ok_or(TransferError::FileTooLarge(len))?;

            info!(file = %name, size, path = %path, "Prepared file for sending");

            Ok(WorkContext {
                file: Some(file),
                size,
                header: TransferHeader::new(Magic::Send, size, &name),
            })
        }
    }

    fn run<'a, C: Connection>(
        &'a self,
        conn: &'a mut C,
        ctx: &'a mut WorkContext,
    ) -> impl Future<Output = Result<TransferSummary, TransferError>> + Send + 'a {
        async move {
            let file = ctx.file.as_mut().ok_or(TransferError::MissingFile)?;
            let file_name = ctx.header.file_name();

            let sent = send_all(conn, &ctx.header.encode()).await;
            TransferError::check_len(Stage::Header, HEADER_LEN, sent)?;

            let mut buf = [0u8; BLOCK_SIZE];
            for remain in chunk_sizes(ctx.size) {
                let chunk = &mut buf[..remain];
                file.read_exact(chunk)
                    .await
                    .map_err(|e| TransferError::resource("read", &file_name, e))?;

                let sent = send_all(conn, chunk).await;
                TransferError::check_len(Stage::Data, remain, sent)?;
            }
            debug!(peer = %conn.peer(), size = ctx.size, "Body sent, waiting for acknowledgment");

            let mut raw = [0u8; HEADER_LEN];
            let received = recv_all(conn, &mut raw).await;
            TransferError::check_len(Stage::Ack, HEADER_LEN, received)?;

            let reply = TransferHeader::decode(&raw);
            TransferError::check_magic(Stage::Ack, Magic::Rcvd, &reply)?;

            info!(peer = %conn.peer(), file = %file_name, size = ctx.size, "Transfer acknowledged");
            Ok(TransferSummary {
                file_name,
                size: ctx.size,
            })
        }
    }

    fn finish(&self, mut ctx: WorkContext) -> impl Future<Output = ()> + Send + '_ {
        async move {
            if let Some(file) = ctx.file.take() {
                drop(file);
                debug!(file = %ctx.header.file_name(), "Closed source file");
            }
        }
    }
}
