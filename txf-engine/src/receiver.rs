use std::future::Future;
use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use txf_core::block::{recv_all, send_all};
use txf_core::listener::Connection;
use txf_core::path::extract_filename;
use txf_core::protocol::{
    BLOCK_SIZE, HEADER_LEN, MAX_FILE_SIZE, Magic, TransferHeader, chunk_sizes,
};

use crate::error::{Stage, TransferError};
use crate::role::{RoleStrategy, TransferSummary, WorkContext};

/// The data sink: accepts one file and writes it into `receive_dir`.
#[derive(Debug, Clone)]
pub struct Receiver {
    receive_dir: PathBuf,
}

impl Receiver {
    /// Creates a receiver that stores incoming files in `receive_dir`.
    #[must_use]
    pub fn new(receive_dir: impl Into<PathBuf>) -> Self {
        Self {
            receive_dir: receive_dir.into(),
        }
    }
}

impl Default for Receiver {
    fn default() -> Self {
        Self::new(".")
    }
}

impl RoleStrategy for Receiver {
    fn name(&self) -> &'static str {
        "receiver"
    }

    /// The name comes from the peer's header, so there is nothing to
    /// prepare and `arg` is ignored.
    fn init<'a>(
        &'a self,
        _arg: &'a str,
    ) -> impl Future<Output = Result<WorkContext, TransferError>> + Send + 'a {
        async move { Ok(WorkContext::default()) }
    }

    fn run<'a, C: Connection>(
        &'a self,
        conn: &'a mut C,
        ctx: &'a mut WorkContext,
    ) -> impl Future<Output = Result<TransferSummary, TransferError>> + Send + 'a {
        async move {
            let mut raw = [0u8; HEADER_LEN];
            let received = recv_all(conn, &mut raw).await;
            TransferError::check_len(Stage::Header, HEADER_LEN, received)?;

            let header = TransferHeader::decode(&raw);
            TransferError::check_magic(Stage::Header, Magic::Send, &header)?;
            if header.file_size > MAX_FILE_SIZE {
                return Err(TransferError::FileTooLarge(header.file_size.into()));
            }

            // The advertised name is re-sanitized so it can only ever name a
            // file directly inside `receive_dir`.
            let advertised = header.file_name();
            let file_name = extract_filename(&advertised);
            if file_name.is_empty() || file_name == "." || file_name == ".." {
                return Err(TransferError::InvalidFileName(advertised));
            }

            ctx.size = header.file_size;
            ctx.header = header;
            info!(peer = %conn.peer(), file = %file_name, size = ctx.size, "Receiving file");

            let path = self.receive_dir.join(&file_name);
            let mut file = tokio::fs::File::create(&path)
                .await
                .map_err(|e| TransferError::resource("create", path.display(), e))?;

            let mut buf = [0u8; BLOCK_SIZE];
            for remain in chunk_sizes(ctx.size) {
                let chunk = &mut buf[..remain];
                let received = recv_all(conn, chunk).await;
                if received < remain {
                    warn!(path = %path.display(), "Transfer cut short, leaving partial file");
                }
                TransferError::check_len(Stage::Data, remain, received)?;

                file.write_all(chunk)
                    .await
                    .map_err(|e| TransferError::resource("write", path.display(), e))?;
            }
            file.flush()
                .await
                .map_err(|e| TransferError::resource("flush", path.display(), e))?;
            drop(file);
            debug!(path = %path.display(), size = ctx.size, "Body stored, acknowledging");

            let sent = send_all(conn, &ctx.header.acknowledge().encode()).await;
            TransferError::check_len(Stage::Ack, HEADER_LEN, sent)?;

            info!(peer = %conn.peer(), file = %file_name, size = ctx.size, "File received");
            Ok(TransferSummary {
                file_name,
                size: ctx.size,
            })
        }
    }

    /// The output file is closed inside `run`; nothing is held here.
    fn finish(&self, _ctx: WorkContext) -> impl Future<Output = ()> + Send + '_ {
        async {}
    }
}
