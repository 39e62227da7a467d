use std::future::Future;

use tokio::fs::File;

use txf_core::listener::Connection;
use txf_core::protocol::TransferHeader;

use crate::error::TransferError;

/// Mutable state for one transfer.
///
/// Created by [`RoleStrategy::init`], driven by [`RoleStrategy::run`] and
/// released by [`RoleStrategy::finish`]. The file handle is owned by the
/// strategy that opened it and never leaves this struct.
#[derive(Debug, Default)]
pub struct WorkContext {
    /// File being read (transmitter). The receiver keeps its output file
    /// local to `run`, so this stays `None` there.
    pub file: Option<File>,
    /// Number of body bytes to move.
    pub size: u32,
    /// Header sent (transmitter) or received (receiver).
    pub header: TransferHeader,
}

/// What a successful `run` moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSummary {
    pub file_name: String,
    pub size: u32,
}

/// One side of a transfer: the data source or the data sink.
///
/// The orchestrator is written once against this trait and drives either
/// implementation over a connection it owns:
///
/// 1. [`init`](RoleStrategy::init) prepares a [`WorkContext`] before any
///    network activity,
/// 2. [`run`](RoleStrategy::run) performs the exchange,
/// 3. [`finish`](RoleStrategy::finish) releases the context. It is called on
///    every exit path, including failures in `run`.
pub trait RoleStrategy: Send + Sync {
    /// Short label used in logs (`"transmitter"`, `"receiver"`).
    fn name(&self) -> &'static str;

    /// Prepares the work context. `arg` is role specific.
    fn init<'a>(
        &'a self,
        arg: &'a str,
    ) -> impl Future<Output = Result<WorkContext, TransferError>> + Send + 'a;

    /// Runs the protocol over `conn`.
    fn run<'a, C: Connection>(
        &'a self,
        conn: &'a mut C,
        ctx: &'a mut WorkContext,
    ) -> impl Future<Output = Result<TransferSummary, TransferError>> + Send + 'a;

    /// Releases everything `init` and `run` acquired.
    fn finish(&self, ctx: WorkContext) -> impl Future<Output = ()> + Send + '_;
}
