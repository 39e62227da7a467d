use std::fmt;
use std::io;

use thiserror::Error;
use tracing::debug;

use txf_core::protocol::{MAX_FILE_SIZE, Magic, TransferHeader};

/// The point in the exchange where a transfer failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// The 32-byte request header.
    Header,
    /// The file body.
    Data,
    /// The 32-byte acknowledgment header.
    Ack,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header => f.write_str("header"),
            Self::Data => f.write_str("data"),
            Self::Ack => f.write_str("ack"),
        }
    }
}

/// Why a single transfer was aborted.
///
/// None of these are retried; the orchestrator reports them and tears the
/// connection down.
#[derive(Debug, Error)]
pub enum TransferError {
    /// A block could not be moved completely.
    #[error("short {stage} transfer: {actual} of {expected} bytes")]
    Transport {
        stage: Stage,
        expected: usize,
        actual: usize,
    },

    /// A received header carried the wrong magic.
    #[error("invalid {stage} magic: expected {expected}, found 0x{found:08X}")]
    Protocol {
        stage: Stage,
        expected: Magic,
        found: u32,
    },

    /// A local file could not be opened, read, created or written.
    #[error("failed to {action} {path}")]
    Resource {
        action: &'static str,
        path: String,
        #[source]
        source: io::Error,
    },

    /// No usable name could be derived for the file.
    #[error("invalid file name derived from {0:?}")]
    InvalidFileName(String),

    /// The file does not fit the header's size field.
    #[error("file too large: {0} bytes (max {max})", max = MAX_FILE_SIZE)]
    FileTooLarge(u64),

    /// `run` was handed a context whose `init` never opened a file.
    #[error("work context has no open file")]
    MissingFile,
}

impl TransferError {
    /// Builds a [`TransferError::Resource`] for `path`.
    pub fn resource(action: &'static str, path: impl fmt::Display, source: io::Error) -> Self {
        Self::Resource {
            action,
            path: path.to_string(),
            source,
        }
    }

    /// Returns `Ok(())` when a block engine call moved `expected` bytes.
    pub fn check_len(stage: Stage, expected: usize, actual: usize) -> Result<(), Self> {
        if actual < expected {
            Err(Self::Transport {
                stage,
                expected,
                actual,
            })
        } else {
            Ok(())
        }
    }

    /// Returns `Ok(())` when `header` carries the `expected` magic.
    pub fn check_magic(stage: Stage, expected: Magic, header: &TransferHeader) -> Result<(), Self> {
        if header.has_magic(expected) {
            return Ok(());
        }
        match Magic::try_from(header.magic) {
            Ok(other) => debug!(%stage, %other, "Header carries the wrong message type"),
            Err(e) => debug!(%stage, error = %e, "Header magic not recognised"),
        }
        Err(Self::Protocol {
            stage,
            expected,
            found: header.magic,
        })
    }
}
