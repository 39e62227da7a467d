use tracing::{debug, trace};

use crate::listener::Connection;

/// Writes the whole of `buf` to `conn`, looping over partial writes.
///
/// Stops early when a write fails or reports zero bytes. Returns the number
/// of bytes actually written; anything less than `buf.len()` means the
/// transport is gone and the caller must abort.
pub async fn send_all<C: Connection>(conn: &mut C, buf: &[u8]) -> usize {
    let mut pos = 0;

    while pos < buf.len() {
        match conn.write(&buf[pos..]).await {
            Ok(0) => {
                debug!(peer = %conn.peer(), written = pos, wanted = buf.len(), "Write returned zero bytes");
                break;
            }
            Ok(n) => {
                trace!(n, "Wrote bytes");
                pos += n;
            }
            Err(e) => {
                debug!(peer = %conn.peer(), written = pos, wanted = buf.len(), error = %e, "Write failed");
                break;
            }
        }
    }

    pos
}

/// Fills the whole of `buf` from `conn`, looping over partial reads.
///
/// Stops early when the peer closes the stream (`Ok(0)`) or a read fails.
/// Returns the number of bytes actually received.
pub async fn recv_all<C: Connection>(conn: &mut C, buf: &mut [u8]) -> usize {
    let wanted = buf.len();
    let mut pos = 0;

    while pos < wanted {
        match conn.read(&mut buf[pos..]).await {
            Ok(0) => {
                debug!(peer = %conn.peer(), received = pos, wanted, "Connection closed by peer");
                break;
            }
            Ok(n) => {
                trace!(n, "Read bytes");
                pos += n;
            }
            Err(e) => {
                debug!(peer = %conn.peer(), received = pos, wanted, error = %e, "Read failed");
                break;
            }
        }
    }

    pos
}
