//! # txf-core
//!
//! Shared building blocks for the txf single-file transfer protocol.
//!
//! This crate provides the pieces used by `txf-engine` and the `txf`
//! binary that do not depend on a particular socket implementation.
//!
//! ## Responsibilities
//!
//! - **Wire format** — the fixed 32-byte transfer header (magic / size /
//!   name), its encode/decode pair, and the 1024-byte chunking of the file
//!   body.
//!
//! - **Path handling** — turning a user supplied path into a local one and
//!   deriving the short name that travels in the header.
//!
//! - **Transport traits** — `Connection`, `Listener`, `ListenerFactory` and
//!   `Connector`, so the engine runs over TCP or an in-memory pipe alike.
//!
//! - **Block I/O** — `send_all` / `recv_all`, which move whole blocks over a
//!   connection and report short transfers instead of hiding them.

pub mod block;
pub mod listener;
pub mod path;
pub mod protocol;
