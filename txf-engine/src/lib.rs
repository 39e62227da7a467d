//! # txf-engine
//!
//! Runtime logic for txf, embedded into the `txf` binary.
//!
//! This crate provides:
//! - **Engine** with the two connection modes: listening (bind, accept one
//!   connection) and connecting (dial one peer). Either mode drives either
//!   role and always releases the role's resources afterwards.
//! - **Roles**: the [`transmitter::Transmitter`] reads a local file and
//!   sends it; the [`receiver::Receiver`] stores it and acknowledges.
//! - **Transport**: TCP with an optional per-operation deadline.
//! - **Event bus**: emits listening / connected / done / failed events for
//!   the CLI to print.

pub mod engine;
pub mod error;
pub mod receiver;
pub mod role;
pub mod tcp;
pub mod transmitter;

#[cfg(test)]
mod pipe;
