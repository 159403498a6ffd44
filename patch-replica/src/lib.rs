//! In-memory JSON document store replicated as JSON Patch transactions.
//!
//! Every node holds one JSON document. Clients mutate it by posting JSON
//! Patch documents; each accepted patch becomes a transaction tagged with
//! the originating node's name and a per-node sequence number. Nodes stream
//! their transaction logs to each other over WebSocket links and converge by
//! skipping any transaction at or below the per-source watermark they have
//! already processed. There is no global order and no consensus.
//!
//! - [`sequencer`] serializes all transactions through one actor and owns
//!   the document, the watermarks and the local counter.
//! - [`document`] applies JSON Patch atomically.
//! - [`log`] is the append-only record replayed to every new link.
//! - [`replication`] runs the log writer, the frame reader and the dialers.
//! - [`frames`] adapts both WebSocket libraries to plain text frames.
//! - [`api`] exposes `/get`, `/replace`, `/vclock`, `/ws` and `/ws/push`.
//! - [`node`] wires everything together; [`cli`] and [`config`] build it
//!   from command-line flags and a peer list.

pub mod api;
pub mod cli;
pub mod config;
pub mod document;
pub mod error;
pub mod frames;
pub mod log;
pub mod node;
pub mod replication;
pub mod sequencer;
pub mod shutdown;
pub mod transaction;
