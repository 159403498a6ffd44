//! Error types shared across the node.
//!
//! Patch failures are expected outcomes: the sequencer turns them into
//! [`Outcome::Rejected`](crate::sequencer::Outcome::Rejected) rather than
//! propagating them. Link errors stay local to one replication connection
//! and never touch the document, log or watermarks.

use thiserror::Error;

/// Why a transaction payload could not be applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    /// The payload is not a syntactically valid JSON Patch document.
    #[error("invalid patch payload: {0}")]
    Decode(String),

    /// The patch is well formed but failed against the current document,
    /// e.g. a missing path or a failed `test` operation.
    #[error("patch could not be applied: {0}")]
    Apply(String),
}

/// The sequencer task has stopped and no longer accepts transactions.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerError {
    #[error("sequencer is not running")]
    Closed,
}

/// Failure of a single replication link.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("failed to connect to {target}: {message}")]
    Connect { target: String, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    /// A frame arrived that is not a transaction.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The remote side closed the connection.
    #[error("connection closed by remote")]
    Closed,

    #[error(transparent)]
    Sequencer(#[from] SequencerError),
}

/// Invalid peer configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("line {line}: unknown link direction '{value}' (expected pull, push or both)")]
    InvalidDirection { line: usize, value: String },

    #[error("line {line}: unexpected trailing input '{value}'")]
    TrailingInput { line: usize, value: String },

    #[error("failed to read peer list {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
