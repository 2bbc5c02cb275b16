//! Rich diagnostic error types for the harvester.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text so operators know what went wrong and
//! what to check. The protocol client keeps its errors next to the client in
//! [`crate::client::error`]; configuration and path errors live with their
//! modules.

use miette::Diagnostic;
use thiserror::Error;

use crate::client::error::ClientError;
use crate::config::ConfigError;
use crate::paths::PathError;

/// Top-level error type for the harvester.
///
/// Each variant wraps a subsystem-specific error, preserving the full
/// diagnostic chain through to the operator.
#[derive(Debug, Error, Diagnostic)]
pub enum HarvestError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Path(#[from] PathError),
}

// ---------------------------------------------------------------------------
// Record store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("I/O error: {source}")]
    #[diagnostic(
        code(harvest::store::io),
        help(
            "A filesystem operation failed. Check that the data directory exists, \
             has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error("redb transaction error: {message}")]
    #[diagnostic(
        code(harvest::store::redb),
        help(
            "The embedded database encountered a transaction error. \
             If this repeats, stop the harvester and check the database file; \
             every harvest can be resumed from its last checkpoint."
        )
    )]
    Redb { message: String },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(harvest::store::serde),
        help(
            "Failed to encode or decode a stored row. \
             This usually means the stored format changed between versions. \
             Re-harvest the affected scope with --full."
        )
    )]
    Serialization { message: String },
}

/// Convenience alias for record store results.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Checkpoint errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum CheckpointError {
    #[error("checkpoint storage error for scope \"{scope}\": {message}")]
    #[diagnostic(
        code(harvest::checkpoint::storage),
        help(
            "The checkpoint table could not be read or written. The harvest keeps \
             running, but a crash before the next successful checkpoint re-fetches \
             more pages on resume."
        )
    )]
    Storage { scope: String, message: String },

    #[error("corrupt checkpoint for scope \"{scope}\": {message}")]
    #[diagnostic(
        code(harvest::checkpoint::corrupt),
        help(
            "The stored checkpoint could not be decoded. Run a full harvest of this \
             scope with --full to rebuild it."
        )
    )]
    Corrupt { scope: String, message: String },
}

/// Convenience alias for checkpoint results.
pub type CheckpointResult<T> = std::result::Result<T, CheckpointError>;

// ---------------------------------------------------------------------------
// Sink errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SinkError {
    #[error("batch of {pending} records could not be written: {source}")]
    #[diagnostic(
        code(harvest::sink::batch_failed),
        help(
            "The whole batch was rejected by the record store. The records stay \
             buffered and the next flush retries them."
        )
    )]
    BatchFailed {
        pending: usize,
        #[source]
        source: StoreError,
    },
}

/// Convenience alias for sink results.
pub type SinkResult<T> = std::result::Result<T, SinkError>;

/// Convenience alias for functions returning harvester results.
pub type HarvestResult<T> = std::result::Result<T, HarvestError>;
