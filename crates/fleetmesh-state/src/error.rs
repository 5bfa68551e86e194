//! Error types for the fleetmesh state store.

use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur while persisting or loading coordination
/// state (network bindings, instance records, node blobs).
#[derive(Debug, Error)]
pub enum StateError {
    /// The backing database could not be opened or created.
    #[error("can't open state store: {0}")]
    Open(String),

    /// A transaction, table open, read or write against the backing
    /// database failed.
    #[error("state store access failed: {0}")]
    Backend(String),

    /// A record could not be encoded for storage.
    #[error("can't encode record: {0}")]
    Encode(String),

    /// A persisted record could not be decoded.
    #[error("can't decode persisted record: {0}")]
    Decode(String),

    /// The requested record does not exist. Callers that tolerate
    /// missing state (run-request loading) match on this variant
    /// explicitly.
    #[error("no record for {0}")]
    NotFound(String),
}
