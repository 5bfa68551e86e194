//! Network coordinator error types.

use thiserror::Error;

use crate::policy::PolicyError;

/// Result type alias for coordinator operations.
pub type NetworkResult<T> = Result<T, NetworkError>;

/// Errors that can occur during network coordination.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("address allocation failed: {0}")]
    Ipam(#[from] fleetmesh_ipam::IpamError),

    #[error("dns registry error: {0}")]
    Dns(#[from] fleetmesh_dns::DnsError),

    #[error("malformed policy: {0}")]
    Policy(#[from] PolicyError),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("storage error: {0}")]
    State(#[from] fleetmesh_state::StateError),

    #[error("network publication failed: {0}")]
    Transport(#[source] anyhow::Error),

    /// Persisted state disagrees with an allocation invariant. Fatal at
    /// startup: the coordinator refuses to run on top of it.
    #[error("corrupted persistent state: {0}")]
    CorruptedState(String),
}
