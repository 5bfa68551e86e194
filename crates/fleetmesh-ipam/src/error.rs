//! IPAM error types.

use thiserror::Error;

/// Result type alias for IPAM operations.
pub type IpamResult<T> = Result<T, IpamError>;

/// Errors that can occur during subnet and address allocation.
#[derive(Debug, Error)]
pub enum IpamError {
    /// No subnet left in the aggregate, or no free host in a subnet.
    #[error("address space exhausted: {0}")]
    Exhausted(String),

    /// An address was allocated twice. Only reachable when reseeding
    /// from persisted state, where it indicates state corruption.
    #[error("address already allocated: {ip} in {network_id}")]
    AlreadyAllocated { network_id: String, ip: String },

    /// A subnet or IP string does not parse.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}
