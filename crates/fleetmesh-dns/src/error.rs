//! DNS registry error types.

use std::net::IpAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for DNS registry operations.
pub type DnsResult<T> = Result<T, DnsError>;

/// Errors that can occur while maintaining the hosts view.
#[derive(Debug, Error)]
pub enum DnsError {
    #[error("empty hostname for {0}")]
    EmptyHostname(IpAddr),

    #[error("failed to prepare dns directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write hosts file {path}: {source}")]
    WriteHosts {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("resolver reload failed: {0}")]
    Reload(#[source] std::io::Error),
}
