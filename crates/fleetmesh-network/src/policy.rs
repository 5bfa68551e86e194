//! Declarative network policy grammars.
//!
//! `AllowConnections` entries are `"service/port"` or
//! `"service/port/proto"`; `ExposePorts` entries are `"port"` or
//! `"port/proto"`. The protocol defaults to `tcp` in both grammars, and
//! any other arity is rejected.

use thiserror::Error;

use fleetmesh_state::types::ExposedPort;

const DEFAULT_PROTOCOL: &str = "tcp";

/// Errors produced while parsing declarative policy strings.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("unsupported allow-connections format: {0}")]
    MalformedAllowConnection(String),

    #[error("unsupported expose-ports format: {0}")]
    MalformedExposePort(String),
}

/// Parsed egress policy entry: reach `service_id` on `port`/`protocol`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowConnection {
    pub service_id: String,
    pub port: String,
    pub protocol: String,
}

/// Parse one `AllowConnections` entry.
pub fn parse_allow_connection(entry: &str) -> Result<AllowConnection, PolicyError> {
    let parts: Vec<&str> = entry.split('/').collect();
    if !(2..=3).contains(&parts.len()) {
        return Err(PolicyError::MalformedAllowConnection(entry.to_string()));
    }
    Ok(AllowConnection {
        service_id: parts[0].to_string(),
        port: parts[1].to_string(),
        protocol: parts.get(2).unwrap_or(&DEFAULT_PROTOCOL).to_string(),
    })
}

/// Parse every `ExposePorts` entry into ingress descriptors.
pub fn parse_expose_ports(entries: &[String]) -> Result<Vec<ExposedPort>, PolicyError> {
    entries
        .iter()
        .map(|entry| {
            let parts: Vec<&str> = entry.split('/').collect();
            if parts.len() > 2 {
                return Err(PolicyError::MalformedExposePort(entry.clone()));
            }
            Ok(ExposedPort {
                protocol: parts.get(1).unwrap_or(&DEFAULT_PROTOCOL).to_string(),
                port: parts[0].to_string(),
            })
        })
        .collect()
}
