//! Network coordinator for fleetmesh.
//!
//! Owns the cluster-wide network state: which provider networks exist,
//! which nodes are bound into them, and which `(subnet, IP, VLAN, DNS,
//! firewall)` parameter set each service instance runs with. The
//! coordinator computes and publishes parameters only; enforcement
//! lives in the node agents.
//!
//! # Components
//!
//! - **`coordinator`** — central state, provider reconcile, instance prepare
//! - **`policy`** — AllowConnections / ExposePorts grammars
//! - **`firewall`** — egress rule synthesis from declared policy
//! - **`config`** — coordinator configuration

pub mod config;
pub mod coordinator;
pub mod error;
mod firewall;
pub mod policy;

pub use config::CoordinatorConfig;
pub use coordinator::{InstancePolicy, NetworkCoordinator, NodeManager, Storage};
pub use error::{NetworkError, NetworkResult};

pub use fleetmesh_state::types::{
    ExposedPort, FirewallRule, InstanceIdent, InstanceNetworkInfo, NetworkId,
    NetworkParameters, NodeId, ProviderBinding,
};
