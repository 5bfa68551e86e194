//! Domain types for the placement engine.

use serde::{Deserialize, Serialize};

pub use fleetmesh_state::types::InstanceIdent;

/// Static identity of a cluster node as seen by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSnapshot {
    pub node_id: String,
    pub node_type: String,
    /// Execution engines this node offers. Empty means the default set.
    pub runners: Vec<String>,
    /// Whether the node is the one running the coordinator. Remote
    /// nodes receive remote artifact URLs in their run requests.
    pub is_local: bool,
}

/// Scheduling capabilities of a node, supplied by the resource manager.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeConfig {
    pub priority: u32,
    pub labels: Vec<String>,
    pub resources: Vec<String>,
    pub devices: Vec<DeviceConfig>,
}

/// A device a node offers for shared allocation.
///
/// `shared_count == 0` marks the device as non-shareable; it is never
/// eligible for allocation through the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub name: String,
    pub shared_count: u32,
}

/// Downloadable service artifact descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub service_id: String,
    pub url: String,
}

/// A service artifact together with its remote form, as handed over by
/// the image manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceImage {
    pub info: ServiceInfo,
    /// URL reachable from nodes other than the local one.
    pub remote_url: String,
}

/// Scheduling requirements a service puts on its host node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceRequirements {
    pub runners: Vec<String>,
    pub resources: Vec<String>,
    pub devices: Vec<String>,
}

/// Downloadable layer artifact descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerInfo {
    pub digest: String,
    pub url: String,
}

/// A layer artifact together with its remote form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerImage {
    pub info: LayerInfo,
    pub remote_url: String,
}

/// An instance awaiting placement or dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRequest {
    pub ident: InstanceIdent,
    pub priority: u32,
    /// Labels the hosting node must carry.
    pub labels: Vec<String>,
}

/// The pending dispatch set of one node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub services: Vec<ServiceInfo>,
    pub layers: Vec<LayerInfo>,
    pub instances: Vec<InstanceRequest>,
}
