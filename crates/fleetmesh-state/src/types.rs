//! Domain types for the fleetmesh state store.
//!
//! These types represent the persisted view of provider networks and
//! instance network assignments. They are shared by the network
//! coordinator and the placement engine, and are serializable to/from
//! JSON for storage in redb tables.

use serde::{Deserialize, Serialize};

/// Name of a provider network (tenant-scoped L2/L3 domain).
pub type NetworkId = String;

/// Identifier of a cluster node.
pub type NodeId = String;

// ── Instance identity ─────────────────────────────────────────────

/// Identity key for a service instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceIdent {
    pub service_id: String,
    pub subject_id: String,
    pub instance: u64,
}

impl InstanceIdent {
    pub fn new(service_id: &str, subject_id: &str, instance: u64) -> Self {
        Self {
            service_id: service_id.to_string(),
            subject_id: subject_id.to_string(),
            instance,
        }
    }

    /// Build the composite key for the instances table.
    pub fn table_key(&self) -> String {
        format!("{}:{}:{}", self.service_id, self.subject_id, self.instance)
    }
}

impl std::fmt::Display for InstanceIdent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.service_id, self.subject_id, self.instance)
    }
}

// ── Network parameters ────────────────────────────────────────────

/// Materialised per-instance network record pushed out to node agents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkParameters {
    pub network_id: NetworkId,
    /// Textual IPv4 address assigned to the owner of this record.
    pub ip: String,
    /// CIDR of the provider subnet the address was carved from.
    pub subnet: String,
    /// 802.1Q VLAN id of the provider network, `1..=4096`. Zero when the
    /// provider network has never been reconciled onto a node.
    pub vlan_id: u16,
    /// DNS servers advertised to the instance.
    pub dns_servers: Vec<String>,
    /// Synthesised egress allow-list entries.
    pub firewall_rules: Vec<FirewallRule>,
}

/// Egress allow-list entry produced when one instance declares a
/// connection toward a peer service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRule {
    pub src_ip: String,
    pub dst_ip: String,
    pub proto: String,
    pub dst_port: String,
}

/// Ingress descriptor: a local port an instance exposes to peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposedPort {
    pub protocol: String,
    pub port: String,
}

// ── Persisted records ─────────────────────────────────────────────

/// One node's membership in a provider network.
///
/// Multiple bindings exist per network (one per node); they share the
/// network's `vlan_id` but each carries its own gateway IP and subnet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderBinding {
    pub network_id: NetworkId,
    pub node_id: NodeId,
    pub subnet: String,
    pub ip: String,
    pub vlan_id: u16,
}

impl ProviderBinding {
    /// Build the composite key for the networks table.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.network_id, self.node_id)
    }

    /// The network parameter set published to the binding's node.
    pub fn parameters(&self) -> NetworkParameters {
        NetworkParameters {
            network_id: self.network_id.clone(),
            ip: self.ip.clone(),
            subnet: self.subnet.clone(),
            vlan_id: self.vlan_id,
            dns_servers: Vec::new(),
            firewall_rules: Vec::new(),
        }
    }
}

/// Network assignment of a single instance, including the ingress ports
/// it exposes to peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceNetworkInfo {
    pub ident: InstanceIdent,
    pub params: NetworkParameters,
    pub exposed_ports: Vec<ExposedPort>,
}

impl InstanceNetworkInfo {
    /// Build the composite key for the instances table.
    pub fn table_key(&self) -> String {
        self.ident.table_key()
    }
}
