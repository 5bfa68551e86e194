//! redb table definitions for the fleetmesh state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain
//! types, except `NODE_STATE` which stores caller-opaque bytes).

use redb::TableDefinition;

/// Provider-network bindings keyed by `{network_id}/{node_id}`.
pub const NETWORKS: TableDefinition<&str, &[u8]> = TableDefinition::new("networks");

/// Per-instance network records keyed by `{service_id}:{subject_id}:{instance}`.
pub const NETWORK_INSTANCES: TableDefinition<&str, &[u8]> =
    TableDefinition::new("network_instances");

/// Opaque per-node state blobs keyed by `{node_id}`.
pub const NODE_STATE: TableDefinition<&str, &[u8]> = TableDefinition::new("node_state");
