//! StateStore — redb-backed persistence for fleetmesh.
//!
//! Provides typed CRUD operations over provider-network bindings,
//! instance network records, and opaque per-node state blobs. All typed
//! values are JSON-serialized into redb's `&[u8]` value columns. The
//! store supports both on-disk and in-memory backends (the latter for
//! testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Closure factory stringifying a backend error into the given variant.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Backend))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(NETWORKS).map_err(map_err!(Backend))?;
        txn.open_table(NETWORK_INSTANCES).map_err(map_err!(Backend))?;
        txn.open_table(NODE_STATE).map_err(map_err!(Backend))?;
        txn.commit().map_err(map_err!(Backend))?;
        Ok(())
    }

    // ── Provider-network bindings ──────────────────────────────────

    /// Insert or update a provider-network binding.
    pub fn add_network_info(&self, binding: &ProviderBinding) -> StateResult<()> {
        let key = binding.table_key();
        let value = serde_json::to_vec(binding).map_err(map_err!(Encode))?;
        let txn = self.db.begin_write().map_err(map_err!(Backend))?;
        {
            let mut table = txn.open_table(NETWORKS).map_err(map_err!(Backend))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Backend))?;
        }
        txn.commit().map_err(map_err!(Backend))?;
        debug!(%key, "network binding stored");
        Ok(())
    }

    /// Remove the binding of `network_id` on `node_id`.
    ///
    /// An empty `node_id` addresses stale rows persisted without a node
    /// association. Removing a non-existent binding is not an error.
    pub fn remove_network_info(&self, network_id: &str, node_id: &str) -> StateResult<()> {
        let key = format!("{network_id}/{node_id}");
        let txn = self.db.begin_write().map_err(map_err!(Backend))?;
        {
            let mut table = txn.open_table(NETWORKS).map_err(map_err!(Backend))?;
            table.remove(key.as_str()).map_err(map_err!(Backend))?;
        }
        txn.commit().map_err(map_err!(Backend))?;
        Ok(())
    }

    /// List all provider-network bindings.
    pub fn get_networks_info(&self) -> StateResult<Vec<ProviderBinding>> {
        let txn = self.db.begin_read().map_err(map_err!(Backend))?;
        let table = txn.open_table(NETWORKS).map_err(map_err!(Backend))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Backend))? {
            let (_, value) = entry.map_err(map_err!(Backend))?;
            let binding: ProviderBinding =
                serde_json::from_slice(value.value()).map_err(map_err!(Decode))?;
            results.push(binding);
        }
        Ok(results)
    }

    // ── Instance network records ───────────────────────────────────

    /// Insert or update an instance network record.
    pub fn add_network_instance_info(&self, info: &InstanceNetworkInfo) -> StateResult<()> {
        let key = info.table_key();
        let value = serde_json::to_vec(info).map_err(map_err!(Encode))?;
        let txn = self.db.begin_write().map_err(map_err!(Backend))?;
        {
            let mut table = txn
                .open_table(NETWORK_INSTANCES)
                .map_err(map_err!(Backend))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Backend))?;
        }
        txn.commit().map_err(map_err!(Backend))?;
        Ok(())
    }

    /// Remove the network record of an instance. Not an error if absent.
    pub fn remove_network_instance_info(&self, ident: &InstanceIdent) -> StateResult<()> {
        let key = ident.table_key();
        let txn = self.db.begin_write().map_err(map_err!(Backend))?;
        {
            let mut table = txn
                .open_table(NETWORK_INSTANCES)
                .map_err(map_err!(Backend))?;
            table.remove(key.as_str()).map_err(map_err!(Backend))?;
        }
        txn.commit().map_err(map_err!(Backend))?;
        Ok(())
    }

    /// List all instance network records.
    pub fn get_network_instances_info(&self) -> StateResult<Vec<InstanceNetworkInfo>> {
        let txn = self.db.begin_read().map_err(map_err!(Backend))?;
        let table = txn.open_table(NETWORK_INSTANCES).map_err(map_err!(Backend))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Backend))? {
            let (_, value) = entry.map_err(map_err!(Backend))?;
            let info: InstanceNetworkInfo =
                serde_json::from_slice(value.value()).map_err(map_err!(Decode))?;
            results.push(info);
        }
        Ok(results)
    }

    // ── Node state blobs ───────────────────────────────────────────

    /// Get the opaque state blob stored for a node.
    ///
    /// Returns [`StateError::NotFound`] when no blob was ever stored,
    /// distinguishable from I/O failures.
    pub fn get_node_state(&self, node_id: &str) -> StateResult<Vec<u8>> {
        let txn = self.db.begin_read().map_err(map_err!(Backend))?;
        let table = txn.open_table(NODE_STATE).map_err(map_err!(Backend))?;
        match table.get(node_id).map_err(map_err!(Backend))? {
            Some(guard) => Ok(guard.value().to_vec()),
            None => Err(StateError::NotFound(format!("node state: {node_id}"))),
        }
    }

    /// Store the opaque state blob for a node.
    pub fn set_node_state(&self, node_id: &str, state: &[u8]) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Backend))?;
        {
            let mut table = txn.open_table(NODE_STATE).map_err(map_err!(Backend))?;
            table.insert(node_id, state).map_err(map_err!(Backend))?;
        }
        txn.commit().map_err(map_err!(Backend))?;
        debug!(%node_id, bytes = state.len(), "node state stored");
        Ok(())
    }
}
