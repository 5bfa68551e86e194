//! PlacementEngine — registers nodes and answers select-node requests.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error};

use fleetmesh_state::{StateError, StateResult, StateStore};

use crate::error::{PlacementError, PlacementResult};
use crate::filter;
use crate::node::NodeHandler;
use crate::types::{
    InstanceRequest, LayerImage, NodeConfig, NodeSnapshot, RunRequest, ServiceImage,
    ServiceRequirements,
};

/// Per-node blob persistence consumed by the engine for run requests.
pub trait NodeStateStorage: Send + Sync {
    fn get_node_state(&self, node_id: &str) -> StateResult<Vec<u8>>;
    fn set_node_state(&self, node_id: &str, state: &[u8]) -> StateResult<()>;
}

impl NodeStateStorage for StateStore {
    fn get_node_state(&self, node_id: &str) -> StateResult<Vec<u8>> {
        StateStore::get_node_state(self, node_id)
    }

    fn set_node_state(&self, node_id: &str, state: &[u8]) -> StateResult<()> {
        StateStore::set_node_state(self, node_id, state)
    }
}

/// Supplies node capability configuration.
pub trait ResourceManager {
    fn get_node_config(&self, node_id: &str, node_type: &str) -> Result<NodeConfig, ResourceError>;
}

/// Errors a [`ResourceManager`] can produce. A missing config is
/// tolerated by the engine and yields a node with empty capabilities.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("node config not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Chooses host nodes for instances and accumulates per-node run
/// requests.
///
/// Placement and device accounting share the node state, so callers
/// serialise placement against re-registration of the same node.
pub struct PlacementEngine {
    storage: Arc<dyn NodeStateStorage>,
    /// Registration order doubles as the priority tie-break order.
    nodes: Vec<NodeHandler>,
}

impl PlacementEngine {
    pub fn new(storage: Arc<dyn NodeStateStorage>) -> Self {
        Self {
            storage,
            nodes: Vec::new(),
        }
    }

    /// Register (or refresh) a node, pulling its capabilities from the
    /// resource manager and restoring its persisted run request.
    pub fn register_node(
        &mut self,
        snapshot: NodeSnapshot,
        resources: &dyn ResourceManager,
    ) -> PlacementResult<()> {
        debug!(node_id = %snapshot.node_id, "init node handler");

        let config = match resources.get_node_config(&snapshot.node_id, &snapshot.node_type) {
            Ok(config) => config,
            Err(ResourceError::NotFound(_)) => NodeConfig::default(),
            Err(err) => return Err(err.into()),
        };

        let run_request = self.load_run_request(&snapshot.node_id);
        let node_id = snapshot.node_id.clone();
        let handler = NodeHandler::new(snapshot, config, run_request);

        match self.nodes.iter_mut().find(|node| node.node_id() == node_id) {
            Some(existing) => *existing = handler,
            None => self.nodes.push(handler),
        }
        Ok(())
    }

    /// Choose the node to host `instance` of a service with the given
    /// requirements, and take the device shares the service asks for.
    ///
    /// Filters apply in fixed order: runners, labels, resources,
    /// devices. The highest-priority survivor wins.
    pub fn select_node(
        &mut self,
        requirements: &ServiceRequirements,
        instance: &InstanceRequest,
    ) -> PlacementResult<String> {
        let candidates: Vec<usize> = (0..self.nodes.len()).collect();
        let candidates = filter::by_runners(&self.nodes, candidates, &requirements.runners)?;
        let candidates = filter::by_labels(&self.nodes, candidates, &instance.labels)?;
        let candidates = filter::by_resources(&self.nodes, candidates, &requirements.resources)?;
        let candidates = filter::by_devices(&self.nodes, candidates, &requirements.devices)?;

        let chosen = filter::most_priority(&self.nodes, &candidates);
        self.nodes[chosen].allocate_devices(&requirements.devices)?;

        let node_id = self.nodes[chosen].node_id().to_string();
        debug!(ident = %instance.ident, node = %node_id, "node selected");
        Ok(node_id)
    }

    /// Append an instance with its artifacts to a node's pending run
    /// request.
    pub fn add_run_request(
        &mut self,
        node_id: &str,
        instance: &InstanceRequest,
        service: &ServiceImage,
        layers: &[LayerImage],
    ) -> PlacementResult<()> {
        let index = self.node_index(node_id)?;
        self.nodes[index].add_run_request(instance, service, layers);
        Ok(())
    }

    /// The pending run request accumulated for a node.
    pub fn run_request(&self, node_id: &str) -> PlacementResult<&RunRequest> {
        let index = self.node_index(node_id)?;
        Ok(self.nodes[index].run_request())
    }

    /// Serialise a node's run request into the state store.
    pub fn persist_run_request(&self, node_id: &str) -> PlacementResult<()> {
        let index = self.node_index(node_id)?;
        let blob = serde_json::to_vec(self.nodes[index].run_request())
            .map_err(|err| PlacementError::Encoding(err.to_string()))?;
        self.storage.set_node_state(node_id, &blob)?;
        Ok(())
    }

    /// Restore a node's run request. A never-persisted node starts
    /// empty; any other failure is logged and also yields empty.
    fn load_run_request(&self, node_id: &str) -> RunRequest {
        let blob = match self.storage.get_node_state(node_id) {
            Ok(blob) => blob,
            Err(StateError::NotFound(_)) => return RunRequest::default(),
            Err(err) => {
                error!(%node_id, %err, "can't load node run request");
                return RunRequest::default();
            }
        };
        match serde_json::from_slice(&blob) {
            Ok(request) => request,
            Err(err) => {
                error!(%node_id, %err, "can't decode node run request");
                RunRequest::default()
            }
        }
    }

    fn node_index(&self, node_id: &str) -> PlacementResult<usize> {
        self.nodes
            .iter()
            .position(|node| node.node_id() == node_id)
            .ok_or_else(|| PlacementError::UnknownNode(node_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::error::FilterStage;
    use crate::types::{DeviceConfig, InstanceIdent, LayerInfo, ServiceInfo};

    /// ResourceManager fake backed by a plain map.
    #[derive(Default)]
    struct FakeResources {
        configs: HashMap<String, NodeConfig>,
    }

    impl FakeResources {
        fn with(mut self, node_id: &str, config: NodeConfig) -> Self {
            self.configs.insert(node_id.to_string(), config);
            self
        }
    }

    impl ResourceManager for FakeResources {
        fn get_node_config(
            &self,
            node_id: &str,
            _node_type: &str,
        ) -> Result<NodeConfig, ResourceError> {
            self.configs
                .get(node_id)
                .cloned()
                .ok_or_else(|| ResourceError::NotFound(node_id.to_string()))
        }
    }

    fn snapshot(node_id: &str, runners: &[&str]) -> NodeSnapshot {
        NodeSnapshot {
            node_id: node_id.to_string(),
            node_type: "worker".to_string(),
            runners: runners.iter().map(|r| r.to_string()).collect(),
            is_local: node_id == "node1",
        }
    }

    fn config(priority: u32) -> NodeConfig {
        NodeConfig {
            priority,
            ..Default::default()
        }
    }

    fn instance(n: u64, labels: &[&str]) -> InstanceRequest {
        InstanceRequest {
            ident: InstanceIdent::new("svc", "sub", n),
            priority: 0,
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    fn requirements(devices: &[&str]) -> ServiceRequirements {
        ServiceRequirements {
            devices: devices.iter().map(|d| d.to_string()).collect(),
            ..Default::default()
        }
    }

    fn engine_with(
        nodes: &[(&str, &[&str], NodeConfig)],
    ) -> PlacementEngine {
        let storage = Arc::new(StateStore::open_in_memory().unwrap());
        let mut engine = PlacementEngine::new(storage);
        let mut resources = FakeResources::default();
        for (node_id, _, config) in nodes {
            resources = resources.with(node_id, config.clone());
        }
        for (node_id, runners, _) in nodes {
            engine.register_node(snapshot(node_id, runners), &resources).unwrap();
        }
        engine
    }

    // ── Selection ──────────────────────────────────────────────────

    #[test]
    fn highest_priority_survivor_wins() {
        let mut engine = engine_with(&[
            ("node1", &[], config(5)),
            ("node2", &[], config(10)),
        ]);

        let node = engine
            .select_node(&ServiceRequirements::default(), &instance(0, &[]))
            .unwrap();
        assert_eq!(node, "node2");
    }

    #[test]
    fn priority_tie_keeps_registration_order() {
        let mut engine = engine_with(&[
            ("node1", &[], config(5)),
            ("node2", &[], config(5)),
        ]);

        let node = engine
            .select_node(&ServiceRequirements::default(), &instance(0, &[]))
            .unwrap();
        assert_eq!(node, "node1");
    }

    #[test]
    fn device_sharing_until_exhaustion() {
        // node1 offers two gpu shares at priority 5; node2 outranks it
        // but has no gpu, so it never survives the devices stage.
        let mut engine = engine_with(&[
            (
                "node1",
                &[],
                NodeConfig {
                    priority: 5,
                    devices: vec![DeviceConfig { name: "gpu".to_string(), shared_count: 2 }],
                    ..Default::default()
                },
            ),
            ("node2", &[], config(10)),
        ]);
        let wants_gpu = requirements(&["gpu"]);

        assert_eq!(engine.select_node(&wants_gpu, &instance(0, &[])).unwrap(), "node1");
        assert_eq!(engine.select_node(&wants_gpu, &instance(1, &[])).unwrap(), "node1");

        let err = engine.select_node(&wants_gpu, &instance(2, &[])).unwrap_err();
        assert!(matches!(
            err,
            PlacementError::NoNode { stage: FilterStage::Devices, .. }
        ));
    }

    #[test]
    fn runner_filter_matches_declared_runners() {
        let mut engine = engine_with(&[
            ("node1", &[], config(10)),
            ("node2", &["xrun"], config(5)),
        ]);

        let needs_xrun = ServiceRequirements {
            runners: vec!["xrun".to_string()],
            ..Default::default()
        };
        let node = engine.select_node(&needs_xrun, &instance(0, &[])).unwrap();
        assert_eq!(node, "node2");
    }

    #[test]
    fn empty_runner_list_offers_defaults() {
        let mut engine = engine_with(&[("node1", &[], config(5))]);

        let wants_default = ServiceRequirements {
            runners: vec!["runc".to_string()],
            ..Default::default()
        };
        assert_eq!(
            engine.select_node(&wants_default, &instance(0, &[])).unwrap(),
            "node1"
        );

        let wants_exotic = ServiceRequirements {
            runners: vec!["xrun".to_string()],
            ..Default::default()
        };
        let err = engine.select_node(&wants_exotic, &instance(0, &[])).unwrap_err();
        assert!(matches!(
            err,
            PlacementError::NoNode { stage: FilterStage::Runners, .. }
        ));
    }

    #[test]
    fn label_filter_requires_all_labels() {
        let mut engine = engine_with(&[
            (
                "node1",
                &[],
                NodeConfig {
                    priority: 1,
                    labels: vec!["ssd".to_string(), "edge".to_string()],
                    ..Default::default()
                },
            ),
            (
                "node2",
                &[],
                NodeConfig {
                    priority: 10,
                    labels: vec!["ssd".to_string()],
                    ..Default::default()
                },
            ),
        ]);

        let node = engine
            .select_node(&ServiceRequirements::default(), &instance(0, &["ssd", "edge"]))
            .unwrap();
        assert_eq!(node, "node1");

        let err = engine
            .select_node(&ServiceRequirements::default(), &instance(0, &["gpu-rack"]))
            .unwrap_err();
        assert!(matches!(
            err,
            PlacementError::NoNode { stage: FilterStage::Labels, .. }
        ));
    }

    #[test]
    fn unlabelled_node_never_matches_labels() {
        let mut engine = engine_with(&[("node1", &[], config(5))]);

        let err = engine
            .select_node(&ServiceRequirements::default(), &instance(0, &["ssd"]))
            .unwrap_err();
        assert!(matches!(
            err,
            PlacementError::NoNode { stage: FilterStage::Labels, .. }
        ));
    }

    #[test]
    fn resource_filter_requires_all_resources() {
        let mut engine = engine_with(&[
            (
                "node1",
                &[],
                NodeConfig {
                    priority: 1,
                    resources: vec!["audio".to_string(), "video".to_string()],
                    ..Default::default()
                },
            ),
            ("node2", &[], config(10)),
        ]);

        let needs_av = ServiceRequirements {
            resources: vec!["audio".to_string(), "video".to_string()],
            ..Default::default()
        };
        assert_eq!(engine.select_node(&needs_av, &instance(0, &[])).unwrap(), "node1");

        let needs_midi = ServiceRequirements {
            resources: vec!["midi".to_string()],
            ..Default::default()
        };
        let err = engine.select_node(&needs_midi, &instance(0, &[])).unwrap_err();
        assert!(matches!(
            err,
            PlacementError::NoNode { stage: FilterStage::Resources, .. }
        ));
    }

    #[test]
    fn shrinking_capabilities_never_grows_the_result() {
        // With the label the node is eligible; re-registering without
        // it can only shrink the survivor set.
        let resources_with = FakeResources::default().with(
            "node1",
            NodeConfig {
                priority: 1,
                labels: vec!["ssd".to_string()],
                ..Default::default()
            },
        );
        let resources_without = FakeResources::default().with("node1", config(1));

        let storage = Arc::new(StateStore::open_in_memory().unwrap());
        let mut engine = PlacementEngine::new(storage);
        engine.register_node(snapshot("node1", &[]), &resources_with).unwrap();
        assert!(engine
            .select_node(&ServiceRequirements::default(), &instance(0, &["ssd"]))
            .is_ok());

        engine.register_node(snapshot("node1", &[]), &resources_without).unwrap();
        assert!(engine
            .select_node(&ServiceRequirements::default(), &instance(0, &["ssd"]))
            .is_err());
    }

    // ── Node registration ──────────────────────────────────────────

    #[test]
    fn missing_node_config_yields_empty_capabilities() {
        let storage = Arc::new(StateStore::open_in_memory().unwrap());
        let mut engine = PlacementEngine::new(storage);
        engine
            .register_node(snapshot("node1", &[]), &FakeResources::default())
            .unwrap();

        // Default-runner services place fine; anything else does not.
        assert!(engine
            .select_node(&ServiceRequirements::default(), &instance(0, &[]))
            .is_ok());
        assert!(engine
            .select_node(&ServiceRequirements::default(), &instance(0, &["ssd"]))
            .is_err());
    }

    #[test]
    fn resource_manager_failure_surfaces() {
        struct FailingResources;
        impl ResourceManager for FailingResources {
            fn get_node_config(
                &self,
                _node_id: &str,
                _node_type: &str,
            ) -> Result<NodeConfig, ResourceError> {
                Err(ResourceError::Other(anyhow::anyhow!("backend down")))
            }
        }

        let storage = Arc::new(StateStore::open_in_memory().unwrap());
        let mut engine = PlacementEngine::new(storage);
        let err = engine
            .register_node(snapshot("node1", &[]), &FailingResources)
            .unwrap_err();
        assert!(matches!(err, PlacementError::Resource(_)));
    }

    // ── Run request persistence ────────────────────────────────────

    fn sample_artifacts() -> (ServiceImage, Vec<LayerImage>) {
        (
            ServiceImage {
                info: ServiceInfo {
                    service_id: "svc".to_string(),
                    url: "file:///svc".to_string(),
                },
                remote_url: "https://registry/svc".to_string(),
            },
            vec![LayerImage {
                info: LayerInfo {
                    digest: "sha256:aaa".to_string(),
                    url: "file:///aaa".to_string(),
                },
                remote_url: "https://registry/aaa".to_string(),
            }],
        )
    }

    #[test]
    fn run_request_persists_and_reloads() {
        let storage = Arc::new(StateStore::open_in_memory().unwrap());
        let resources = FakeResources::default().with("node1", config(5));
        let (service, layers) = sample_artifacts();

        let mut engine = PlacementEngine::new(storage.clone());
        engine.register_node(snapshot("node1", &[]), &resources).unwrap();
        engine
            .add_run_request("node1", &instance(0, &[]), &service, &layers)
            .unwrap();
        engine.persist_run_request("node1").unwrap();
        let expected = engine.run_request("node1").unwrap().clone();

        // A fresh engine over the same storage restores the request.
        let mut engine = PlacementEngine::new(storage);
        engine.register_node(snapshot("node1", &[]), &resources).unwrap();
        assert_eq!(engine.run_request("node1").unwrap(), &expected);
    }

    #[test]
    fn never_persisted_node_starts_empty() {
        let storage = Arc::new(StateStore::open_in_memory().unwrap());
        let mut engine = PlacementEngine::new(storage);
        engine
            .register_node(snapshot("node1", &[]), &FakeResources::default())
            .unwrap();

        assert_eq!(engine.run_request("node1").unwrap(), &RunRequest::default());
    }

    #[test]
    fn corrupt_blob_degrades_to_empty() {
        let storage = Arc::new(StateStore::open_in_memory().unwrap());
        storage.set_node_state("node1", b"not json").unwrap();

        let mut engine = PlacementEngine::new(storage);
        engine
            .register_node(snapshot("node1", &[]), &FakeResources::default())
            .unwrap();

        assert_eq!(engine.run_request("node1").unwrap(), &RunRequest::default());
    }

    #[test]
    fn unknown_node_operations_fail_typed() {
        let storage = Arc::new(StateStore::open_in_memory().unwrap());
        let engine = PlacementEngine::new(storage);

        assert!(matches!(
            engine.run_request("ghost").unwrap_err(),
            PlacementError::UnknownNode(_)
        ));
        assert!(matches!(
            engine.persist_run_request("ghost").unwrap_err(),
            PlacementError::UnknownNode(_)
        ));
    }
}
