//! Per-node placement state: capabilities, device share counters and
//! the accumulated run request.

use tracing::debug;

use crate::error::{PlacementError, PlacementResult};
use crate::types::{
    InstanceRequest, LayerImage, NodeConfig, NodeSnapshot, RunRequest, ServiceImage,
};

/// Live allocation counter of one shareable device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NodeDevice {
    pub(crate) name: String,
    pub(crate) shared_count: u32,
    pub(crate) allocated_count: u32,
}

/// One node as tracked by the placement engine.
pub struct NodeHandler {
    snapshot: NodeSnapshot,
    priority: u32,
    labels: Vec<String>,
    resources: Vec<String>,
    devices: Vec<NodeDevice>,
    run_request: RunRequest,
}

impl NodeHandler {
    pub(crate) fn new(snapshot: NodeSnapshot, config: NodeConfig, run_request: RunRequest) -> Self {
        let devices = config
            .devices
            .into_iter()
            .map(|device| NodeDevice {
                name: device.name,
                shared_count: device.shared_count,
                allocated_count: 0,
            })
            .collect();
        Self {
            snapshot,
            priority: config.priority,
            labels: config.labels,
            resources: config.resources,
            devices,
            run_request,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.snapshot.node_id
    }

    pub(crate) fn priority(&self) -> u32 {
        self.priority
    }

    pub(crate) fn runners(&self) -> &[String] {
        &self.snapshot.runners
    }

    pub(crate) fn labels(&self) -> &[String] {
        &self.labels
    }

    pub(crate) fn resources(&self) -> &[String] {
        &self.resources
    }

    pub(crate) fn run_request(&self) -> &RunRequest {
        &self.run_request
    }

    /// Whether `name` still has a free share on this node.
    pub(crate) fn has_free_device(&self, name: &str) -> bool {
        self.devices.iter().any(|device| {
            device.name == name
                && device.shared_count > 0
                && device.allocated_count < device.shared_count
        })
    }

    /// Take one share of every requested device.
    pub(crate) fn allocate_devices(&mut self, names: &[String]) -> PlacementResult<()> {
        for name in names {
            let device = self
                .devices
                .iter_mut()
                .find(|device| device.name == *name && device.shared_count > 0)
                .ok_or_else(|| PlacementError::DeviceExhausted(name.clone()))?;
            if device.allocated_count == device.shared_count {
                return Err(PlacementError::DeviceExhausted(name.clone()));
            }
            device.allocated_count += 1;
        }
        Ok(())
    }

    /// Append an instance with its service and layers to the pending
    /// run request.
    ///
    /// Services and layers are deduplicated by structural equality; the
    /// remote URL swap for non-local nodes happens before comparison.
    pub(crate) fn add_run_request(
        &mut self,
        instance: &InstanceRequest,
        service: &ServiceImage,
        layers: &[LayerImage],
    ) {
        debug!(ident = %instance.ident, node = %self.snapshot.node_id, "schedule instance on node");
        self.run_request.instances.push(instance.clone());

        let mut service_info = service.info.clone();
        if !self.snapshot.is_local {
            service_info.url = service.remote_url.clone();
        }
        if !self.run_request.services.contains(&service_info) {
            debug!(
                service_id = %service_info.service_id,
                node = %self.snapshot.node_id,
                "schedule service on node"
            );
            self.run_request.services.push(service_info);
        }

        for layer in layers {
            let mut layer_info = layer.info.clone();
            if !self.snapshot.is_local {
                layer_info.url = layer.remote_url.clone();
            }
            if !self.run_request.layers.contains(&layer_info) {
                debug!(
                    digest = %layer_info.digest,
                    node = %self.snapshot.node_id,
                    "schedule layer on node"
                );
                self.run_request.layers.push(layer_info);
            }
        }
    }
}
