//! Network coordinator — reconciles provider networks across nodes and
//! allocates per-instance network parameters.
//!
//! All state lives behind one readers-writer lock: the instance table,
//! the provider bindings, the subnet allocator's free lists and the DNS
//! registry move together, so every mutating entry point takes the
//! write guard for its full duration (storage and publication included).
//! Mutations are ordered persist-then-insert; a persistence failure
//! leaves the in-memory state unchanged.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, RwLock};

use tracing::{debug, error, warn};

use fleetmesh_dns::HostsRegistry;
use fleetmesh_ipam::{RandomVlanPicker, SubnetAllocator, SubnetPool, VlanPicker};
use fleetmesh_state::types::{
    InstanceIdent, InstanceNetworkInfo, NetworkId, NetworkParameters, ProviderBinding,
};
use fleetmesh_state::StateStore;

use crate::config::CoordinatorConfig;
use crate::error::{NetworkError, NetworkResult};
use crate::firewall::{self, InstanceTable};
use crate::policy;

/// Durable persistence consumed by the coordinator.
pub trait Storage: Send + Sync {
    fn add_network_instance_info(
        &self,
        info: &InstanceNetworkInfo,
    ) -> fleetmesh_state::StateResult<()>;
    fn remove_network_instance_info(
        &self,
        ident: &InstanceIdent,
    ) -> fleetmesh_state::StateResult<()>;
    fn get_network_instances_info(
        &self,
    ) -> fleetmesh_state::StateResult<Vec<InstanceNetworkInfo>>;
    fn add_network_info(&self, binding: &ProviderBinding) -> fleetmesh_state::StateResult<()>;
    fn remove_network_info(
        &self,
        network_id: &str,
        node_id: &str,
    ) -> fleetmesh_state::StateResult<()>;
    fn get_networks_info(&self) -> fleetmesh_state::StateResult<Vec<ProviderBinding>>;
}

impl Storage for StateStore {
    fn add_network_instance_info(
        &self,
        info: &InstanceNetworkInfo,
    ) -> fleetmesh_state::StateResult<()> {
        StateStore::add_network_instance_info(self, info)
    }

    fn remove_network_instance_info(
        &self,
        ident: &InstanceIdent,
    ) -> fleetmesh_state::StateResult<()> {
        StateStore::remove_network_instance_info(self, ident)
    }

    fn get_network_instances_info(
        &self,
    ) -> fleetmesh_state::StateResult<Vec<InstanceNetworkInfo>> {
        StateStore::get_network_instances_info(self)
    }

    fn add_network_info(&self, binding: &ProviderBinding) -> fleetmesh_state::StateResult<()> {
        StateStore::add_network_info(self, binding)
    }

    fn remove_network_info(
        &self,
        network_id: &str,
        node_id: &str,
    ) -> fleetmesh_state::StateResult<()> {
        StateStore::remove_network_info(self, network_id, node_id)
    }

    fn get_networks_info(&self) -> fleetmesh_state::StateResult<Vec<ProviderBinding>> {
        StateStore::get_networks_info(self)
    }
}

/// Pushes a node's computed network parameter set out to the node.
pub trait NodeManager: Send + Sync {
    fn update_network(
        &self,
        node_id: &str,
        parameters: &[NetworkParameters],
    ) -> anyhow::Result<()>;
}

/// User-declared network policy attached to an instance prepare call.
#[derive(Debug, Clone, Default)]
pub struct InstancePolicy {
    /// Extra hostnames to register beside the autogenerated ones.
    pub hosts: Vec<String>,
    /// Egress entries: `"service/port"` or `"service/port/proto"`.
    pub allow_connections: Vec<String>,
    /// Ingress entries: `"port"` or `"port/proto"`.
    pub expose_ports: Vec<String>,
}

struct Inner {
    instances: InstanceTable,
    provider_networks: HashMap<NetworkId, Vec<ProviderBinding>>,
    ipam: Box<dyn SubnetAllocator>,
    vlan: Box<dyn VlanPicker>,
    dns: HostsRegistry,
}

/// Central coordinator over provider networks and instance addressing.
pub struct NetworkCoordinator {
    inner: RwLock<Inner>,
    storage: Arc<dyn Storage>,
    node_manager: Arc<dyn NodeManager>,
}

impl std::fmt::Debug for NetworkCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkCoordinator").finish_non_exhaustive()
    }
}

impl NetworkCoordinator {
    /// Create a coordinator with the production subnet pool and VLAN
    /// picker, reconstructing state from storage.
    pub fn new(
        storage: Arc<dyn Storage>,
        node_manager: Arc<dyn NodeManager>,
        config: &CoordinatorConfig,
    ) -> NetworkResult<Self> {
        let pool = SubnetPool::new(config.address_pool, config.network_prefix_len)?;
        let dns = HostsRegistry::new(&config.working_dir, config.dns_ip)?;
        Self::with_allocators(
            storage,
            node_manager,
            dns,
            Box::new(pool),
            Box::new(RandomVlanPicker),
        )
    }

    /// Create a coordinator with injected allocation strategies.
    pub fn with_allocators(
        storage: Arc<dyn Storage>,
        node_manager: Arc<dyn NodeManager>,
        dns: HostsRegistry,
        ipam: Box<dyn SubnetAllocator>,
        vlan: Box<dyn VlanPicker>,
    ) -> NetworkResult<Self> {
        debug!("create network coordinator");

        let mut inner = Inner {
            instances: InstanceTable::new(),
            provider_networks: HashMap::new(),
            ipam,
            vlan,
            dns,
        };

        // Phase one: rebuild the in-memory view from persisted rows.
        let bindings = storage.get_networks_info()?;
        for binding in &bindings {
            inner
                .provider_networks
                .entry(binding.network_id.clone())
                .or_default()
                .push(binding.clone());
        }

        let dns_server = inner.dns.dns_ip().to_string();
        for mut info in storage.get_network_instances_info()? {
            info.params.dns_servers = vec![dns_server.clone()];
            inner
                .instances
                .entry(info.params.network_id.clone())
                .or_default()
                .insert(info.ident.clone(), info);
        }

        // Phase two: reseed the allocator so nothing persisted can be
        // handed out again. Instance records go first, keeping their
        // subnet the network's instance subnet. Failures here mean the
        // stored rows violate the uniqueness invariant.
        for info in inner.instances.values().flat_map(|m| m.values()) {
            if let Err(err) = inner.ipam.mark_allocated(
                &info.params.network_id,
                &info.params.subnet,
                &info.params.ip,
            ) {
                error!(ident = %info.ident, %err, "persisted instance record rejected");
                return Err(NetworkError::CorruptedState(err.to_string()));
            }
        }
        for binding in &bindings {
            if let Err(err) =
                inner
                    .ipam
                    .mark_allocated(&binding.network_id, &binding.subnet, &binding.ip)
            {
                error!(network_id = %binding.network_id, %err, "persisted binding rejected");
                return Err(NetworkError::CorruptedState(err.to_string()));
            }
        }

        Ok(Self {
            inner: RwLock::new(inner),
            storage,
            node_manager,
        })
    }

    /// Reconcile the set of provider networks `node_id` participates in.
    ///
    /// Bindings of this node for networks not named in `provider_ids`
    /// are dropped (rows with an empty node id are legacy leftovers and
    /// are dropped unconditionally); a provider left without bindings is
    /// torn down entirely, instances included. Missing bindings are then
    /// created, preserving the provider's VLAN, and the resulting
    /// parameter set is published to the node.
    pub fn reconcile_node_providers(
        &self,
        node_id: &str,
        provider_ids: &[String],
    ) -> NetworkResult<Vec<NetworkParameters>> {
        let mut inner = self.inner.write().expect("coordinator lock");
        let inner = &mut *inner;

        self.remove_provider_networks(inner, provider_ids, node_id);
        let parameters = self.add_provider_networks(inner, provider_ids, node_id)?;

        self.node_manager
            .update_network(node_id, &parameters)
            .map_err(NetworkError::Transport)?;

        Ok(parameters)
    }

    /// Prepare (or refresh) the network parameters of one instance.
    ///
    /// Hostnames are expanded with the canonical instance names, the
    /// address is allocated on first sight (or reallocated when the
    /// instance moved to another provider network), DNS is updated and
    /// egress rules are synthesised from `allow_connections`. A DNS
    /// failure after allocation surfaces to the caller without rolling
    /// the allocation back.
    pub fn prepare_instance(
        &self,
        ident: &InstanceIdent,
        network_id: &str,
        policy: &InstancePolicy,
    ) -> NetworkResult<NetworkParameters> {
        let hosts = expand_hosts(ident, network_id, &policy.hosts);

        let mut inner = self.inner.write().expect("coordinator lock");
        let inner = &mut *inner;

        let mut current = find_instance(&inner.instances, ident);
        if current
            .as_ref()
            .is_some_and(|(net, _)| net != network_id)
        {
            if let Some((moved_from, _)) = current.take() {
                self.remove_instance_locked(inner, &moved_from, ident);
                debug!(%ident, from = %moved_from, to = %network_id, "instance moved networks");
            }
        }

        let mut params = match current {
            Some((_, params)) => params,
            None => self.create_instance_network(inner, ident, network_id, policy)?,
        };

        let addr: Ipv4Addr = params
            .ip
            .parse()
            .map_err(|_| NetworkError::InvalidAddress(params.ip.clone()))?;
        inner.dns.add_hosts(&hosts, IpAddr::V4(addr))?;

        if !policy.allow_connections.is_empty() {
            params.firewall_rules = firewall::synthesize_egress(
                &inner.instances,
                &params.subnet,
                &params.ip,
                &policy.allow_connections,
            )?;
        }

        Ok(params)
    }

    /// Tear down an instance's network assignment. No-op if unknown.
    pub fn remove_instance(&self, ident: &InstanceIdent) {
        let mut inner = self.inner.write().expect("coordinator lock");
        let inner = &mut *inner;

        let Some((network_id, _)) = find_instance(&inner.instances, ident) else {
            return;
        };
        self.remove_instance_locked(inner, &network_id, ident);
    }

    /// Snapshot of every known instance identity across all networks.
    pub fn get_instances(&self) -> Vec<InstanceIdent> {
        let inner = self.inner.read().expect("coordinator lock");
        inner
            .instances
            .values()
            .flat_map(|instances| instances.keys().cloned())
            .collect()
    }

    /// Rewrite the hosts file and force the resolver to re-read it.
    pub fn restart_dns_server(&self) -> NetworkResult<()> {
        let inner = self.inner.read().expect("coordinator lock");
        inner.dns.restart()?;
        Ok(())
    }

    // ── Provider bookkeeping ───────────────────────────────────────

    fn remove_provider_networks(&self, inner: &mut Inner, providers: &[String], node_id: &str) {
        let network_ids: Vec<NetworkId> = inner.provider_networks.keys().cloned().collect();

        for network_id in network_ids {
            let bindings = inner
                .provider_networks
                .remove(&network_id)
                .unwrap_or_default();

            // Rows without a node association are legacy leftovers.
            let mut valid = Vec::new();
            for binding in bindings {
                if binding.node_id.is_empty() {
                    if let Err(err) = self.storage.remove_network_info(&network_id, "") {
                        warn!(%network_id, %err, "can't remove stale network row");
                    }
                    continue;
                }
                valid.push(binding);
            }

            let requested = providers.iter().any(|p| p == &network_id);
            if requested && !valid.is_empty() {
                inner.provider_networks.insert(network_id, valid);
                continue;
            }

            debug!(%network_id, %node_id, "removing provider network binding");

            let mut remaining = Vec::new();
            for binding in valid {
                if binding.node_id == node_id {
                    if let Err(err) = self.storage.remove_network_info(&network_id, node_id) {
                        warn!(%network_id, %node_id, %err, "can't remove network binding");
                    }
                    continue;
                }
                remaining.push(binding);
            }

            if !remaining.is_empty() {
                inner.provider_networks.insert(network_id, remaining);
                continue;
            }

            // Last binding gone: the provider network disappears and
            // takes its instances and address pool with it.
            if let Some(instances) = inner.instances.remove(&network_id) {
                for (ident, info) in instances {
                    if let Ok(addr) = info.params.ip.parse::<Ipv4Addr>() {
                        inner.dns.remove_ip(&IpAddr::V4(addr));
                        inner.ipam.release_ip(&network_id, addr);
                    }
                    if let Err(err) = self.storage.remove_network_instance_info(&ident) {
                        warn!(%ident, %err, "can't remove instance network record");
                    }
                }
            }
            inner.ipam.release_network(&network_id);
        }
    }

    fn add_provider_networks(
        &self,
        inner: &mut Inner,
        providers: &[String],
        node_id: &str,
    ) -> NetworkResult<Vec<NetworkParameters>> {
        let mut parameters = Vec::with_capacity(providers.len());

        'providers: for provider_id in providers {
            if let Some(bindings) = inner.provider_networks.get(provider_id) {
                for binding in bindings {
                    if binding.node_id == node_id {
                        parameters.push(binding.parameters());
                        continue 'providers;
                    }
                }
                // New node joining an existing provider: the VLAN id is
                // fixed by the first binding.
                let vlan_id = bindings[0].vlan_id;
                parameters.push(self.create_binding(inner, provider_id, node_id, vlan_id)?);
                continue;
            }

            let vlan_id = inner.vlan.pick_vlan(provider_id);
            parameters.push(self.create_binding(inner, provider_id, node_id, vlan_id)?);
        }

        Ok(parameters)
    }

    fn create_binding(
        &self,
        inner: &mut Inner,
        network_id: &str,
        node_id: &str,
        vlan_id: u16,
    ) -> NetworkResult<NetworkParameters> {
        let (subnet, ip) = inner.ipam.prepare_node_subnet(network_id)?;
        let binding = ProviderBinding {
            network_id: network_id.to_string(),
            node_id: node_id.to_string(),
            subnet: subnet.to_string(),
            ip: ip.to_string(),
            vlan_id,
        };

        if let Err(err) = self.storage.add_network_info(&binding) {
            inner.ipam.release_ip(network_id, ip);
            return Err(err.into());
        }

        let params = binding.parameters();
        inner
            .provider_networks
            .entry(network_id.to_string())
            .or_default()
            .push(binding);
        debug!(%network_id, %node_id, subnet = %params.subnet, vlan_id, "provider binding created");
        Ok(params)
    }

    // ── Instance bookkeeping ───────────────────────────────────────

    fn create_instance_network(
        &self,
        inner: &mut Inner,
        ident: &InstanceIdent,
        network_id: &str,
        policy: &InstancePolicy,
    ) -> NetworkResult<NetworkParameters> {
        let (subnet, ip) = inner.ipam.prepare_subnet(network_id)?;
        let vlan_id = inner
            .provider_networks
            .get(network_id)
            .and_then(|bindings| bindings.first())
            .map_or(0, |binding| binding.vlan_id);

        let params = NetworkParameters {
            network_id: network_id.to_string(),
            ip: ip.to_string(),
            subnet: subnet.to_string(),
            vlan_id,
            dns_servers: vec![inner.dns.dns_ip().to_string()],
            firewall_rules: Vec::new(),
        };

        let exposed_ports = match policy::parse_expose_ports(&policy.expose_ports) {
            Ok(ports) => ports,
            Err(err) => {
                inner.ipam.release_ip(network_id, ip);
                return Err(err.into());
            }
        };

        let info = InstanceNetworkInfo {
            ident: ident.clone(),
            params: params.clone(),
            exposed_ports,
        };
        if let Err(err) = self.storage.add_network_instance_info(&info) {
            inner.ipam.release_ip(network_id, ip);
            return Err(err.into());
        }

        inner
            .instances
            .entry(network_id.to_string())
            .or_default()
            .insert(ident.clone(), info);
        debug!(%ident, %network_id, ip = %params.ip, "instance network prepared");
        Ok(params)
    }

    fn remove_instance_locked(&self, inner: &mut Inner, network_id: &str, ident: &InstanceIdent) {
        if let Some(instances) = inner.instances.get_mut(network_id) {
            if let Some(info) = instances.remove(ident) {
                if let Ok(addr) = info.params.ip.parse::<Ipv4Addr>() {
                    inner.dns.remove_ip(&IpAddr::V4(addr));
                    inner.ipam.release_ip(network_id, addr);
                }
            }
        }
        if let Err(err) = self.storage.remove_network_instance_info(ident) {
            error!(%ident, %err, "can't remove instance network record");
        }
    }
}

/// Locate the network an instance currently lives in.
fn find_instance(
    instances: &InstanceTable,
    ident: &InstanceIdent,
) -> Option<(NetworkId, NetworkParameters)> {
    for (network_id, infos) in instances {
        if let Some(info) = infos.get(ident) {
            return Some((network_id.clone(), info.params.clone()));
        }
    }
    None
}

/// Expand user hostnames with the canonical instance names.
///
/// The zero instance additionally answers to the bare `subject.service`
/// names, so clients can address a service without knowing its scale.
fn expand_hosts(ident: &InstanceIdent, network_id: &str, hosts: &[String]) -> Vec<String> {
    let mut expanded = hosts.to_vec();
    if ident.service_id.is_empty() || ident.subject_id.is_empty() {
        return expanded;
    }
    expanded.push(format!(
        "{}.{}.{}",
        ident.instance, ident.subject_id, ident.service_id
    ));
    expanded.push(format!(
        "{}.{}.{}.{}",
        ident.instance, ident.subject_id, ident.service_id, network_id
    ));
    if ident.instance == 0 {
        expanded.push(format!("{}.{}", ident.subject_id, ident.service_id));
        expanded.push(format!(
            "{}.{}.{}",
            ident.subject_id, ident.service_id, network_id
        ));
    }
    expanded
}
