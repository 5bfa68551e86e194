//! Subnet pool — carves provider subnets out of an aggregate range.
//!
//! The pool owns one aggregate (say `172.16.0.0/12`) and splits it into
//! fixed-size networks (say `/24`). Every node binding of a provider
//! network gets its own subnet with the first usable host as gateway;
//! instance addresses are handed out lowest free first inside the
//! network's first subnet.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use tracing::debug;

use crate::error::{IpamError, IpamResult};

/// Allocation interface consumed by the network coordinator.
///
/// The production implementation is [`SubnetPool`]; tests substitute
/// deterministic fakes.
pub trait SubnetAllocator: Send + Sync {
    /// Return the subnet of `network_id` and a freshly allocated host
    /// address inside it, carving a new subnet on first use. Serves
    /// instance allocations.
    fn prepare_subnet(&mut self, network_id: &str) -> IpamResult<(Ipv4Net, Ipv4Addr)>;

    /// Carve a fresh subnet inside `network_id`'s pool and allocate its
    /// gateway (the first usable host). Serves node bindings, which
    /// each own a subnet of the provider network.
    fn prepare_node_subnet(&mut self, network_id: &str) -> IpamResult<(Ipv4Net, Ipv4Addr)>;

    /// Mark a host address free again. Idempotent.
    fn release_ip(&mut self, network_id: &str, ip: Ipv4Addr);

    /// Release every subnet of a network and all addresses in them.
    fn release_network(&mut self, network_id: &str);

    /// Mark a persisted `(subnet, ip)` pair as in use so later
    /// allocations do not collide. Used during startup reconstruction.
    fn mark_allocated(&mut self, network_id: &str, subnet: &str, ip: &str) -> IpamResult<()>;
}

#[derive(Default)]
struct NetworkAllocation {
    /// Subnets backing this network. The first one serves instances.
    subnets: Vec<Ipv4Net>,
    /// Hosts handed out across all of the network's subnets. Subnets
    /// are disjoint, so one set suffices.
    allocated: BTreeSet<Ipv4Addr>,
}

/// Production subnet allocator over a single aggregate range.
pub struct SubnetPool {
    aggregate: Ipv4Net,
    prefix_len: u8,
    /// Indices of carved (or reconstructed) subnets within the aggregate.
    in_use: HashSet<u32>,
    networks: HashMap<String, NetworkAllocation>,
}

impl SubnetPool {
    /// Create a pool splitting `aggregate` into `/prefix_len` networks.
    pub fn new(aggregate: Ipv4Net, prefix_len: u8) -> IpamResult<Self> {
        if prefix_len <= aggregate.prefix_len() || prefix_len > 30 {
            return Err(IpamError::InvalidAddress(format!(
                "network prefix /{prefix_len} does not fit aggregate {aggregate}"
            )));
        }
        Ok(Self {
            aggregate: aggregate.trunc(),
            prefix_len,
            in_use: HashSet::new(),
            networks: HashMap::new(),
        })
    }

    fn subnet_count(&self) -> u32 {
        1u32 << (self.prefix_len - self.aggregate.prefix_len())
    }

    fn subnet_step(&self) -> u32 {
        1u32 << (32 - self.prefix_len)
    }

    fn subnet_at(&self, index: u32) -> Ipv4Net {
        let base = u32::from(self.aggregate.network());
        let addr = Ipv4Addr::from(base + index * self.subnet_step());
        // Prefix length was validated in the constructor.
        Ipv4Net::new(addr, self.prefix_len).expect("valid prefix")
    }

    /// Index of `subnet` within the aggregate, if it belongs to it.
    fn subnet_index(&self, subnet: &Ipv4Net) -> Option<u32> {
        if subnet.prefix_len() != self.prefix_len
            || !self.aggregate.contains(&subnet.network())
        {
            return None;
        }
        let base = u32::from(self.aggregate.network());
        Some((u32::from(subnet.network()) - base) / self.subnet_step())
    }

    fn carve(&mut self, network_id: &str) -> IpamResult<Ipv4Net> {
        let index = (0..self.subnet_count())
            .find(|i| !self.in_use.contains(i))
            .ok_or_else(|| {
                IpamError::Exhausted(format!("no subnet left in {}", self.aggregate))
            })?;
        self.in_use.insert(index);
        let subnet = self.subnet_at(index);
        debug!(%network_id, %subnet, "carved provider subnet");
        Ok(subnet)
    }

    fn carve_with_gateway(&mut self, network_id: &str) -> IpamResult<(Ipv4Net, Ipv4Addr)> {
        let subnet = self.carve(network_id)?;
        let gateway = subnet
            .hosts()
            .next()
            .ok_or_else(|| IpamError::Exhausted(format!("no usable host in {subnet}")))?;
        let alloc = self.networks.entry(network_id.to_string()).or_default();
        alloc.subnets.push(subnet);
        alloc.allocated.insert(gateway);
        Ok((subnet, gateway))
    }
}

impl SubnetAllocator for SubnetPool {
    fn prepare_subnet(&mut self, network_id: &str) -> IpamResult<(Ipv4Net, Ipv4Addr)> {
        if let Some(alloc) = self.networks.get_mut(network_id) {
            if let Some(&subnet) = alloc.subnets.first() {
                let ip = subnet
                    .hosts()
                    .find(|host| !alloc.allocated.contains(host))
                    .ok_or_else(|| {
                        IpamError::Exhausted(format!("no free host in {subnet}"))
                    })?;
                alloc.allocated.insert(ip);
                return Ok((subnet, ip));
            }
        }
        self.carve_with_gateway(network_id)
    }

    fn prepare_node_subnet(&mut self, network_id: &str) -> IpamResult<(Ipv4Net, Ipv4Addr)> {
        self.carve_with_gateway(network_id)
    }

    fn release_ip(&mut self, network_id: &str, ip: Ipv4Addr) {
        if let Some(alloc) = self.networks.get_mut(network_id) {
            alloc.allocated.remove(&ip);
        }
    }

    fn release_network(&mut self, network_id: &str) {
        if let Some(alloc) = self.networks.remove(network_id) {
            for subnet in &alloc.subnets {
                if let Some(index) = self.subnet_index(subnet) {
                    self.in_use.remove(&index);
                }
            }
            debug!(%network_id, subnets = alloc.subnets.len(), "released provider subnets");
        }
    }

    fn mark_allocated(&mut self, network_id: &str, subnet: &str, ip: &str) -> IpamResult<()> {
        let subnet: Ipv4Net = subnet
            .parse()
            .map_err(|_| IpamError::InvalidAddress(subnet.to_string()))?;
        let ip: Ipv4Addr = ip
            .parse()
            .map_err(|_| IpamError::InvalidAddress(ip.to_string()))?;
        if !subnet.contains(&ip) {
            return Err(IpamError::InvalidAddress(format!("{ip} outside {subnet}")));
        }

        if let Some(index) = self.subnet_index(&subnet) {
            self.in_use.insert(index);
        }

        let alloc = self.networks.entry(network_id.to_string()).or_default();
        if !alloc.subnets.contains(&subnet) {
            alloc.subnets.push(subnet);
        }
        if !alloc.allocated.insert(ip) {
            return Err(IpamError::AlreadyAllocated {
                network_id: network_id.to_string(),
                ip: ip.to_string(),
            });
        }
        Ok(())
    }
}
