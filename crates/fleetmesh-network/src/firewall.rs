//! Egress firewall-rule synthesis.
//!
//! Turns an instance's `AllowConnections` policy into concrete
//! `(src, dst, proto, port)` allow-list entries by scanning every known
//! instance for matching exposed ports. Peers inside the source's own
//! subnet are skipped: same-subnet traffic is not fenced here.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

use fleetmesh_state::types::{FirewallRule, InstanceIdent, InstanceNetworkInfo, NetworkId};

use crate::error::{NetworkError, NetworkResult};
use crate::policy::{self, AllowConnection};

pub(crate) type InstanceTable = HashMap<NetworkId, HashMap<InstanceIdent, InstanceNetworkInfo>>;

/// Synthesise egress rules for a source instance at `src_ip`/`subnet`.
///
/// Rules come out in `allow_connections` order; entries that match no
/// peer are silently dropped.
pub(crate) fn synthesize_egress(
    instances: &InstanceTable,
    subnet: &str,
    src_ip: &str,
    allow_connections: &[String],
) -> NetworkResult<Vec<FirewallRule>> {
    let src_net: Ipv4Net = subnet
        .parse()
        .map_err(|_| NetworkError::InvalidAddress(subnet.to_string()))?;

    let mut rules = Vec::new();
    for connection in allow_connections {
        let allow = policy::parse_allow_connection(connection)?;
        if let Some(rule) = egress_rule_for(instances, &src_net, src_ip, &allow)? {
            rules.push(rule);
        }
    }
    Ok(rules)
}

/// Find the first peer of `allow.service_id` outside `src_net` exposing
/// the requested port, and build the allow-list entry toward it.
///
/// Returns `None` when no peer qualifies. Only the first match produces
/// a rule; one AllowConnections entry yields at most one peer.
fn egress_rule_for(
    instances: &InstanceTable,
    src_net: &Ipv4Net,
    src_ip: &str,
    allow: &AllowConnection,
) -> NetworkResult<Option<FirewallRule>> {
    for infos in instances.values() {
        for info in infos.values() {
            if info.ident.service_id != allow.service_id {
                continue;
            }
            let dst: Ipv4Addr = info
                .params
                .ip
                .parse()
                .map_err(|_| NetworkError::InvalidAddress(info.params.ip.clone()))?;
            if src_net.contains(&dst) {
                continue;
            }
            let exposed = info
                .exposed_ports
                .iter()
                .any(|p| p.port == allow.port && p.protocol == allow.protocol);
            if exposed {
                return Ok(Some(FirewallRule {
                    src_ip: src_ip.to_string(),
                    dst_ip: info.params.ip.clone(),
                    proto: allow.protocol.clone(),
                    dst_port: allow.port.clone(),
                }));
            }
        }
    }
    Ok(None)
}
