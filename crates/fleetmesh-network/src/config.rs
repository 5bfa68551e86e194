//! Coordinator configuration.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

/// Configuration of the network coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Base directory for DNS artifacts (`<working_dir>/network/hosts`).
    pub working_dir: PathBuf,
    /// The single DNS server advertised to instances.
    pub dns_ip: IpAddr,
    /// Aggregate range provider subnets are carved from.
    #[serde(default = "default_address_pool")]
    pub address_pool: Ipv4Net,
    /// Prefix length of each carved provider subnet.
    #[serde(default = "default_network_prefix_len")]
    pub network_prefix_len: u8,
}

impl CoordinatorConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

fn default_address_pool() -> Ipv4Net {
    Ipv4Net::new(Ipv4Addr::new(172, 16, 0, 0), 12).expect("static pool")
}

fn default_network_prefix_len() -> u8 {
    24
}
