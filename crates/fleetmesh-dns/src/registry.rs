//! Hosts registry — the coordinator's DNS view of prepared instances.

use std::collections::HashMap;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{DnsError, DnsResult};
use crate::resolver::{NoopResolver, ResolverControl};

/// In-memory `IP -> hostnames` mapping mirrored into a hosts file.
///
/// The registry owns the single DNS server address advertised to
/// instances and the hosts artifact at `<workdir>/network/hosts`.
pub struct HostsRegistry {
    hosts: HashMap<IpAddr, Vec<String>>,
    hosts_path: PathBuf,
    dns_ip: IpAddr,
    resolver: Box<dyn ResolverControl>,
}

impl HostsRegistry {
    /// Create a registry rooted at `working_dir` with no attached
    /// resolver process.
    pub fn new(working_dir: &Path, dns_ip: IpAddr) -> DnsResult<Self> {
        Self::with_resolver(working_dir, dns_ip, Box::new(NoopResolver))
    }

    /// Create a registry with an explicit resolver control.
    pub fn with_resolver(
        working_dir: &Path,
        dns_ip: IpAddr,
        resolver: Box<dyn ResolverControl>,
    ) -> DnsResult<Self> {
        let dir = working_dir.join("network");
        fs::create_dir_all(&dir).map_err(|source| DnsError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        let registry = Self {
            hosts: HashMap::new(),
            hosts_path: dir.join("hosts"),
            dns_ip,
            resolver,
        };
        registry.rewrite_hosts_file()?;
        debug!(path = %registry.hosts_path.display(), %dns_ip, "hosts registry ready");
        Ok(registry)
    }

    /// The single authoritative DNS server advertised to instances.
    pub fn dns_ip(&self) -> IpAddr {
        self.dns_ip
    }

    /// Path of the hosts artifact.
    pub fn hosts_path(&self) -> &Path {
        &self.hosts_path
    }

    /// Overwrite the entry for `ip` with `hostnames`, rewrite the hosts
    /// file, and signal the resolver.
    ///
    /// Hostnames are not validated beyond non-emptiness.
    pub fn add_hosts(&mut self, hostnames: &[String], ip: IpAddr) -> DnsResult<()> {
        if hostnames.iter().any(|name| name.is_empty()) {
            return Err(DnsError::EmptyHostname(ip));
        }
        self.hosts.insert(ip, hostnames.to_vec());
        self.rewrite_hosts_file()?;
        self.resolver.flush_cache();
        self.resolver.reload().map_err(DnsError::Reload)?;
        debug!(%ip, names = hostnames.len(), "dns hosts registered");
        Ok(())
    }

    /// Drop the entry for `ip`. The file is rewritten on the next
    /// change or restart.
    pub fn remove_ip(&mut self, ip: &IpAddr) {
        self.hosts.remove(ip);
    }

    /// Hostnames currently registered for `ip`.
    pub fn hosts_for(&self, ip: &IpAddr) -> Option<&[String]> {
        self.hosts.get(ip).map(Vec::as_slice)
    }

    /// Flush the resolver's cached answers.
    pub fn clean_cache(&self) {
        self.resolver.flush_cache();
    }

    /// Force-rewrite the hosts file and make the resolver re-read it.
    pub fn restart(&self) -> DnsResult<()> {
        self.rewrite_hosts_file()?;
        self.resolver.flush_cache();
        self.resolver.reload().map_err(DnsError::Reload)
    }

    fn rewrite_hosts_file(&self) -> DnsResult<()> {
        let mut entries: Vec<_> = self.hosts.iter().collect();
        entries.sort_by_key(|(ip, _)| **ip);

        let mut contents = String::new();
        for (ip, names) in entries {
            contents.push_str(&format!("{ip}\t{}\n", names.join(" ")));
        }
        fs::write(&self.hosts_path, contents).map_err(|source| DnsError::WriteHosts {
            path: self.hosts_path.clone(),
            source,
        })
    }
}
