//! Per-instance DNS host registry for fleetmesh.
//!
//! Maintains the `IP -> hostnames` view of all prepared instances,
//! mirrors it into a hosts file at `<workdir>/network/hosts`, and pokes
//! the resolver through a [`ResolverControl`] seam after every change.
//! The resolver process itself is managed by the node agents; the
//! default control implementation only traces.

pub mod error;
pub mod registry;
pub mod resolver;

pub use error::{DnsError, DnsResult};
pub use registry::HostsRegistry;
pub use resolver::{NoopResolver, ResolverControl};
