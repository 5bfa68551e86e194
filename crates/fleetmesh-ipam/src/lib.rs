//! Subnet and VLAN allocation for fleetmesh provider networks.
//!
//! The [`SubnetPool`] carves per-network subnets out of one configured
//! aggregate: every node binding of a provider network owns a subnet
//! (gateway = first usable host), instance addresses come from the
//! network's first subnet. [`RandomVlanPicker`] supplies 802.1Q VLAN
//! ids from a cryptographic RNG.
//!
//! Both are exposed behind traits ([`SubnetAllocator`], [`VlanPicker`])
//! so the coordinator can be driven with deterministic fakes in tests.

pub mod error;
pub mod subnet;
pub mod vlan;

pub use error::{IpamError, IpamResult};
pub use subnet::{SubnetAllocator, SubnetPool};
pub use vlan::{RandomVlanPicker, VlanPicker, VLAN_CAPACITY};
