//! VLAN id selection for provider networks.

use rand::rngs::OsRng;
use rand::Rng;

/// Size of the 802.1Q VLAN id space.
pub const VLAN_CAPACITY: u16 = 4096;

/// Supplies the VLAN id for a new provider network.
///
/// Collisions across concurrently created networks are possible and
/// accepted; the 12-bit space matches 802.1Q and callers may retry on a
/// detected collision.
pub trait VlanPicker: Send + Sync {
    fn pick_vlan(&self, network_id: &str) -> u16;
}

/// Production picker: uniform over `1..=4096` from the operating
/// system's CSPRNG.
pub struct RandomVlanPicker;

impl VlanPicker for RandomVlanPicker {
    fn pick_vlan(&self, _network_id: &str) -> u16 {
        OsRng.gen_range(1..=VLAN_CAPACITY)
    }
}
