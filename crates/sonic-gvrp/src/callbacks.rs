//! Boundary between the engine and the switch platform.

use crate::types::{Msti, MstiMap, PortNo, Vid};

/// Platform services used by the GVRP engine.
///
/// Implementations are shared with the host (`Arc<dyn GvrpCallbacks>`), so
/// state they mutate needs interior mutability.
pub trait GvrpCallbacks: Send + Sync {
    /// Sends a finished GVRP frame out of `port`.
    fn transmit(&self, port: PortNo, frame: &[u8]) -> Result<(), String>;

    /// True if `port` is forwarding on `msti`.
    fn msti_forwarding(&self, port: PortNo, msti: Msti) -> bool;

    /// Instance a VLAN is mapped to, or `None` if the lookup fails.
    fn vlan_msti(&self, vid: Vid) -> Option<Msti>;

    /// The complete VLAN to instance map.
    fn msti_map(&self) -> MstiMap;

    /// Pending VLAN membership changes are ready to be drained.
    fn vlan_membership_changed(&self) {}
}
