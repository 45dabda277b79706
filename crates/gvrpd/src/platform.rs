//! Platform side of the engine: MSTP state tables fed by the daemon and
//! an outbound frame queue.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::trace;

use sonic_gvrp::{GvrpCallbacks, Msti, MstiMap, PortNo, Vid};

/// A PDU ready to be put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    pub port: PortNo,
    pub frame: Vec<u8>,
}

/// [`GvrpCallbacks`] backed by tables the actor keeps current.
pub struct DaemonCallbacks {
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    blocked: Mutex<HashSet<(PortNo, Msti)>>,
    map: Mutex<MstiMap>,
    membership_pending: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // The tables stay consistent across a panic in another holder.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DaemonCallbacks {
    /// Every port starts forwarding on every instance, every VLAN on the CIST.
    pub fn new(outbound: mpsc::UnboundedSender<OutboundFrame>) -> Self {
        Self {
            outbound,
            blocked: Mutex::new(HashSet::new()),
            map: Mutex::new(MstiMap::new()),
            membership_pending: AtomicBool::new(false),
        }
    }

    pub fn set_forwarding(&self, port: PortNo, msti: Msti, forwarding: bool) {
        let mut blocked = lock(&self.blocked);
        if forwarding {
            blocked.remove(&(port, msti));
        } else {
            blocked.insert((port, msti));
        }
    }

    pub fn set_msti_map(&self, map: MstiMap) {
        *lock(&self.map) = map;
    }

    /// Clears and returns the membership-changed signal.
    pub fn take_membership_signal(&self) -> bool {
        self.membership_pending.swap(false, Ordering::AcqRel)
    }
}

impl GvrpCallbacks for DaemonCallbacks {
    fn transmit(&self, port: PortNo, frame: &[u8]) -> Result<(), String> {
        trace!(port, len = frame.len(), "queueing PDU");
        self.outbound
            .send(OutboundFrame {
                port,
                frame: frame.to_vec(),
            })
            .map_err(|_| "outbound frame queue closed".to_string())
    }

    fn msti_forwarding(&self, port: PortNo, msti: Msti) -> bool {
        !lock(&self.blocked).contains(&(port, msti))
    }

    fn vlan_msti(&self, vid: Vid) -> Option<Msti> {
        Some(lock(&self.map).get(vid))
    }

    fn msti_map(&self) -> MstiMap {
        lock(&self.map).clone()
    }

    fn vlan_membership_changed(&self) {
        self.membership_pending.store(true, Ordering::Release);
    }
}
