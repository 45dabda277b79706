//! Per-port participant state.

use crate::machine::LeaveAllState;
use crate::types::{Msti, PortNo, VidSet};

#[derive(Debug)]
pub struct Participant {
    pub port: PortNo,
    /// GVRP administratively enabled on the port.
    pub enabled: bool,
    /// Last MSTP forwarding state reported per instance.
    pub forwarding: [bool; Msti::COUNT],
    /// Number of GIP contexts the port is linked into.
    pub gip_count: usize,
    pub leave_all: LeaveAllState,
    /// VLANs whose applicant waits for a transmit opportunity.
    pub tx_pending: VidSet,
}

impl Participant {
    pub fn new(port: PortNo) -> Self {
        Self {
            port,
            enabled: false,
            forwarding: [false; Msti::COUNT],
            gip_count: 0,
            leave_all: LeaveAllState::default(),
            tx_pending: VidSet::new(),
        }
    }

    /// Whether the port should be linked into the context of `msti`.
    pub fn participates(&self, msti: Msti) -> bool {
        self.enabled && self.forwarding[msti.index()]
    }

    /// Linked into at least one GIP context.
    pub fn is_active(&self) -> bool {
        self.gip_count > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participates_needs_enable_and_forwarding() {
        let mut participant = Participant::new(3);
        participant.forwarding[0] = true;
        assert!(!participant.participates(Msti::CIST));

        participant.enabled = true;
        assert!(participant.participates(Msti::CIST));
        assert!(!participant.participates(Msti::new(1).unwrap()));
        assert!(!participant.is_active());
    }
}
