//! Transmit opportunities: building and sending PDUs for one participant.

use tracing::{trace, warn};

use super::GvrpEngine;
use crate::error::WarnClass;
use crate::machine::GarpEvent;
use crate::pdu::{Attribute, PduEncoder};
use crate::pool::AllocClass;
use crate::types::{PortNo, Vid};

impl GvrpEngine {
    /// Sends everything pending on `port`: a LeaveAll if one is due, then
    /// one attribute per applicant waiting to transmit.
    pub(super) fn transmit_pdu(&mut self, port: PortNo) {
        if !self.participants[port].is_active() {
            // Pending events wait until the port enters a GIP context.
            return;
        }

        let mut encoder = PduEncoder::new(self.config.source_mac);

        let participant = &mut self.participants[port];
        let (leave_all, send_leave_all) = participant.leave_all.transmit();
        participant.leave_all = leave_all;
        if send_leave_all {
            trace!(port, "sending LeaveAll");
            self.stats.leave_all_tx += 1;
            let sealed = encoder.push(Attribute::LeaveAll);
            self.send(port, sealed);
            self.apply_leave_all(port);
        }

        let pending: Vec<Vid> = self.participants[port].tx_pending.iter().collect();
        for vid in pending {
            if self.hold(port, vid, AllocClass::Tx).is_err() {
                continue;
            }
            let action = self.applicant_event(port, vid, GarpEvent::TransmitPdu);
            let registered = self
                .pool
                .gid(vid, port)
                .map(|gid| gid.registrar.is_registered())
                .unwrap_or(false);
            if let Some(event) = action.wire_event(registered) {
                let sealed = encoder.push(Attribute::Ordinary { event, vid });
                self.send(port, sealed);
            }
            self.pool.done(vid, port);
        }

        let last = encoder.finish();
        self.send(port, last);
    }

    /// Applies LeaveAll to every GID of `port` that holds state.
    pub(super) fn apply_leave_all(&mut self, port: PortNo) {
        for vid in self.pool.resident_vids() {
            let idle = self.pool.gid(vid, port).map(|gid| gid.is_idle()).unwrap_or(true);
            if idle || self.hold(port, vid, AllocClass::Default).is_err() {
                continue;
            }
            self.registrar_event(port, vid, GarpEvent::LeaveAll);
            self.applicant_event(port, vid, GarpEvent::LeaveAll);
            self.pool.done(vid, port);
        }
    }

    /// Transmit failures are counted and the frame dropped.
    fn send(&mut self, port: PortNo, frame: Option<Vec<u8>>) {
        let Some(frame) = frame else {
            return;
        };
        match self.callbacks.transmit(port, &frame) {
            Ok(()) => {
                self.stats.pdus_tx += 1;
                trace!(port, len = frame.len(), "PDU sent");
            }
            Err(message) => {
                self.stats.tx_failures += 1;
                if self.warnings.allow(WarnClass::TxFailed) {
                    warn!(port, error = %message, "GVRP transmit failed, frame dropped");
                }
            }
        }
    }
}
