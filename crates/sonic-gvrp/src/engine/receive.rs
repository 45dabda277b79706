//! Received PDU processing.

use tracing::{debug, instrument, trace, warn};

use super::{GvrpEngine, RxSummary};
use crate::error::{GvrpResult, PduError, WarnClass};
use crate::machine::GarpEvent;
use crate::pdu::{decode_pdu, Attribute};
use crate::pool::AllocClass;
use crate::types::{AttributeEvent, PortNo, Vid};

impl GvrpEngine {
    /// Processes a GVRP frame received on `port`.
    ///
    /// `frame` starts at the destination MAC. Frames on ports that are not
    /// active participants are ignored. A decode error ends processing of
    /// the frame; attributes before it stay applied.
    #[instrument(skip(self, frame), fields(len = frame.len()), level = "debug")]
    pub fn receive_pdu(&mut self, port: PortNo, frame: &[u8]) -> GvrpResult<RxSummary> {
        self.check_port(port)?;
        let mut summary = RxSummary::default();

        let participant = &self.participants[port];
        if !participant.enabled || !participant.is_active() {
            trace!(port, "ignoring PDU on inactive port");
            self.stats.rx_ignored += 1;
            return Ok(summary);
        }
        self.stats.pdus_rx += 1;

        let decoder = match decode_pdu(frame) {
            Ok(decoder) => decoder,
            Err(e) => {
                self.malformed(port, e);
                summary.error = Some(e);
                return Ok(summary);
            }
        };

        for item in decoder {
            match item {
                Ok(Attribute::LeaveAll) => {
                    self.receive_leave_all(port);
                    summary.applied += 1;
                }
                Ok(Attribute::Ordinary { event, vid }) => {
                    if self.receive_attribute(port, vid, event) {
                        summary.applied += 1;
                    } else {
                        summary.dropped += 1;
                    }
                }
                Err(e) => {
                    self.malformed(port, e);
                    summary.error = Some(e);
                    break;
                }
            }
        }

        Ok(summary)
    }

    fn receive_attribute(&mut self, port: PortNo, vid: Vid, event: AttributeEvent) -> bool {
        self.stats.attributes_rx += 1;
        if let Err(e) = self.hold(port, vid, AllocClass::Default) {
            self.stats.attributes_dropped += 1;
            if self.warnings.allow(WarnClass::RxDropped) {
                warn!(port, vid = %vid, error = %e, "dropping received attribute");
            }
            return false;
        }

        let event = GarpEvent::from(event);
        self.registrar_event(port, vid, event);
        self.applicant_event(port, vid, event);
        self.pool.done(vid, port);
        true
    }

    fn receive_leave_all(&mut self, port: PortNo) {
        debug!(port, "LeaveAll received");
        self.stats.leave_all_rx += 1;

        let now = self.timers.now();
        let participant = &mut self.participants[port];
        participant.leave_all = participant.leave_all.received();
        self.timers.leave_all.restart(now, port);

        self.apply_leave_all(port);
    }

    fn malformed(&mut self, port: PortNo, error: PduError) {
        self.stats.rx_malformed += 1;
        if self.warnings.allow(WarnClass::RxMalformed) {
            warn!(port, error = %error, "malformed GVRP PDU");
        }
    }
}
