//! State machine event application and GIP propagation.

use tracing::{debug, error, trace};

use super::GvrpEngine;
use crate::machine::{ApplicantAction, GarpEvent, Indication, LeaveTimerOp, RegistrarStep};
use crate::types::{MembershipKind, Msti, PortNo, Vid};

impl GvrpEngine {
    /// Runs the applicant of GID (`port`, `vid`) and keeps the transmit
    /// bookkeeping in step. The array must be resident.
    pub(super) fn applicant_event(
        &mut self,
        port: PortNo,
        vid: Vid,
        event: GarpEvent,
    ) -> ApplicantAction {
        let Some(gid) = self.pool.gid_mut(vid, port) else {
            error!(port, vid = %vid, ?event, "applicant event for non-resident GID");
            return ApplicantAction::None;
        };

        let (next, action) = gid.applicant.step(event);
        if next != gid.applicant {
            trace!(port, vid = %vid, ?event, from = %gid.applicant, to = %next, "applicant");
        }
        gid.applicant = next;

        let now = self.timers.now();
        let participant = &mut self.participants[port];
        if next.needs_transmit() {
            participant.tx_pending.insert(vid);
            if participant.is_active() {
                self.timers.transmit.start(now, port);
            }
        } else {
            participant.tx_pending.remove(vid);
        }

        self.pool.refresh(vid, port);
        action
    }

    /// Runs the registrar of GID (`port`, `vid`). The array must be resident.
    pub(super) fn registrar_event(&mut self, port: PortNo, vid: Vid, event: GarpEvent) {
        let Some(gid) = self.pool.gid_mut(vid, port) else {
            error!(port, vid = %vid, ?event, "registrar event for non-resident GID");
            return;
        };

        let step = gid.registrar.step(event);
        if step.next != gid.registrar {
            trace!(port, vid = %vid, ?event, from = %gid.registrar, to = %step.next, "registrar");
        }
        gid.registrar = step.next;
        self.apply_registrar_step(port, vid, step);
    }

    /// Applies the timer operation and indication of a registrar transition
    /// whose new state is already stored.
    pub(super) fn apply_registrar_step(&mut self, port: PortNo, vid: Vid, step: RegistrarStep) {
        let now = self.timers.now();
        match step.timer {
            LeaveTimerOp::Start => {
                self.timers.leave.start(now, (port, vid));
            }
            LeaveTimerOp::Stop => {
                self.timers.leave.cancel((port, vid));
            }
            LeaveTimerOp::Keep => {}
        }

        match step.indication {
            Indication::Join => {
                debug!(port, vid = %vid, "join indication");
                self.stats.join_indications += 1;
                self.enqueue_membership(port, vid, MembershipKind::Add);
                self.propagate_join(port, vid);
            }
            Indication::Leave => {
                debug!(port, vid = %vid, "leave indication");
                self.stats.leave_indications += 1;
                self.enqueue_membership(port, vid, MembershipKind::Delete);
                self.propagate_leave(port, vid);
            }
            Indication::None => {}
        }

        self.pool.refresh(vid, port);
    }

    /// A new registration on `port` is declared on every peer port.
    fn propagate_join(&mut self, port: PortNo, vid: Vid) {
        let msti = self.msti_map.get(vid);
        for peer in self.gip.peers(port, msti) {
            self.applicant_event(peer, vid, GarpEvent::ReqJoin);
        }
    }

    /// A registration lost on `port` is withdrawn from peers that no longer
    /// need it.
    fn propagate_leave(&mut self, port: PortNo, vid: Vid) {
        let msti = self.msti_map.get(vid);
        if !self.gip.contains(port, msti) {
            return;
        }
        let (count, holder) = self.calc_registrations(port, vid);
        self.withdraw(port, vid, msti, count, holder);
    }

    /// Counts registrations for `vid` on the GIP peers of `port`, stopping
    /// at two, and returns the first port holding one.
    ///
    /// Returns 2 when the VLAN's instance cannot be looked up, so that
    /// nothing is withdrawn.
    pub fn calc_registrations(&self, port: PortNo, vid: Vid) -> (usize, Option<PortNo>) {
        match self.callbacks.vlan_msti(vid) {
            Some(msti) => self.count_registrations(port, vid, msti),
            None => {
                debug!(port, vid = %vid, "MSTI lookup failed");
                (2, None)
            }
        }
    }

    pub(super) fn count_registrations(
        &self,
        port: PortNo,
        vid: Vid,
        msti: Msti,
    ) -> (usize, Option<PortNo>) {
        let mut count = 0;
        let mut holder = None;
        for peer in self.gip.peers(port, msti) {
            let registered = self
                .pool
                .gid(vid, peer)
                .map(|gid| gid.registrar.is_registered())
                .unwrap_or(false);
            if registered {
                count += 1;
                holder.get_or_insert(peer);
                if count == 2 {
                    break;
                }
            }
        }
        (count, holder)
    }

    /// No registration left among the peers: every peer leaves. Exactly one
    /// left: only that peer leaves, the others keep declaring towards it.
    fn withdraw(
        &mut self,
        port: PortNo,
        vid: Vid,
        msti: Msti,
        count: usize,
        holder: Option<PortNo>,
    ) {
        if count > 1 {
            return;
        }
        for peer in self.gip.peers(port, msti) {
            if count == 0 || holder == Some(peer) {
                self.applicant_event(peer, vid, GarpEvent::ReqLeave);
            }
        }
    }

    /// `port` joined the GIP context of `msti`: exchange declarations for
    /// `vid` with the peers. The caller holds the GID.
    pub(super) fn update_enable(&mut self, port: PortNo, vid: Vid, msti: Msti) {
        let peers = self.gip.peers(port, msti);

        if self.is_registered(port, vid) {
            for peer in &peers {
                self.applicant_event(*peer, vid, GarpEvent::ReqJoin);
            }
        }

        if peers.iter().any(|peer| self.is_registered(*peer, vid)) {
            self.applicant_event(port, vid, GarpEvent::ReqJoin);
        }
    }

    /// `port` is about to leave the GIP context of `msti`: stop declaring
    /// `vid` on it and withdraw its registration from the peers. The caller
    /// holds the GID.
    pub(super) fn update_disable(&mut self, port: PortNo, vid: Vid, msti: Msti) {
        self.applicant_event(port, vid, GarpEvent::ReqLeave);

        if !self.is_registered(port, vid) {
            return;
        }

        let (count, holder) = self.count_registrations(port, vid, msti);
        self.withdraw(port, vid, msti, count, holder);
    }

    fn is_registered(&self, port: PortNo, vid: Vid) -> bool {
        self.pool
            .gid(vid, port)
            .map(|gid| gid.registrar.is_registered())
            .unwrap_or(false)
    }
}
