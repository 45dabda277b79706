//! Port lifecycle: administrative enable, MSTP forwarding changes and
//! VLAN to instance remapping.

use tracing::{debug, info, instrument};

use super::GvrpEngine;
use crate::error::GvrpResult;
use crate::machine::{ApplicantState, GarpEvent, LeaveAllState, RegistrarState};
use crate::pool::AllocClass;
use crate::types::{MembershipChange, MembershipKind, Msti, PortNo, RegistrarAdmin, Vid};

impl GvrpEngine {
    /// Administratively enables or disables GVRP on a port.
    #[instrument(skip(self))]
    pub fn port_control_set(&mut self, port: PortNo, enabled: bool) -> GvrpResult<()> {
        self.check_port(port)?;
        if self.participants[port].enabled == enabled {
            return Ok(());
        }

        if enabled && self.callbacks.msti_map() != self.msti_map {
            self.vlan_to_msti_mapping_changed();
        }

        info!(port, enabled, "GVRP port control");
        self.participants[port].enabled = enabled;
        for msti in Msti::all() {
            self.update_port_state(port, msti);
        }
        Ok(())
    }

    pub fn port_control_get(&self, port: PortNo) -> GvrpResult<bool> {
        self.check_port(port)?;
        Ok(self.participants[port].enabled)
    }

    /// MSTP reports a forwarding change of `port` on `msti`.
    #[instrument(skip(self))]
    pub fn mstp_port_state_changed(
        &mut self,
        port: PortNo,
        msti: Msti,
        forwarding: bool,
    ) -> GvrpResult<()> {
        self.check_port(port)?;
        let current = &mut self.participants[port].forwarding[msti.index()];
        if *current == forwarding {
            return Ok(());
        }
        *current = forwarding;
        self.update_port_state(port, msti);
        Ok(())
    }

    /// Re-reads the VLAN to instance map and moves the state of every
    /// remapped VLAN into its new GIP context. Registrar states are kept.
    #[instrument(skip(self))]
    pub fn vlan_to_msti_mapping_changed(&mut self) {
        let new_map = self.callbacks.msti_map();
        let changed = self.msti_map.changed(&new_map);
        if changed.is_empty() {
            return;
        }
        let old_map = std::mem::replace(&mut self.msti_map, new_map);

        for vid in changed {
            let old = old_map.get(vid);
            let new = self.msti_map.get(vid);
            debug!(vid = %vid, from = %old, to = %new, "VLAN remapped");
            self.pool.set_msti(vid, new);
            if !self.pool.is_resident(vid) {
                continue;
            }

            let mut ports = self.gip.members(old);
            ports.extend(self.gip.members(new));
            ports.sort_unstable();
            ports.dedup();

            for port in ports {
                self.rehome(port, vid, old, new);
            }
        }
    }

    fn rehome(&mut self, port: PortNo, vid: Vid, old: Msti, new: Msti) {
        let now_in = self.gip.contains(port, new);
        if now_in == self.gip.contains(port, old) || !self.pool.is_resident(vid) {
            return;
        }
        if self.hold(port, vid, AllocClass::Default).is_err() {
            return;
        }
        if now_in {
            self.update_enable(port, vid, new);
        } else {
            self.update_disable(port, vid, old);
        }
        self.pool.done(vid, port);
    }

    /// Brings the GIP membership of `port` on `msti` in line with its
    /// administrative and forwarding state.
    pub(super) fn update_port_state(&mut self, port: PortNo, msti: Msti) {
        let participates = self.participants[port].participates(msti);
        if participates == self.gip.contains(port, msti) {
            return;
        }
        if participates {
            self.enter_context(port, msti);
        } else {
            self.leave_context(port, msti);
        }
    }

    fn enter_context(&mut self, port: PortNo, msti: Msti) {
        debug!(port, msti = %msti, "entering GIP context");
        self.gip.insert(port, msti);

        for vid in self.vids_in(msti) {
            if self.hold(port, vid, AllocClass::Tx).is_err() {
                continue;
            }
            self.update_enable(port, vid, msti);
            self.pool.done(vid, port);
        }

        let participant = &mut self.participants[port];
        participant.gip_count += 1;
        if participant.gip_count == 1 {
            info!(port, "GVRP participant active");
            let now = self.timers.now();
            participant.leave_all = LeaveAllState::Passive;
            let has_pending = !participant.tx_pending.is_empty();
            self.timers.leave_all.restart(now, port);
            if has_pending {
                self.timers.transmit.start(now, port);
            }
        }

        self.restore_admin(port, msti);
    }

    fn leave_context(&mut self, port: PortNo, msti: Msti) {
        debug!(port, msti = %msti, "leaving GIP context");

        for vid in self.vids_in(msti) {
            if self.hold(port, vid, AllocClass::Tx).is_err() {
                continue;
            }
            self.update_disable(port, vid, msti);
            self.pool.done(vid, port);
        }

        self.gip.remove(port, msti);
        let participant = &mut self.participants[port];
        participant.gip_count = participant.gip_count.saturating_sub(1);
        if participant.gip_count == 0 {
            info!(port, "GVRP participant inactive");
            self.remove_all_gids(port);
        }
    }

    /// Re-applies remembered fixed and forbidden registrations of `port`
    /// for the VLANs of `msti`.
    fn restore_admin(&mut self, port: PortNo, msti: Msti) {
        let mut entries: Vec<(Vid, RegistrarAdmin)> = self
            .admin
            .iter()
            .filter(|((p, vid), _)| *p == port && self.msti_map.get(*vid) == msti)
            .map(|((_, vid), admin)| (*vid, *admin))
            .collect();
        entries.sort_unstable_by_key(|(vid, _)| *vid);

        for (vid, admin) in entries {
            // Failures are logged by hold(); the setting stays remembered.
            let _ = self.apply_admin(port, vid, admin);
        }
    }

    /// Returns every GID of an inactive port to (VO, MT) and drops its
    /// timers and pending transmissions.
    fn remove_all_gids(&mut self, port: PortNo) {
        for vid in self.pool.resident_vids() {
            let Some(gid) = self.pool.gid_mut(vid, port) else {
                continue;
            };
            if gid.is_idle() {
                continue;
            }
            let was_registered = gid.registrar.is_registered();
            gid.applicant = ApplicantState::INITIAL;
            gid.registrar = RegistrarState::INITIAL;

            self.timers.leave.cancel((port, vid));
            if was_registered {
                self.stats.leave_indications += 1;
                self.enqueue_membership(port, vid, MembershipKind::Delete);
            }
            self.pool.refresh(vid, port);
        }

        self.timers.leave.cancel_where(|(p, _)| *p == port);
        self.timers.leave_all.cancel(port);
        self.timers.transmit.cancel(port);
        let participant = &mut self.participants[port];
        participant.tx_pending.clear();
        participant.leave_all = LeaveAllState::Passive;
    }

    /// Resident VLANs currently mapped to `msti`.
    fn vids_in(&self, msti: Msti) -> Vec<Vid> {
        self.pool
            .resident_vids()
            .into_iter()
            .filter(|vid| self.msti_map.get(*vid) == msti)
            .collect()
    }

    /// Withdraws every declaration, transmits the resulting leaves, disables
    /// all ports and returns the outstanding membership changes.
    #[instrument(skip(self))]
    pub fn shutdown(&mut self) -> Vec<MembershipChange> {
        info!("GVRP engine shutting down");

        for port in 0..self.participants.len() {
            if !self.participants[port].is_active() {
                continue;
            }
            for vid in self.pool.resident_vids() {
                let declaring = self
                    .pool
                    .gid(vid, port)
                    .map(|gid| gid.applicant.is_declaring())
                    .unwrap_or(false);
                if declaring && self.hold(port, vid, AllocClass::Tx).is_ok() {
                    self.applicant_event(port, vid, GarpEvent::ReqLeave);
                    self.pool.done(vid, port);
                }
            }
            self.timers.transmit.cancel(port);
            self.transmit_pdu(port);
        }

        for port in 0..self.participants.len() {
            // Port indices are in range.
            let _ = self.port_control_set(port, false);
        }

        self.take_membership_changes()
    }
}
