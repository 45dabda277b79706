//! The GVRP engine: owns every participant, the GID pool, the GIP contexts
//! and the timers, and is driven through `&mut self` by a single owner.

mod lifecycle;
mod propagate;
mod receive;
mod transmit;

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::callbacks::GvrpCallbacks;
use crate::config::{GvrpConfig, TimerConfig};
use crate::error::{GvrpError, GvrpResult, PduError, WarnClass, WarningLimiter};
use crate::gip::GipContexts;
use crate::machine::{ApplicantState, GarpEvent, RegistrarState};
use crate::participant::Participant;
use crate::pool::{AllocClass, GidPool, PoolStats};
use crate::timer::GarpTimers;
use crate::types::{
    MembershipChange, MembershipKind, Msti, MstiMap, PortNo, RegistrarAdmin, TimerKind, Vid,
};

/// Protocol counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GvrpStats {
    pub pdus_tx: u64,
    pub pdus_rx: u64,
    pub tx_failures: u64,
    pub rx_ignored: u64,
    pub rx_malformed: u64,
    pub attributes_rx: u64,
    pub attributes_dropped: u64,
    pub leave_all_tx: u64,
    pub leave_all_rx: u64,
    pub join_indications: u64,
    pub leave_indications: u64,
}

/// Outcome of processing one received frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RxSummary {
    /// Attributes (including LeaveAll) applied to the state machines.
    pub applied: usize,
    /// Valid attributes dropped for lack of resources.
    pub dropped: usize,
    /// Decode error that ended processing of the frame.
    pub error: Option<PduError>,
}

/// Read-only view of one GID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GidSnapshot {
    pub applicant: ApplicantState,
    pub registrar: RegistrarState,
    /// Ticks until the registrar leave timer fires.
    pub leave_timeout: Option<u32>,
    /// Instance whose GIP context the port is in for this VLAN.
    pub gip_context: Option<Msti>,
}

/// GARP/GVRP protocol engine.
pub struct GvrpEngine {
    config: GvrpConfig,
    callbacks: Arc<dyn GvrpCallbacks>,
    participants: Vec<Participant>,
    pool: GidPool,
    gip: GipContexts,
    timers: GarpTimers,
    msti_map: MstiMap,
    admin: HashMap<(PortNo, Vid), RegistrarAdmin>,
    membership: BTreeMap<(PortNo, Vid), MembershipKind>,
    warnings: WarningLimiter,
    stats: GvrpStats,
}

impl GvrpEngine {
    /// Builds the engine and reads the initial MSTP state of every port.
    /// All ports start administratively disabled.
    pub fn new(config: GvrpConfig, callbacks: Arc<dyn GvrpCallbacks>) -> GvrpResult<Self> {
        config.validate()?;

        let msti_map = callbacks.msti_map();
        let participants = (0..config.ports)
            .map(|port| {
                let mut participant = Participant::new(port);
                for msti in Msti::all() {
                    participant.forwarding[msti.index()] = callbacks.msti_forwarding(port, msti);
                }
                participant
            })
            .collect();

        info!(
            ports = config.ports,
            max_vlans = config.max_vlans,
            "GVRP engine created"
        );

        Ok(Self {
            pool: GidPool::new(config.ports, config.max_vlans),
            gip: GipContexts::new(config.ports),
            timers: GarpTimers::new(&config.timers),
            callbacks,
            participants,
            msti_map,
            admin: HashMap::new(),
            membership: BTreeMap::new(),
            warnings: WarningLimiter::new(),
            stats: GvrpStats::default(),
            config,
        })
    }

    pub fn config(&self) -> &GvrpConfig {
        &self.config
    }

    pub fn callbacks(&self) -> &Arc<dyn GvrpCallbacks> {
        &self.callbacks
    }

    pub fn ports(&self) -> usize {
        self.participants.len()
    }

    /// Local request to declare `vid` on `port`.
    #[instrument(skip(self))]
    pub fn join_request(&mut self, port: PortNo, vid: Vid) -> GvrpResult<()> {
        self.request(port, vid, GarpEvent::ReqJoin)
    }

    /// Local request to withdraw the declaration of `vid` on `port`.
    #[instrument(skip(self))]
    pub fn leave_request(&mut self, port: PortNo, vid: Vid) -> GvrpResult<()> {
        self.request(port, vid, GarpEvent::ReqLeave)
    }

    fn request(&mut self, port: PortNo, vid: Vid, event: GarpEvent) -> GvrpResult<()> {
        self.check_port(port)?;
        if !self.participants[port].enabled {
            return Err(GvrpError::PortNotEnabled(port));
        }
        self.hold(port, vid, AllocClass::Default)?;
        self.applicant_event(port, vid, event);
        self.pool.done(vid, port);
        Ok(())
    }

    /// Sets the administrative registrar control of `vid` on `port`.
    ///
    /// The setting is remembered. It takes effect immediately when the port
    /// is in the GIP context of the VLAN's instance, otherwise when the port
    /// next becomes active.
    #[instrument(skip(self))]
    pub fn registrar_administrative_control(
        &mut self,
        port: PortNo,
        vid: Vid,
        admin: RegistrarAdmin,
    ) -> GvrpResult<()> {
        self.check_port(port)?;
        match admin {
            RegistrarAdmin::Normal => self.admin.remove(&(port, vid)),
            other => self.admin.insert((port, vid), other),
        };
        self.apply_admin(port, vid, admin)
    }

    /// Remembered administrative control of `vid` on `port`.
    pub fn registrar_administrative_state(&self, port: PortNo, vid: Vid) -> RegistrarAdmin {
        self.admin.get(&(port, vid)).copied().unwrap_or_default()
    }

    pub(crate) fn apply_admin(
        &mut self,
        port: PortNo,
        vid: Vid,
        admin: RegistrarAdmin,
    ) -> GvrpResult<()> {
        let msti = self.msti_map.get(vid);
        if !self.gip.contains(port, msti) {
            debug!(port, vid = %vid, msti = %msti, "port not in GIP context, admin control deferred");
            return Ok(());
        }

        self.hold(port, vid, AllocClass::Default)?;
        if let Some(gid) = self.pool.gid_mut(vid, port) {
            let step = gid.registrar.administrative(admin);
            gid.registrar = step.next;
            self.apply_registrar_step(port, vid, step);
        }
        self.pool.done(vid, port);
        Ok(())
    }

    /// Advances the tick clock by `elapsed` and fires due timers.
    ///
    /// Returns the ticks until the next pending deadline, if any.
    pub fn timer_tick(&mut self, elapsed: u32) -> Option<u32> {
        let now = self.timers.advance(elapsed);

        for port in self.timers.transmit.expire(now) {
            self.transmit_pdu(port);
        }
        for (port, vid) in self.timers.leave.expire(now) {
            self.leave_timer_expired(port, vid);
        }
        for port in self.timers.leave_all.expire(now) {
            self.leave_all_timer_expired(port);
        }

        self.timers.next_delay()
    }

    fn leave_timer_expired(&mut self, port: PortNo, vid: Vid) {
        if !self.pool.is_resident(vid) {
            warn!(port, vid = %vid, "leave timer fired for non-resident VLAN");
            return;
        }
        if self.hold(port, vid, AllocClass::Default).is_err() {
            return;
        }
        self.registrar_event(port, vid, GarpEvent::LeaveTimer);
        self.pool.done(vid, port);
    }

    fn leave_all_timer_expired(&mut self, port: PortNo) {
        let now = self.timers.now();
        let participant = &mut self.participants[port];
        participant.leave_all = participant.leave_all.timer_expired();
        self.timers.leave_all.restart(now, port);
        self.timers.transmit.start(now, port);
    }

    pub fn timer(&self, kind: TimerKind) -> u32 {
        self.config.timers.get(kind)
    }

    /// Changes a timer period. Running timers keep their deadline.
    pub fn set_timer(&mut self, kind: TimerKind, value: u32) -> GvrpResult<()> {
        self.config.timers.set(kind, value)?;
        self.timers.set_period(kind, value);
        info!(timer = %kind, value, "GVRP timer changed");
        Ok(())
    }

    pub fn timers(&self) -> TimerConfig {
        self.config.timers
    }

    /// Drains pending VLAN membership changes, ordered by port and VLAN.
    pub fn take_membership_changes(&mut self) -> Vec<MembershipChange> {
        std::mem::take(&mut self.membership)
            .into_iter()
            .map(|((port, vid), kind)| MembershipChange { port, vid, kind })
            .collect()
    }

    /// State of one GID. Reading a VLAN without resident state briefly uses
    /// the introspection allocation class.
    pub fn gid_state(&mut self, port: PortNo, vid: Vid) -> GvrpResult<GidSnapshot> {
        self.check_port(port)?;
        self.hold(port, vid, AllocClass::Introspect)?;
        let snapshot = self.pool.gid(vid, port).map(|gid| GidSnapshot {
            applicant: gid.applicant,
            registrar: gid.registrar,
            leave_timeout: self.leave_timeout(port, vid),
            gip_context: self.gip_context(port, vid),
        });
        self.pool.done(vid, port);
        snapshot.ok_or_else(|| GvrpError::internal(format!("GID {}/{} vanished", port, vid)))
    }

    pub fn leave_timeout(&self, port: PortNo, vid: Vid) -> Option<u32> {
        self.timers
            .leave
            .deadline((port, vid))
            .map(|deadline| self.timers.remaining(deadline))
    }

    pub fn leave_all_timeout(&self, port: PortNo) -> Option<u32> {
        self.timers
            .leave_all
            .deadline(port)
            .map(|deadline| self.timers.remaining(deadline))
    }

    pub fn transmit_timeout(&self, port: PortNo) -> Option<u32> {
        self.timers
            .transmit
            .deadline(port)
            .map(|deadline| self.timers.remaining(deadline))
    }

    /// Instance of the GIP context `port` is in for `vid`, if any.
    pub fn gip_context(&self, port: PortNo, vid: Vid) -> Option<Msti> {
        let msti = self.msti_map.get(vid);
        self.gip.contains(port, msti).then_some(msti)
    }

    pub fn gip_members(&self, msti: Msti) -> Vec<PortNo> {
        self.gip.members(msti)
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn stats(&self) -> &GvrpStats {
        &self.stats
    }

    /// VLANs that currently hold protocol state.
    pub fn active_vids(&self) -> Vec<Vid> {
        self.pool.resident_vids()
    }

    fn check_port(&self, port: PortNo) -> GvrpResult<()> {
        if port >= self.participants.len() {
            return Err(GvrpError::invalid_port(port, self.participants.len()));
        }
        Ok(())
    }

    /// Takes a reference on GID (`port`, `vid`).
    fn hold(&mut self, port: PortNo, vid: Vid, class: AllocClass) -> GvrpResult<()> {
        let msti = self.msti_map.get(vid);
        match self.pool.acquire(vid, port, class, msti) {
            Ok(_) => Ok(()),
            Err(e) => {
                if matches!(e, GvrpError::ResourceDenied { .. })
                    && self.warnings.allow(WarnClass::PoolExhausted)
                {
                    warn!(port, vid = %vid, error = %e, "GID pool exhausted");
                }
                Err(e)
            }
        }
    }

    fn enqueue_membership(&mut self, port: PortNo, vid: Vid, kind: MembershipKind) {
        self.membership.insert((port, vid), kind);
        self.callbacks.vlan_membership_changed();
    }
}
