//! The GVRP actor.
//!
//! One task owns the [`GvrpEngine`]. It advances the protocol clock from a
//! tokio interval and serves [`GvrpCommand`]s sent through a
//! [`GvrpHandle`]. Transmitted frames and VLAN membership changes leave the
//! actor on unbounded channels.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use sonic_gvrp::{
    GidSnapshot, GvrpEngine, GvrpResult, GvrpStats, MembershipChange, Msti, MstiMap, PortNo,
    RegistrarAdmin, Vid,
};

use crate::config::{DaemonConfig, TICK_MS};
use crate::error::{DaemonError, DaemonResult};
use crate::platform::{DaemonCallbacks, OutboundFrame};

/// Requests served by the actor.
#[derive(Debug)]
pub enum GvrpCommand {
    /// A GVRP frame received on `port`.
    RxFrame { port: PortNo, frame: Vec<u8> },
    JoinRequest {
        port: PortNo,
        vid: Vid,
        reply: oneshot::Sender<GvrpResult<()>>,
    },
    LeaveRequest {
        port: PortNo,
        vid: Vid,
        reply: oneshot::Sender<GvrpResult<()>>,
    },
    RegistrarAdmin {
        port: PortNo,
        vid: Vid,
        admin: RegistrarAdmin,
        reply: oneshot::Sender<GvrpResult<()>>,
    },
    PortControl {
        port: PortNo,
        enabled: bool,
        reply: oneshot::Sender<GvrpResult<()>>,
    },
    /// MSTP forwarding change.
    MstpPortState {
        port: PortNo,
        msti: Msti,
        forwarding: bool,
        reply: oneshot::Sender<GvrpResult<()>>,
    },
    /// New VLAN to instance map.
    MstiMap {
        map: MstiMap,
        reply: oneshot::Sender<()>,
    },
    GidState {
        port: PortNo,
        vid: Vid,
        reply: oneshot::Sender<GvrpResult<GidSnapshot>>,
    },
    Stats {
        reply: oneshot::Sender<GvrpStats>,
    },
    /// Withdraw all declarations and stop the actor.
    Shutdown {
        reply: oneshot::Sender<Vec<MembershipChange>>,
    },
}

/// Cloneable client side of the actor.
#[derive(Debug, Clone)]
pub struct GvrpHandle {
    commands: mpsc::Sender<GvrpCommand>,
}

impl GvrpHandle {
    async fn send(&self, command: GvrpCommand) -> DaemonResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| DaemonError::ActorStopped)
    }

    async fn call<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> GvrpCommand,
    ) -> DaemonResult<T> {
        let (reply, response) = oneshot::channel();
        self.send(command(reply)).await?;
        response.await.map_err(|_| DaemonError::ActorStopped)
    }

    /// Queues a received frame. Processing is asynchronous.
    pub async fn receive_frame(&self, port: PortNo, frame: Vec<u8>) -> DaemonResult<()> {
        self.send(GvrpCommand::RxFrame { port, frame }).await
    }

    pub async fn join_request(&self, port: PortNo, vid: Vid) -> DaemonResult<()> {
        Ok(self
            .call(|reply| GvrpCommand::JoinRequest { port, vid, reply })
            .await??)
    }

    pub async fn leave_request(&self, port: PortNo, vid: Vid) -> DaemonResult<()> {
        Ok(self
            .call(|reply| GvrpCommand::LeaveRequest { port, vid, reply })
            .await??)
    }

    pub async fn registrar_admin(
        &self,
        port: PortNo,
        vid: Vid,
        admin: RegistrarAdmin,
    ) -> DaemonResult<()> {
        Ok(self
            .call(|reply| GvrpCommand::RegistrarAdmin {
                port,
                vid,
                admin,
                reply,
            })
            .await??)
    }

    pub async fn port_control(&self, port: PortNo, enabled: bool) -> DaemonResult<()> {
        Ok(self
            .call(|reply| GvrpCommand::PortControl {
                port,
                enabled,
                reply,
            })
            .await??)
    }

    pub async fn mstp_port_state(
        &self,
        port: PortNo,
        msti: Msti,
        forwarding: bool,
    ) -> DaemonResult<()> {
        Ok(self
            .call(|reply| GvrpCommand::MstpPortState {
                port,
                msti,
                forwarding,
                reply,
            })
            .await??)
    }

    pub async fn set_msti_map(&self, map: MstiMap) -> DaemonResult<()> {
        self.call(|reply| GvrpCommand::MstiMap { map, reply }).await
    }

    pub async fn gid_state(&self, port: PortNo, vid: Vid) -> DaemonResult<GidSnapshot> {
        Ok(self
            .call(|reply| GvrpCommand::GidState { port, vid, reply })
            .await??)
    }

    pub async fn stats(&self) -> DaemonResult<GvrpStats> {
        self.call(|reply| GvrpCommand::Stats { reply }).await
    }

    /// Stops the actor and returns the membership changes it produced
    /// while withdrawing.
    pub async fn shutdown(&self) -> DaemonResult<Vec<MembershipChange>> {
        self.call(|reply| GvrpCommand::Shutdown { reply }).await
    }
}

/// Owner of the engine.
pub struct GvrpActor {
    engine: GvrpEngine,
    platform: Arc<DaemonCallbacks>,
    commands: mpsc::Receiver<GvrpCommand>,
    membership: mpsc::UnboundedSender<MembershipChange>,
    tick_interval: Duration,
}

/// A running actor and its output channels.
pub struct GvrpDaemon {
    pub handle: GvrpHandle,
    pub frames: mpsc::UnboundedReceiver<OutboundFrame>,
    pub membership: mpsc::UnboundedReceiver<MembershipChange>,
    pub task: JoinHandle<()>,
}

impl GvrpDaemon {
    /// Builds the engine and spawns the actor on the current runtime.
    pub fn spawn(config: DaemonConfig) -> DaemonResult<Self> {
        config.validate()?;

        let (frames_tx, frames) = mpsc::unbounded_channel();
        let (membership_tx, membership) = mpsc::unbounded_channel();
        let (commands_tx, commands) = mpsc::channel(config.runtime.command_queue_depth);

        let platform = Arc::new(DaemonCallbacks::new(frames_tx));
        let engine = GvrpEngine::new(config.gvrp.clone(), platform.clone())?;

        let actor = GvrpActor {
            engine,
            platform,
            commands,
            membership: membership_tx,
            tick_interval: config.runtime.tick_interval(),
        };
        let task = tokio::spawn(actor.run());

        Ok(Self {
            handle: GvrpHandle {
                commands: commands_tx,
            },
            frames,
            membership,
            task,
        })
    }
}

impl GvrpActor {
    /// Runs until a shutdown command arrives or every handle is dropped.
    #[instrument(skip(self), name = "gvrp_actor")]
    pub async fn run(mut self) {
        let mut interval = time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last = Instant::now();
        let mut carry_ms = 0u64;

        info!(ports = self.engine.ports(), "GVRP actor started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now = Instant::now();
                    let elapsed = u64::try_from(now.duration_since(last).as_millis())
                        .unwrap_or(u64::MAX)
                        .saturating_add(carry_ms);
                    last = now;
                    carry_ms = elapsed % TICK_MS;
                    let ticks = u32::try_from(elapsed / TICK_MS).unwrap_or(u32::MAX);
                    if ticks > 0 {
                        self.engine.timer_tick(ticks);
                    }
                }
                command = self.commands.recv() => match command {
                    Some(GvrpCommand::Shutdown { reply }) => {
                        let changes = self.stop();
                        let _ = reply.send(changes);
                        break;
                    }
                    Some(command) => self.handle(command),
                    None => {
                        info!("all GVRP handles dropped");
                        self.stop();
                        break;
                    }
                },
            }
            self.publish_membership();
        }

        info!("GVRP actor stopped");
    }

    fn handle(&mut self, command: GvrpCommand) {
        match command {
            GvrpCommand::RxFrame { port, frame } => {
                if let Err(e) = self.engine.receive_pdu(port, &frame) {
                    warn!(port, error = %e, "dropping received frame");
                }
            }
            GvrpCommand::JoinRequest { port, vid, reply } => {
                let _ = reply.send(self.engine.join_request(port, vid));
            }
            GvrpCommand::LeaveRequest { port, vid, reply } => {
                let _ = reply.send(self.engine.leave_request(port, vid));
            }
            GvrpCommand::RegistrarAdmin {
                port,
                vid,
                admin,
                reply,
            } => {
                let _ = reply.send(self.engine.registrar_administrative_control(port, vid, admin));
            }
            GvrpCommand::PortControl {
                port,
                enabled,
                reply,
            } => {
                let _ = reply.send(self.engine.port_control_set(port, enabled));
            }
            GvrpCommand::MstpPortState {
                port,
                msti,
                forwarding,
                reply,
            } => {
                self.platform.set_forwarding(port, msti, forwarding);
                let _ = reply.send(self.engine.mstp_port_state_changed(port, msti, forwarding));
            }
            GvrpCommand::MstiMap { map, reply } => {
                self.platform.set_msti_map(map);
                self.engine.vlan_to_msti_mapping_changed();
                let _ = reply.send(());
            }
            GvrpCommand::GidState { port, vid, reply } => {
                let _ = reply.send(self.engine.gid_state(port, vid));
            }
            GvrpCommand::Stats { reply } => {
                let _ = reply.send(self.engine.stats().clone());
            }
            GvrpCommand::Shutdown { reply } => {
                // Handled by the run loop.
                let _ = reply.send(Vec::new());
            }
        }
    }

    fn stop(&mut self) -> Vec<MembershipChange> {
        let changes = self.engine.shutdown();
        for change in &changes {
            let _ = self.membership.send(*change);
        }
        changes
    }

    fn publish_membership(&mut self) {
        if !self.platform.take_membership_signal() {
            return;
        }
        for change in self.engine.take_membership_changes() {
            debug!(port = change.port, vid = %change.vid, kind = ?change.kind, "membership change");
            if self.membership.send(change).is_err() {
                warn!("membership receiver dropped");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sonic_gvrp::{
        decode_pdu, encode_pdus, Attribute, AttributeEvent, GvrpConfig, MembershipKind,
        RegistrarState,
    };

    fn vid(id: u16) -> Vid {
        Vid::new(id).unwrap()
    }

    fn spawn(ports: usize) -> GvrpDaemon {
        let config = DaemonConfig {
            gvrp: GvrpConfig::with_ports(ports),
            ..DaemonConfig::default()
        };
        GvrpDaemon::spawn(config).unwrap()
    }

    fn attributes(frame: &OutboundFrame) -> Vec<Attribute> {
        decode_pdu(&frame.frame)
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_request_is_transmitted_after_join_time() {
        let mut daemon = spawn(2);
        daemon.handle.port_control(0, true).await.unwrap();
        daemon.handle.join_request(0, vid(10)).await.unwrap();

        time::sleep(Duration::from_millis(150)).await;
        assert!(daemon.frames.try_recv().is_err());

        time::sleep(Duration::from_millis(100)).await;
        let frame = daemon.frames.try_recv().unwrap();
        assert_eq!(frame.port, 0);
        assert_eq!(
            attributes(&frame),
            vec![Attribute::Ordinary {
                event: AttributeEvent::JoinEmpty,
                vid: vid(10)
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_received_join_publishes_membership() {
        let mut daemon = spawn(2);
        daemon.handle.port_control(0, true).await.unwrap();
        daemon.handle.port_control(1, true).await.unwrap();

        let frames = encode_pdus(
            [0x02, 0, 0, 0, 0, 1],
            &[Attribute::Ordinary {
                event: AttributeEvent::JoinIn,
                vid: vid(20),
            }],
        );
        daemon.handle.receive_frame(1, frames[0].clone()).await.unwrap();

        let change = daemon.membership.recv().await.unwrap();
        assert_eq!(change.port, 1);
        assert_eq!(change.vid, vid(20));
        assert_eq!(change.kind, MembershipKind::Add);

        let snapshot = daemon.handle.gid_state(1, vid(20)).await.unwrap();
        assert_eq!(snapshot.registrar, RegistrarState::In);
        assert_eq!(daemon.handle.stats().await.unwrap().pdus_rx, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_port_leaves_gip_context() {
        let daemon = spawn(2);
        daemon.handle.port_control(0, true).await.unwrap();
        daemon.handle.join_request(0, vid(30)).await.unwrap();

        for msti in Msti::all() {
            daemon.handle.mstp_port_state(0, msti, false).await.unwrap();
        }
        assert!(matches!(
            daemon.handle.gid_state(0, vid(30)).await,
            Ok(snapshot) if snapshot.gip_context.is_none()
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_actor() {
        let mut daemon = spawn(2);
        daemon.handle.port_control(0, true).await.unwrap();
        daemon.handle.join_request(0, vid(10)).await.unwrap();
        time::sleep(Duration::from_millis(250)).await;
        while daemon.frames.try_recv().is_ok() {}

        let changes = daemon.handle.shutdown().await.unwrap();
        assert!(changes.is_empty());

        let frame = daemon.frames.recv().await.unwrap();
        assert_eq!(
            attributes(&frame),
            vec![Attribute::Ordinary {
                event: AttributeEvent::LeaveEmpty,
                vid: vid(10)
            }]
        );

        daemon.task.await.unwrap();
        assert!(matches!(
            daemon.handle.join_request(0, vid(10)).await,
            Err(DaemonError::ActorStopped)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_errors_reach_caller() {
        let daemon = spawn(2);
        let err = daemon.handle.join_request(1, vid(10)).await.unwrap_err();
        assert!(matches!(err, DaemonError::Engine(_)));
    }
}
