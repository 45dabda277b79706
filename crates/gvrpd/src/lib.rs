//! gvrpd - GVRP daemon
//!
//! Hosts a [`sonic_gvrp::GvrpEngine`] in a tokio actor: the actor owns the
//! engine, drives its timers from a periodic interval and serializes every
//! request coming through a [`GvrpHandle`].

pub mod actor;
pub mod config;
pub mod error;
pub mod platform;

pub use actor::{GvrpActor, GvrpCommand, GvrpDaemon, GvrpHandle};
pub use config::{DaemonConfig, RuntimeConfig, TICK_MS};
pub use error::{DaemonError, DaemonResult};
pub use platform::{DaemonCallbacks, OutboundFrame};
