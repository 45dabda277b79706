//! sonic-gvrp - GARP VLAN Registration Protocol engine
//!
//! Implements IEEE 802.1D GARP with the GVRP application:
//!
//! - Per (port, VLAN) Applicant and Registrar state machines and the
//!   per-port LeaveAll machine
//! - A bounded, reference counted pool of per-VLAN GID arrays with
//!   allocation classes and quotas
//! - GIP propagation of registrations between ports of the same
//!   spanning-tree instance
//! - PDU encoding and decoding
//! - Timer dispatch and port lifecycle driven by MSTP forwarding state
//!
//! The engine is a single-owner value: every operation takes `&mut self`
//! and runs to completion. Hosts that need concurrency wrap it in an actor
//! (see the `sonic-gvrpd` crate). Platform services are reached through
//! [`GvrpCallbacks`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use sonic_gvrp::{GvrpCallbacks, GvrpConfig, GvrpEngine, Msti, MstiMap, Vid};
//!
//! struct Loopback;
//!
//! impl GvrpCallbacks for Loopback {
//!     fn transmit(&self, _port: usize, _frame: &[u8]) -> Result<(), String> {
//!         Ok(())
//!     }
//!     fn msti_forwarding(&self, _port: usize, _msti: Msti) -> bool {
//!         true
//!     }
//!     fn vlan_msti(&self, _vid: Vid) -> Option<Msti> {
//!         Some(Msti::CIST)
//!     }
//!     fn msti_map(&self) -> MstiMap {
//!         MstiMap::new()
//!     }
//! }
//!
//! let mut engine = GvrpEngine::new(GvrpConfig::with_ports(2), Arc::new(Loopback)).unwrap();
//! engine.port_control_set(0, true).unwrap();
//! engine.join_request(0, Vid::new(10).unwrap()).unwrap();
//! engine.timer_tick(engine.config().timers.join_time);
//! assert_eq!(engine.stats().pdus_tx, 1);
//! ```

pub mod callbacks;
pub mod config;
pub mod engine;
pub mod error;
pub mod gip;
pub mod machine;
pub mod participant;
pub mod pdu;
pub mod pool;
pub mod timer;
pub mod types;

pub use callbacks::GvrpCallbacks;
pub use config::{GvrpConfig, TimerConfig};
pub use engine::{GidSnapshot, GvrpEngine, GvrpStats, RxSummary};
pub use error::{GvrpError, GvrpResult, PduError};
pub use machine::{ApplicantState, GarpEvent, LeaveAllState, RegistrarState};
pub use pdu::{decode_pdu, encode_pdus, Attribute, PduDecoder, PduEncoder};
pub use pool::{AllocClass, ClassUsage, PoolStats};
pub use types::{
    AttributeEvent, MembershipChange, MembershipKind, Msti, MstiMap, PortNo, RegistrarAdmin,
    TimerKind, Vid, VidSet,
};
