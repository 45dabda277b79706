//! Error types for the GVRP engine.
//!
//! Only the administrative API surfaces errors to callers. Protocol-side
//! failures (resource exhaustion on receive, malformed PDUs, transmit
//! failures) are logged and counted by the engine instead.

use std::collections::HashMap;
use std::io;
use thiserror::Error;

use crate::pool::AllocClass;
use crate::types::{TimerKind, Vid};

/// Result type alias for GVRP operations.
pub type GvrpResult<T> = Result<T, GvrpError>;

/// Errors returned by the GVRP administrative API.
#[derive(Debug, Error)]
pub enum GvrpError {
    /// VLAN ID outside 1..=4094.
    #[error("Invalid VLAN ID {0} (valid range 1-4094)")]
    InvalidVid(u16),

    /// Port index outside the configured participant count.
    #[error("Invalid port {port} (engine has {ports} ports)")]
    InvalidPort {
        /// The rejected port index.
        port: usize,
        /// Number of participants the engine was built with.
        ports: usize,
    },

    /// MSTI outside the supported instance range.
    #[error("Invalid MSTI {0}")]
    InvalidMsti(u8),

    /// GVRP is administratively disabled on the port.
    #[error("GVRP is not enabled on port {0}")]
    PortNotEnabled(usize),

    /// The allocation class quota for GID arrays is exhausted.
    #[error("No GID resources for VLAN {vid} ({class} class at limit {limit})")]
    ResourceDenied {
        /// The VLAN the array was requested for.
        vid: Vid,
        /// The allocation class that hit its limit.
        class: AllocClass,
        /// The limit of the class.
        limit: usize,
    },

    /// A timer value outside its allowed range.
    #[error("Invalid {kind} timer value {value} (allowed {min}-{max})")]
    InvalidTimer {
        /// Which timer was being set.
        kind: TimerKind,
        /// The rejected value.
        value: u32,
        /// Lower bound.
        min: u32,
        /// Upper bound.
        max: u32,
    },

    /// Configuration validation or parse error.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// The platform refused to send a frame.
    #[error("Transmit on port {port} failed: {message}")]
    Transmit {
        /// Egress port.
        port: usize,
        /// Platform error message.
        message: String,
    },

    /// Internal bookkeeping went out of sync.
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl GvrpError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid port error.
    pub fn invalid_port(port: usize, ports: usize) -> Self {
        Self::InvalidPort { port, ports }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ResourceDenied { .. } | Self::Transmit { .. })
    }
}

/// Reasons a received GARP PDU is rejected.
///
/// Decoding stops at the first error; attributes decoded before it remain
/// valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PduError {
    #[error("Frame too short ({0} bytes)")]
    TooShort(usize),

    #[error("Unexpected GARP protocol ID {0:#06x}")]
    BadProtocolId(u16),

    #[error("Unexpected attribute type {0}")]
    BadAttributeType(u8),

    #[error("Unsupported attribute length {0}")]
    BadAttributeLength(u8),

    #[error("Attribute truncated at offset {0}")]
    Truncated(usize),

    #[error("Attribute carries invalid VLAN ID {0}")]
    InvalidVid(u16),

    #[error("Attribute carries invalid event {0}")]
    InvalidEvent(u8),

    #[error("LeaveAll attribute carries event {0}")]
    BadLeaveAllEvent(u8),
}

/// Classes of repetitive warnings that are emitted only a limited number of
/// times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarnClass {
    /// A GID array could not be allocated.
    PoolExhausted,
    /// A received attribute was dropped.
    RxDropped,
    /// A received frame was malformed.
    RxMalformed,
    /// A frame could not be transmitted.
    TxFailed,
}

impl WarnClass {
    fn limit(self) -> u32 {
        match self {
            WarnClass::PoolExhausted => 3,
            WarnClass::RxDropped | WarnClass::RxMalformed => 5,
            WarnClass::TxFailed => 10,
        }
    }
}

/// Caps how many times each [`WarnClass`] is logged.
#[derive(Debug, Default)]
pub struct WarningLimiter {
    emitted: HashMap<WarnClass, u32>,
}

impl WarningLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a warning of this class may still be logged.
    pub fn allow(&mut self, class: WarnClass) -> bool {
        let count = self.emitted.entry(class).or_insert(0);
        if *count >= class.limit() {
            return false;
        }
        *count += 1;
        true
    }

    /// Number of warnings emitted so far for a class.
    pub fn emitted(&self, class: WarnClass) -> u32 {
        self.emitted.get(&class).copied().unwrap_or(0)
    }

    pub fn reset(&mut self) {
        self.emitted.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GvrpError::invalid_port(9, 4);
        assert_eq!(err.to_string(), "Invalid port 9 (engine has 4 ports)");

        let err = GvrpError::InvalidTimer {
            kind: TimerKind::Leave,
            value: 10,
            min: 60,
            max: 300,
        };
        assert_eq!(err.to_string(), "Invalid leave timer value 10 (allowed 60-300)");
    }

    #[test]
    fn test_is_retryable() {
        let denied = GvrpError::ResourceDenied {
            vid: Vid::new(10).unwrap(),
            class: AllocClass::Default,
            limit: 20,
        };
        assert!(denied.is_retryable());
        assert!(!GvrpError::InvalidVid(0).is_retryable());
    }

    #[test]
    fn test_warning_limiter_caps_per_class() {
        let mut limiter = WarningLimiter::new();
        for _ in 0..3 {
            assert!(limiter.allow(WarnClass::PoolExhausted));
        }
        assert!(!limiter.allow(WarnClass::PoolExhausted));
        assert!(limiter.allow(WarnClass::RxDropped));
        assert_eq!(limiter.emitted(WarnClass::PoolExhausted), 3);

        limiter.reset();
        assert!(limiter.allow(WarnClass::PoolExhausted));
    }
}
