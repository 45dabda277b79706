//! GVRP engine configuration.
//!
//! Loaded from the `[gvrp]` table of the daemon's TOML file, or built in
//! code. Timer values are in engine ticks; the daemon drives one tick per
//! centisecond, which makes the defaults the 802.1D values.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{GvrpError, GvrpResult};
use crate::types::{TimerKind, Vid};

/// Allowed join timer range.
pub const JOIN_TIME_RANGE: (u32, u32) = (1, 20);
/// Allowed leave timer range.
pub const LEAVE_TIME_RANGE: (u32, u32) = (60, 300);
/// Allowed leaveall timer range.
pub const LEAVE_ALL_TIME_RANGE: (u32, u32) = (1000, 5000);

/// GARP timer periods in ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Join time: delay before a transmit opportunity.
    #[serde(default = "default_join_time")]
    pub join_time: u32,

    /// Leave time: how long a registrar stays in LV.
    #[serde(default = "default_leave_time")]
    pub leave_time: u32,

    /// LeaveAll time: period of the LeaveAll timer.
    #[serde(default = "default_leave_all_time")]
    pub leave_all_time: u32,
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GvrpConfig {
    /// Number of participants (ports).
    #[serde(default = "default_ports")]
    pub ports: usize,

    /// Number of VLANs that may hold protocol state at the same time.
    #[serde(default = "default_max_vlans")]
    pub max_vlans: usize,

    /// Source MAC address written into transmitted PDUs.
    #[serde(default)]
    pub source_mac: [u8; 6],

    /// Timer periods.
    #[serde(default)]
    pub timers: TimerConfig,
}

fn default_join_time() -> u32 {
    20
}

fn default_leave_time() -> u32 {
    60
}

fn default_leave_all_time() -> u32 {
    1000
}

fn default_ports() -> usize {
    8
}

fn default_max_vlans() -> usize {
    20
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            join_time: default_join_time(),
            leave_time: default_leave_time(),
            leave_all_time: default_leave_all_time(),
        }
    }
}

impl Default for GvrpConfig {
    fn default() -> Self {
        Self {
            ports: default_ports(),
            max_vlans: default_max_vlans(),
            source_mac: [0; 6],
            timers: TimerConfig::default(),
        }
    }
}

impl TimerConfig {
    /// Allowed range of a timer.
    pub fn range(kind: TimerKind) -> (u32, u32) {
        match kind {
            TimerKind::TransmitPdu => JOIN_TIME_RANGE,
            TimerKind::Leave => LEAVE_TIME_RANGE,
            TimerKind::LeaveAll => LEAVE_ALL_TIME_RANGE,
        }
    }

    pub fn get(&self, kind: TimerKind) -> u32 {
        match kind {
            TimerKind::TransmitPdu => self.join_time,
            TimerKind::Leave => self.leave_time,
            TimerKind::LeaveAll => self.leave_all_time,
        }
    }

    /// Sets one timer after checking its range.
    pub fn set(&mut self, kind: TimerKind, value: u32) -> GvrpResult<()> {
        Self::check(kind, value)?;
        match kind {
            TimerKind::TransmitPdu => self.join_time = value,
            TimerKind::Leave => self.leave_time = value,
            TimerKind::LeaveAll => self.leave_all_time = value,
        }
        Ok(())
    }

    pub fn validate(&self) -> GvrpResult<()> {
        Self::check(TimerKind::TransmitPdu, self.join_time)?;
        Self::check(TimerKind::Leave, self.leave_time)?;
        Self::check(TimerKind::LeaveAll, self.leave_all_time)
    }

    fn check(kind: TimerKind, value: u32) -> GvrpResult<()> {
        let (min, max) = Self::range(kind);
        if value < min || value > max {
            return Err(GvrpError::InvalidTimer {
                kind,
                value,
                min,
                max,
            });
        }
        Ok(())
    }
}

impl GvrpConfig {
    /// Creates a configuration for `ports` participants with default values
    /// otherwise.
    pub fn with_ports(ports: usize) -> Self {
        Self {
            ports,
            ..Self::default()
        }
    }

    /// Parses a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> GvrpResult<Self> {
        toml::from_str(content)
            .map_err(|e| GvrpError::invalid_config("gvrp", format!("failed to parse: {}", e)))
    }

    /// Loads and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> GvrpResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content).map_err(|e| {
            GvrpError::invalid_config(path.display().to_string(), e.to_string())
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates configuration.
    pub fn validate(&self) -> GvrpResult<()> {
        if self.ports == 0 {
            return Err(GvrpError::invalid_config("ports", "must be at least 1"));
        }

        if self.max_vlans == 0 || self.max_vlans > usize::from(Vid::MAX) {
            return Err(GvrpError::invalid_config(
                "max_vlans",
                format!("{} outside 1-{}", self.max_vlans, Vid::MAX),
            ));
        }

        self.timers.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = GvrpConfig::default();
        assert_eq!(config.max_vlans, 20);
        assert_eq!(config.timers.join_time, 20);
        assert_eq!(config.timers.leave_time, 60);
        assert_eq!(config.timers.leave_all_time, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_max_vlans() {
        let mut config = GvrpConfig::default();
        config.max_vlans = 0;
        assert!(config.validate().is_err());
        config.max_vlans = 4095;
        assert!(config.validate().is_err());
        config.max_vlans = 4094;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_ports() {
        let config = GvrpConfig::with_ports(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timer_set_ranges() {
        let mut timers = TimerConfig::default();
        assert!(timers.set(TimerKind::TransmitPdu, 0).is_err());
        assert!(timers.set(TimerKind::TransmitPdu, 21).is_err());
        assert!(timers.set(TimerKind::Leave, 59).is_err());
        assert!(timers.set(TimerKind::LeaveAll, 5001).is_err());

        timers.set(TimerKind::Leave, 120).unwrap();
        assert_eq!(timers.get(TimerKind::Leave), 120);
        assert_eq!(timers.leave_time, 120);
    }

    #[test]
    fn test_toml_deserialization_partial() {
        let config = GvrpConfig::from_toml_str(
            r#"
            ports = 24
            max_vlans = 256

            [timers]
            leave_time = 90
            "#,
        )
        .unwrap();

        assert_eq!(config.ports, 24);
        assert_eq!(config.max_vlans, 256);
        assert_eq!(config.timers.leave_time, 90);
        assert_eq!(config.timers.join_time, 20);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = GvrpConfig::with_ports(4);
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(GvrpConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_load_rejects_invalid_timer() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[timers]\njoin_time = 50").unwrap();

        let err = GvrpConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, GvrpError::InvalidTimer { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let err = GvrpConfig::load("/nonexistent/gvrp.toml").unwrap_err();
        assert!(matches!(err, GvrpError::Io(_)));
    }
}
