//! gvrpd configuration file.
//!
//! ```toml
//! [gvrp]
//! ports = 32
//! max_vlans = 64
//!
//! [gvrp.timers]
//! join_time = 20
//!
//! [runtime]
//! tick_interval_ms = 10
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use sonic_gvrp::GvrpConfig;

use crate::error::{DaemonError, DaemonResult};

/// Length of one protocol tick.
pub const TICK_MS: u64 = 10;

const TICK_INTERVAL_RANGE: (u64, u64) = (TICK_MS, 1000);

/// Event loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// How often the timer clock is advanced, in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Capacity of the actor command queue.
    #[serde(default = "default_command_queue_depth")]
    pub command_queue_depth: usize,
}

fn default_tick_interval_ms() -> u64 {
    TICK_MS
}

fn default_command_queue_depth() -> usize {
    256
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            command_queue_depth: default_command_queue_depth(),
        }
    }
}

impl RuntimeConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> DaemonResult<()> {
        let (min, max) = TICK_INTERVAL_RANGE;
        if self.tick_interval_ms < min || self.tick_interval_ms > max {
            return Err(DaemonError::config(
                "runtime.tick_interval_ms",
                format!("{} outside {}-{}", self.tick_interval_ms, min, max),
            ));
        }
        if self.command_queue_depth == 0 {
            return Err(DaemonError::config(
                "runtime.command_queue_depth",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub gvrp: GvrpConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl DaemonConfig {
    pub fn from_toml_str(content: &str) -> DaemonResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| DaemonError::config("gvrpd", format!("failed to parse: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> DaemonResult<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> DaemonResult<()> {
        self.gvrp.validate()?;
        self.runtime.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = DaemonConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.runtime.tick_interval(), Duration::from_millis(10));
        assert_eq!(config.runtime.command_queue_depth, 256);
    }

    #[test]
    fn test_parse_partial_file() {
        let config = DaemonConfig::from_toml_str(
            r#"
            [gvrp]
            ports = 4

            [gvrp.timers]
            leave_time = 80

            [runtime]
            tick_interval_ms = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.gvrp.ports, 4);
        assert_eq!(config.gvrp.max_vlans, 20);
        assert_eq!(config.gvrp.timers.leave_time, 80);
        assert_eq!(config.gvrp.timers.join_time, 20);
        assert_eq!(config.runtime.tick_interval_ms, 50);
        assert_eq!(config.runtime.command_queue_depth, 256);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = DaemonConfig::from_toml_str("[runtime]\ntick_interval_ms = 5\n").unwrap_err();
        assert!(matches!(err, DaemonError::Config { .. }));

        let err = DaemonConfig::from_toml_str("[gvrp.timers]\njoin_time = 50\n").unwrap_err();
        assert!(matches!(err, DaemonError::Engine(_)));

        assert!(DaemonConfig::from_toml_str("[gvrp\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[gvrp]\nports = 2\nmax_vlans = 4").unwrap();

        let config = DaemonConfig::load(file.path()).unwrap();
        assert_eq!(config.gvrp.ports, 2);
        assert_eq!(config.gvrp.max_vlans, 4);

        assert!(matches!(
            DaemonConfig::load("/nonexistent/gvrpd.toml"),
            Err(DaemonError::Io(_))
        ));
    }
}
