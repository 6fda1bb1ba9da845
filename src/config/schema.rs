//! Configuration schema definitions.
//!
//! Every section carries `#[serde(default)]`, so a file only needs the keys it
//! changes.

use super::error::{ConfigError, ConfigResult};
use crate::port::{ByteSize, FlowControl, LineSettings, Parity, StopBits, Timeout};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Device and line settings
    pub serial: SerialConfig,
    /// Transfer timeouts
    pub timeouts: TimeoutConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Serial port configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device used when the command line names none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    pub baud_rate: u32,
    /// Data bits, 5 through 8
    pub byte_size: u8,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    /// Short names for device paths
    pub port_aliases: BTreeMap<String, String>,
    /// Modem line polling interval where the driver cannot block on a change
    pub modem_poll_interval_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 115_200,
            byte_size: 8,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            port_aliases: BTreeMap::new(),
            modem_poll_interval_ms: 1,
        }
    }
}

impl SerialConfig {
    /// Resolve a port name through aliases
    pub fn resolve_port(&self, name: &str) -> String {
        self.port_aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// Validated line settings.
    pub fn line_settings(&self) -> ConfigResult<LineSettings> {
        if self.baud_rate == 0 {
            return Err(ConfigError::validation("serial.baud_rate", "must be positive"));
        }
        let byte_size = ByteSize::try_from(self.byte_size)
            .map_err(|_| ConfigError::validation("serial.byte_size", format!("{} is not in 5..=8", self.byte_size)))?;
        Ok(LineSettings {
            baud_rate: self.baud_rate,
            byte_size,
            parity: self.parity,
            stop_bits: self.stop_bits,
            flow_control: self.flow_control,
        })
    }

    pub fn modem_poll_interval(&self) -> Duration {
        Duration::from_millis(self.modem_poll_interval_ms)
    }
}

/// Timeout section, in milliseconds.
///
/// A transfer of `n` bytes may take `constant + multiplier * n`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub read_constant_ms: u32,
    pub read_multiplier_ms: u32,
    /// Maximum gap between bytes of one read; absent means unbounded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inter_byte_ms: Option<u32>,
    pub write_constant_ms: u32,
    pub write_multiplier_ms: u32,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read_constant_ms: 1000,
            read_multiplier_ms: 0,
            inter_byte_ms: None,
            write_constant_ms: 1000,
            write_multiplier_ms: 0,
        }
    }
}

impl TimeoutConfig {
    pub fn to_timeout(&self) -> Timeout {
        Timeout::new(
            self.inter_byte_ms.unwrap_or(Timeout::MAX),
            self.read_constant_ms,
            self.read_multiplier_ms,
            self.write_constant_ms,
            self.write_multiplier_ms,
        )
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    /// Pretty format with colors
    #[default]
    Pretty,
    Compact,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.serial.modem_poll_interval(), Duration::from_millis(1));
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.timeouts.to_timeout().inter_byte_unbounded());
    }

    #[test]
    fn test_port_alias_resolution() {
        let mut config = SerialConfig::default();
        config
            .port_aliases
            .insert("gps".to_string(), "/dev/ttyUSB0".to_string());

        assert_eq!(config.resolve_port("gps"), "/dev/ttyUSB0");
        assert_eq!(config.resolve_port("/dev/ttyS1"), "/dev/ttyS1");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[serial]"));
        assert!(toml_str.contains("[timeouts]"));
        assert!(toml_str.contains("stop_bits = \"1\""));
        assert!(!toml_str.contains("inter_byte_ms"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [serial]
            baud_rate = 9600
            byte_size = 7
            parity = "even"
            stop_bits = "1.5"
            flow_control = "hardware"

            [timeouts]
            inter_byte_ms = 20
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        let settings = config.serial.line_settings().unwrap();
        assert_eq!(
            settings,
            LineSettings {
                baud_rate: 9600,
                byte_size: ByteSize::Seven,
                parity: Parity::Even,
                stop_bits: StopBits::OnePointFive,
                flow_control: FlowControl::Hardware,
            }
        );
        let timeout = config.timeouts.to_timeout();
        assert_eq!(timeout.inter_byte_timeout, 20);
        assert_eq!(timeout.read_timeout_constant, 1000);
        // Defaults should still work
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_out_of_range_values_fail_validation() {
        let mut serial = SerialConfig {
            byte_size: 9,
            ..Default::default()
        };
        assert!(matches!(
            serial.line_settings(),
            Err(ConfigError::ValidationError { ref key, .. }) if key == "serial.byte_size"
        ));

        serial.byte_size = 8;
        serial.baud_rate = 0;
        assert!(matches!(
            serial.line_settings(),
            Err(ConfigError::ValidationError { ref key, .. }) if key == "serial.baud_rate"
        ));
    }

    #[test]
    fn test_unknown_stop_bits_is_parse_error() {
        let result: Result<Config, _> = toml::from_str("[serial]\nstop_bits = \"3\"\n");
        assert!(result.is_err());
    }
}
