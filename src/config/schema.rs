//! Configuration schema definitions.
//!
//! This module defines the structure of the configuration file using serde.
//! All configuration sections are defined here with appropriate defaults.

use crate::port::{DataBits, Parity, PortConfig, StopBits, DEFAULT_BAUD_RATE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default line parameters
    pub serial: SerialConfig,
    /// Read polling cadence
    pub polling: PollingConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Serial line defaults used when the command line leaves a parameter out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Default baud rate for new connections
    pub default_baud: u32,
    /// Default data bits (5-8)
    pub default_data_bits: u8,
    /// Default stop bits (1 or 2)
    pub default_stop_bits: u8,
    /// Default parity: "None", "Odd" or "Even"
    pub default_parity: String,
    /// Port aliases for convenience
    #[serde(default)]
    pub port_aliases: HashMap<String, String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            default_baud: DEFAULT_BAUD_RATE,
            default_data_bits: 8,
            default_stop_bits: 1,
            default_parity: "None".to_string(),
            port_aliases: HashMap::new(),
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

    /// Check the defaults against the allowed value sets.
    pub fn validate(&self) -> Result<(), String> {
        let config = PortConfig {
            port_name: "default".to_string(),
            baud_rate: self.default_baud,
            data_bits: DataBits::try_from(self.default_data_bits)?,
            stop_bits: StopBits::try_from(self.default_stop_bits)?,
            parity: self.default_parity.parse::<Parity>()?,
        };
        config.validate()
    }
}

/// How often the shell polls for incoming data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Interval between reads in milliseconds
    pub interval_ms: u64,
    /// Timeout of each read in milliseconds
    pub read_timeout_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            read_timeout_ms: 50,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
    /// Include timestamps in log lines
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            timestamps: true,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    #[default]
    Pretty,
    /// Compact format
    Compact,
}
