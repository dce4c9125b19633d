//! Configuration module for serial-assistant.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//! It only covers the shell's defaults; the allowed serial values are compile-time
//! constants in [`crate::port`].
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `SERIAL_ASSISTANT_CONFIG` environment variable (explicit path)
//! 2. `./serial-assistant.toml` (current directory)
//! 3. `~/.config/serial-assistant/config.toml` (XDG on Linux/macOS)
//! 4. `%APPDATA%\serial-assistant\config.toml` (Windows)
//! 5. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! The pattern is: `SERIAL_ASSISTANT_<SECTION>_<KEY>`
//!
//! Examples:
//! - `SERIAL_ASSISTANT_SERIAL_DEFAULT_BAUD=115200`
//! - `SERIAL_ASSISTANT_POLLING_INTERVAL_MS=200`
//!
//! # Example
//!
//! ```rust,no_run
//! use serial_assistant::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! println!("Default baud: {}", loader.config().serial.default_baud);
//! # Ok::<(), serial_assistant::config::ConfigError>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{get_default_config_path, resolve_config_path, ConfigLoader};
pub use schema::{Config, LogFormat, LoggingConfig, PollingConfig, SerialConfig};
