//! Errors raised while loading or saving `serial-assistant.toml`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or has a field of the wrong type.
    #[error("malformed config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("cannot encode config as TOML: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("cannot write {path}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A value parsed but cannot be used, e.g. a baud rate outside the allowed set.
    #[error("config key `{key}` rejected: {message}")]
    ValidationError { key: String, message: String },

    /// A `SERIAL_ASSISTANT_*` override could not be parsed.
    #[error("environment override {var} ignored: {message}")]
    EnvParseError { var: String, message: String },
}

impl ConfigError {
    pub(crate) fn validation(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            key: key.into(),
            message: message.into(),
        }
    }

    pub(crate) fn env_parse(var: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EnvParseError {
            var: var.into(),
            message: message.into(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
