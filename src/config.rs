//! Configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

fn default_pipe_dir() -> PathBuf {
    PathBuf::from("/shared")
}

fn default_command_pipe() -> String {
    "command_pipe".into()
}

fn default_response_pipe() -> String {
    "response_pipe".into()
}

fn default_exec_timeout_seconds() -> u64 {
    30
}

fn default_call_timeout_seconds() -> u64 {
    30
}

fn default_poll_interval_ms() -> u64 {
    10
}

/// Global configuration parsed from `config.toml`.
///
/// Every field is defaulted; [`ConduitConfig::default`] reproduces the
/// reference deployment (`/shared/command_pipe`, `/shared/response_pipe`,
/// 30-second timeouts), so the binaries run without a config file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ConduitConfig {
    /// Directory holding both FIFOs. Must exist; channel creation does not
    /// create parent directories.
    #[serde(default = "default_pipe_dir")]
    pub pipe_dir: PathBuf,
    /// File name of the command pipe (server reads, client writes).
    #[serde(default = "default_command_pipe")]
    pub command_pipe: String,
    /// File name of the response pipe (server writes, client reads).
    #[serde(default = "default_response_pipe")]
    pub response_pipe: String,
    /// Hard wall-clock limit for one shell command on the server.
    #[serde(default = "default_exec_timeout_seconds")]
    pub exec_timeout_seconds: u64,
    /// Client-side deadline for one full call round trip.
    #[serde(default = "default_call_timeout_seconds")]
    pub call_timeout_seconds: u64,
    /// Backoff between transport polls while waiting for a peer.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for ConduitConfig {
    fn default() -> Self {
        Self {
            pipe_dir: default_pipe_dir(),
            command_pipe: default_command_pipe(),
            response_pipe: default_response_pipe(),
            exec_timeout_seconds: default_exec_timeout_seconds(),
            call_timeout_seconds: default_call_timeout_seconds(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl ConduitConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Absolute path of the command pipe.
    #[must_use]
    pub fn command_pipe_path(&self) -> PathBuf {
        self.pipe_dir.join(&self.command_pipe)
    }

    /// Absolute path of the response pipe.
    #[must_use]
    pub fn response_pipe_path(&self) -> PathBuf {
        self.pipe_dir.join(&self.response_pipe)
    }

    /// Server-side execution timeout as a [`Duration`].
    #[must_use]
    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_timeout_seconds)
    }

    /// Client-side call deadline as a [`Duration`].
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_seconds)
    }

    /// Transport poll backoff as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.exec_timeout_seconds == 0 {
            return Err(AppError::Config(
                "exec_timeout_seconds must be greater than zero".into(),
            ));
        }
        if self.call_timeout_seconds == 0 {
            return Err(AppError::Config(
                "call_timeout_seconds must be greater than zero".into(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(AppError::Config(
                "poll_interval_ms must be greater than zero".into(),
            ));
        }
        for name in [&self.command_pipe, &self.response_pipe] {
            if name.is_empty() || name.contains('/') {
                return Err(AppError::Config(format!(
                    "pipe name must be a bare file name, got '{name}'"
                )));
            }
        }
        if self.command_pipe == self.response_pipe {
            return Err(AppError::Config(
                "command_pipe and response_pipe must differ".into(),
            ));
        }
        Ok(())
    }
}
