//! User-level configuration.
//!
//! Stored at `~/.config/arbor/config.toml` (or platform equivalent) and
//! never checked into git. Every key has a default; a missing file is the
//! common case and means "all defaults".
//!
//! ```toml
//! # Remote used by sync and tracking setup. Defaults to the repository's
//! # primary remote.
//! remote = "origin"
//!
//! # Ceiling for a single git invocation, in seconds.
//! command-timeout-secs = 120
//!
//! # Registry lock retry policy: attempts, and backoff added per attempt.
//! lock-attempts = 5
//! lock-backoff-ms = 100
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

#[cfg(not(test))]
use etcetera::base_strategy::{BaseStrategy, choose_base_strategy};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Remote that sync fetches from and tracking binds to. `None` lets the
    /// repository's own configuration decide.
    #[serde(default)]
    pub remote: Option<String>,

    /// Per-command timeout for git invocations, in seconds.
    #[serde(default = "default_command_timeout_secs", rename = "command-timeout-secs")]
    pub command_timeout_secs: u64,

    /// How many times to try taking the registry lock before giving up.
    #[serde(default = "default_lock_attempts", rename = "lock-attempts")]
    pub lock_attempts: u32,

    /// Backoff unit between lock attempts; attempt `n` waits `n` units.
    #[serde(default = "default_lock_backoff_ms", rename = "lock-backoff-ms")]
    pub lock_backoff_ms: u64,
}

fn default_command_timeout_secs() -> u64 {
    120
}

fn default_lock_attempts() -> u32 {
    5
}

fn default_lock_backoff_ms() -> u64 {
    100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote: None,
            command_timeout_secs: default_command_timeout_secs(),
            lock_attempts: default_lock_attempts(),
            lock_backoff_ms: default_lock_backoff_ms(),
        }
    }
}

impl Config {
    /// Load from the config file, falling back to defaults when the file
    /// does not exist. A file that exists but fails to parse is an error;
    /// silently ignoring a typo'd config hides real misconfiguration.
    pub fn load() -> anyhow::Result<Self> {
        let Some(path) = config_path() else {
            return Ok(Self::default());
        };
        match std::fs::read_to_string(&path) {
            Ok(text) => toml::from_str(&text)
                .with_context(|| format!("Invalid config file: {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("Failed to read config file: {}", path.display()))),
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn lock_backoff(&self) -> Duration {
        Duration::from_millis(self.lock_backoff_ms)
    }
}

/// Resolve the config file path.
pub fn config_path() -> Option<PathBuf> {
    // Environment override (also what tests use for isolation)
    if let Ok(path) = std::env::var("ARBOR_CONFIG_PATH") {
        return Some(PathBuf::from(path));
    }

    // In test builds, ARBOR_CONFIG_PATH must be set to keep tests away from
    // the developer's real config.
    #[cfg(test)]
    panic!("ARBOR_CONFIG_PATH not set in test; point it at an isolated file");

    // XDG on Linux and macOS (respects XDG_CONFIG_HOME), %APPDATA% on Windows
    #[cfg(not(test))]
    {
        let strategy = choose_base_strategy().ok()?;
        Some(strategy.config_dir().join("arbor").join("config.toml"))
    }
}
