//! Session configuration.
//!
//! ```toml
//! reply_timeout_ms = 1000
//! when_full = "wait"
//!
//! [serial]
//! path = "/dev/ttyUSB0"
//! baud_rate = 9600
//! ```
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

/// Serial line settings. The line is always 8N1 without flow control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    pub path: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

fn default_baud_rate() -> u32 {
    9600
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: "/dev/ttyUSB0".to_string(),
            baud_rate: default_baud_rate(),
        }
    }
}

/// What to do with a command for a device whose sockets are both busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FullPolicy {
    /// Fail immediately with [Error::CommandBufferFull].
    #[default]
    Reject,
    /// Hold the command until a socket frees up.
    Wait,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub serial: SerialConfig,
    /// How often deadlines are checked.
    pub poll_interval_ms: u64,
    /// Time to wait for the first reply to a packet.
    pub reply_timeout_ms: u64,
    /// Time to wait between ACK and completion of a command.
    pub completion_timeout_ms: u64,
    pub discovery_timeout_ms: u64,
    pub when_full: FullPolicy,
    /// Broadcast a clear after addressing the bus.
    pub clear_after_discovery: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            poll_interval_ms: 100,
            reply_timeout_ms: 1000,
            completion_timeout_ms: 10_000,
            discovery_timeout_ms: 1000,
            when_full: FullPolicy::Reject,
            clear_after_discovery: true,
        }
    }
}

impl SessionConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result {
        if self.serial.path.trim().is_empty() {
            return Err(Error::Config("serial path cannot be empty".to_string()));
        }
        if self.serial.baud_rate == 0 {
            return Err(Error::Config("baud rate must be greater than 0".to_string()));
        }
        for (name, ms) in [
            ("poll_interval_ms", self.poll_interval_ms),
            ("reply_timeout_ms", self.reply_timeout_ms),
            ("completion_timeout_ms", self.completion_timeout_ms),
            ("discovery_timeout_ms", self.discovery_timeout_ms),
        ] {
            if ms == 0 {
                return Err(Error::Config(format!("{name} must be greater than 0")));
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_millis(self.completion_timeout_ms)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }
}
