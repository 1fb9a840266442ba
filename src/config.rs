//! Session configuration.
//!
//! Every session owns its own configuration value: builders start from
//! `Default` and overlay the caller's overrides, so nothing is shared between
//! sessions.
//!
//! Configurations can also be loaded from JSON, using the option names of
//! other Majordomo peer libraries:
//!
//! ```
//! use mdp_peer::config::{Verbosity, WorkerConfig};
//!
//! let config = WorkerConfig::from_json(r#"{ "heartbeatIntervalMs": 1000, "verbosity": 2 }"#).unwrap();
//! assert_eq!(config.heartbeat_interval_ms, 1000);
//! assert_eq!(config.reconnect_delay_ms, 2500);
//! assert_eq!(config.verbosity, Verbosity::Frames);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MdpError, Result};
use crate::protocol::BodyEncoding;

/// Default heartbeat period.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 2500;

/// Default delay before a timed-out session restarts.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 2500;

/// Default number of silent heartbeat periods tolerated.
pub const DEFAULT_HEARTBEAT_LIVENESS: u32 = 3;

/// How much a session logs.
///
/// Serialized as the integers `0`, `1` and `2`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum Verbosity {
    /// Log nothing.
    Silent,
    /// Log lifecycle events: start, stop, timeouts, requests and replies.
    #[default]
    Lifecycle,
    /// Also dump every frame sent and received.
    Frames,
}

impl TryFrom<u8> for Verbosity {
    type Error = String;

    fn try_from(level: u8) -> std::result::Result<Self, Self::Error> {
        match level {
            0 => Ok(Verbosity::Silent),
            1 => Ok(Verbosity::Lifecycle),
            2 => Ok(Verbosity::Frames),
            other => Err(format!("verbosity must be 0, 1 or 2, got {}", other)),
        }
    }
}

impl From<Verbosity> for u8 {
    fn from(level: Verbosity) -> u8 {
        level as u8
    }
}

/// Configuration of a worker session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WorkerConfig {
    /// Heartbeat send/check period.
    #[serde(alias = "heartrate")]
    pub heartbeat_interval_ms: u64,
    /// Delay before restarting after a timeout or broker disconnect.
    #[serde(alias = "reconnect")]
    pub reconnect_delay_ms: u64,
    /// Missed heartbeats tolerated before declaring the broker lost.
    #[serde(alias = "heartbeatLivenessMax")]
    pub heartbeat_liveness: u32,
    #[serde(alias = "verbose")]
    pub verbosity: Verbosity,
    /// Identity prefix. Defaults to the service name.
    pub name: Option<String>,
    pub body_encoding: BodyEncoding,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            heartbeat_liveness: DEFAULT_HEARTBEAT_LIVENESS,
            verbosity: Verbosity::default(),
            name: None,
            body_encoding: BodyEncoding::default(),
        }
    }
}

impl WorkerConfig {
    /// Parse a JSON object; missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    #[inline]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    #[inline]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Reject values the session state machine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval_ms == 0 {
            return Err(MdpError::Config(
                "heartbeat interval must be non-zero".to_string(),
            ));
        }
        if self.reconnect_delay_ms == 0 {
            return Err(MdpError::Config(
                "reconnect delay must be non-zero".to_string(),
            ));
        }
        if self.heartbeat_liveness == 0 {
            return Err(MdpError::Config(
                "heartbeat liveness must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration of a client session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    /// Identity prefix. Defaults to `client`.
    pub name: Option<String>,
    pub body_encoding: BodyEncoding,
    #[serde(alias = "verbose")]
    pub verbosity: Verbosity,
}

impl ClientConfig {
    /// Parse a JSON object; missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
