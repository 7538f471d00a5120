//! Client configuration.
//!
//! ```
//! use homegear_ipc::ClientConfig;
//!
//! let config = ClientConfig::from_json_str(r#"{
//!     "call_timeout_ms": 2000,
//!     "reconnect": { "max_attempts": 5 }
//! }"#).unwrap();
//!
//! assert_eq!(config.call_timeout().as_millis(), 2000);
//! assert_eq!(config.reconnect.max_attempts, Some(5));
//! assert!(config.reconnect.enabled);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{IpcError, Result};
use crate::protocol::{ABSOLUTE_MAX_PAYLOAD_SIZE, DEFAULT_MAX_PAYLOAD_SIZE};
use crate::writer::DEFAULT_CHANNEL_CAPACITY;

/// Default connection establishment timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on a single `invoke`.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default limit on concurrently running local methods.
pub const DEFAULT_MAX_CONCURRENT_HANDLERS: usize = 256;

/// Backoff between reconnection attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Reconnect after an unexpected loss.
    pub enabled: bool,
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    /// Consecutive failed attempts before giving up. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 10_000,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Never reconnect.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based).
    ///
    /// Grows by `multiplier` per attempt and saturates at `max_delay_ms`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let initial = self.initial_delay_ms as f64;
        let max = self.max_delay_ms.max(self.initial_delay_ms) as f64;
        let exponent = attempt.min(64) as i32;
        let delay = initial * self.multiplier.max(1.0).powi(exponent);
        Duration::from_millis(delay.min(max) as u64)
    }

    /// Check if another attempt is allowed after `failures` consecutive failures.
    pub fn allows(&self, failures: u32) -> bool {
        self.enabled && self.max_attempts.map_or(true, |max| failures < max)
    }
}

/// Tunables for a [`Client`](crate::Client).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub connect_timeout_ms: u64,
    pub call_timeout_ms: u64,
    pub reconnect: ReconnectPolicy,
    /// Largest accepted inbound payload, capped at 1 GiB.
    pub max_payload_size: u32,
    /// Outbound frames queued ahead of the writer task.
    pub channel_capacity: usize,
    pub max_concurrent_handlers: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
            call_timeout_ms: DEFAULT_CALL_TIMEOUT.as_millis() as u64,
            reconnect: ReconnectPolicy::default(),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_concurrent_handlers: DEFAULT_MAX_CONCURRENT_HANDLERS,
        }
    }
}

impl ClientConfig {
    /// Load from JSON. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| IpcError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_payload_size == 0 || self.max_payload_size > ABSOLUTE_MAX_PAYLOAD_SIZE {
            return Err(IpcError::Config(format!(
                "max_payload_size must be between 1 and {ABSOLUTE_MAX_PAYLOAD_SIZE}"
            )));
        }
        if self.channel_capacity == 0 {
            return Err(IpcError::Config("channel_capacity must be positive".into()));
        }
        if self.max_concurrent_handlers == 0 {
            return Err(IpcError::Config(
                "max_concurrent_handlers must be positive".into(),
            ));
        }
        if !self.reconnect.multiplier.is_finite() || self.reconnect.multiplier < 1.0 {
            return Err(IpcError::Config(
                "reconnect.multiplier must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}
