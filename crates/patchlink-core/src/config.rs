//! Dispatcher configuration.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::protocol::constants::*;

/// Configuration for a command dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Interval of the heartbeat and control-value producers.
    pub poll_interval_ms: u64,
    pub command_queue_capacity: usize,
    pub response_queue_capacity: usize,
    /// Enqueue timeout for user-initiated commands.
    pub user_offer_timeout_ms: u64,
    /// Enqueue timeout for periodic commands.
    pub periodic_offer_timeout_ms: u64,
    /// Acknowledgment timeout of one-shot commands and transfer appends/closes.
    pub ack_timeout_ms: u64,
    /// Acknowledgment timeout of the open phase of a transfer.
    pub open_timeout_ms: u64,
    /// Bytes per append phase.
    pub chunk_size: usize,
    /// Window after a long operation during which most commands are refused.
    pub cooldown_ms: u64,
    /// Run the heartbeat producer.
    pub heartbeat_enabled: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            command_queue_capacity: COMMAND_QUEUE_CAPACITY,
            response_queue_capacity: RESPONSE_QUEUE_CAPACITY,
            user_offer_timeout_ms: USER_OFFER_TIMEOUT_MS,
            periodic_offer_timeout_ms: PERIODIC_OFFER_TIMEOUT_MS,
            ack_timeout_ms: DEFAULT_ACK_TIMEOUT_MS,
            open_timeout_ms: OPEN_TIMEOUT_MS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            cooldown_ms: LONG_OPERATION_COOLDOWN_MS,
            heartbeat_enabled: true,
        }
    }
}

impl DispatcherConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DispatcherConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn user_offer_timeout(&self) -> Duration {
        Duration::from_millis(self.user_offer_timeout_ms)
    }

    pub fn periodic_offer_timeout(&self) -> Duration {
        Duration::from_millis(self.periodic_offer_timeout_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}
