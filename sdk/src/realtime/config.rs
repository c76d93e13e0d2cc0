//! Realtime client configuration.

use serde::{Deserialize, Serialize};

use super::backoff::BackoffPolicy;
use crate::error::ConfigError;

/// Default number of recent event ids remembered per channel.
pub const DEFAULT_DEDUP_WINDOW: usize = 200;

/// Default capacity hint for the outbound command queue.
pub const DEFAULT_COMMAND_BUFFER: usize = 256;

/// Configuration for the realtime client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Reconnection backoff.
    pub backoff: BackoffPolicy,

    /// Recent event ids remembered per channel for deduplication.
    pub dedup_window: usize,

    /// Capacity of the inbound signal buffer handed to transports.
    pub command_buffer: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            dedup_window: DEFAULT_DEDUP_WINDOW,
            command_buffer: DEFAULT_COMMAND_BUFFER,
        }
    }
}

impl RealtimeConfig {
    /// Sets the backoff policy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the dedup window.
    #[must_use]
    pub fn with_dedup_window(mut self, window: usize) -> Self {
        self.dedup_window = window;
        self
    }

    /// Sets the inbound signal buffer size.
    #[must_use]
    pub fn with_command_buffer(mut self, size: usize) -> Self {
        self.command_buffer = size;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.backoff.validate()?;
        if self.dedup_window == 0 {
            return Err(ConfigError::InvalidDedupWindow);
        }
        if self.command_buffer == 0 {
            return Err(ConfigError::InvalidCommandBuffer);
        }
        Ok(())
    }
}
