use std::time::Duration;

/// Runtime configuration for the command bus and its retry consumer.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Envelopes whose attempt count has reached this value are discarded by
    /// the retry consumer instead of being re-invoked.
    pub max_attempts: u32,
    /// Capacity of the failure channel between async dispatch tasks and the
    /// retry consumer. Failed tasks wait for the consumer to take their
    /// envelope regardless; this bounds how many envelopes may sit queued.
    pub failure_channel_capacity: usize,
    /// How long kernel shutdown waits for in-flight async dispatches.
    pub drain_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            failure_channel_capacity: 1,
            drain_timeout: Duration::from_secs(30),
        }
    }
}

impl BusConfig {
    /// Checks that the configuration can drive a bus.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroMaxAttempts);
        }
        if self.failure_channel_capacity == 0 {
            return Err(ConfigError::ZeroChannelCapacity);
        }
        Ok(())
    }
}

/// Errors from validating a `BusConfig`.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_attempts must be at least 1")]
    ZeroMaxAttempts,
    #[error("failure_channel_capacity must be at least 1")]
    ZeroChannelCapacity,
}
