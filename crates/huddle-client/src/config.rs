//! Client configuration.

use huddle_core::BackoffConfig;

/// Tuning for [`crate::RoomClient`] and [`crate::VotingClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    /// Reconnect delays for event streams.
    pub retry: BackoffConfig,
    /// Commands that may queue before callers wait.
    pub command_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { retry: BackoffConfig::default(), command_capacity: 64 }
    }
}

impl ClientConfig {
    /// Set reconnect delays.
    #[must_use]
    pub fn with_retry(mut self, retry: BackoffConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the command queue size. Zero is raised to one.
    #[must_use]
    pub fn with_command_capacity(mut self, capacity: usize) -> Self {
        self.command_capacity = capacity.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let retry = BackoffConfig { floor: Duration::from_millis(10), cap: Duration::from_millis(80) };
        let config = ClientConfig::default().with_retry(retry).with_command_capacity(0);

        assert_eq!(config.retry, retry);
        assert_eq!(config.command_capacity, 1);
        assert_eq!(ClientConfig::default().command_capacity, 64);
    }
}
