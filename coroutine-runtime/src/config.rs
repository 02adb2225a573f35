//! Ordinator configuration and builder

use crate::ordinator::Ordinator;
use crate::strategy::Strategy;
use coroutine_common::config;
use std::time::Duration;

/// Ordinator configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Size of each routine's own stack (dedicated strategy)
    pub stack_size: usize,

    /// Size of the single stack all routines run on (shared-stack strategy)
    pub shared_stack_size: usize,

    /// How often `await_blocking` checks its worker for a result
    pub poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stack_size: config::DEFAULT_STACK_SIZE,
            shared_stack_size: config::DEFAULT_SHARED_STACK_SIZE,
            poll_interval: Duration::from_millis(config::DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

/// Ordinator builder
pub struct Builder {
    config: Config,
}

impl Builder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Set the per-routine stack size
    ///
    /// Rounded up to whole pages when the stack is mapped; never smaller
    /// than `MIN_STACK_SIZE`.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = size;
        self
    }

    /// Set the shared stack size
    ///
    /// The deepest call chain any routine reaches between two yields must
    /// fit in here.
    pub fn shared_stack_size(mut self, size: usize) -> Self {
        self.config.shared_stack_size = size;
        self
    }

    /// Set the await poll interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Get the configuration built so far
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build an ordinator using the strategy selected at compile time
    pub fn build(self) -> Ordinator {
        Ordinator::with_config(self.config)
    }

    /// Build an ordinator with an explicit strategy
    pub fn build_with<S: Strategy>(self) -> Ordinator<S> {
        Ordinator::with_config(self.config)
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let builder = Builder::new()
            .stack_size(64 * 1024)
            .shared_stack_size(256 * 1024)
            .poll_interval(Duration::from_millis(2));

        assert_eq!(builder.config().stack_size, 64 * 1024);
        assert_eq!(builder.config().shared_stack_size, 256 * 1024);
        assert_eq!(builder.config().poll_interval, Duration::from_millis(2));

        let ordinator = builder.build();
        assert_eq!(ordinator.config().poll_interval, Duration::from_millis(2));
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.stack_size, config::DEFAULT_STACK_SIZE);
        assert_eq!(config.shared_stack_size, config::DEFAULT_SHARED_STACK_SIZE);
        assert_eq!(config.poll_interval, Duration::from_millis(10));
    }
}
