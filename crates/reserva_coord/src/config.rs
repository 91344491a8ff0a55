//! Coordinator configuration.

use std::time::Duration;

/// Configuration for the coordinator.
#[derive(Debug, Clone)]
pub struct CoordConfig {
    /// Upper bound on each remote call made on behalf of a bundle or a
    /// customer-deletion fan-out. A call that misses the bound counts as
    /// failed; the remote side may still finish, which is what compensation
    /// is for.
    pub response_timeout: Duration,
}

impl Default for CoordConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(3),
        }
    }
}

impl CoordConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-call response timeout.
    #[must_use]
    pub const fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeout() {
        assert_eq!(CoordConfig::default().response_timeout, Duration::from_secs(3));
    }

    #[test]
    fn builder_pattern() {
        let config = CoordConfig::new().response_timeout(Duration::from_millis(50));
        assert_eq!(config.response_timeout, Duration::from_millis(50));
    }
}
