//! Transaction manager configuration.

use std::time::Duration;

/// Configuration for the transaction manager.
#[derive(Debug, Clone)]
pub struct TxnConfig {
    /// How long a transaction may stay idle before the sweep aborts it.
    pub time_to_live: Duration,

    /// How often the background sweep scans for expired transactions.
    pub sweep_interval: Duration,

    /// Upper bound on a single lock wait; exceeding it counts as deadlock.
    pub lock_wait: Duration,
}

impl Default for TxnConfig {
    fn default() -> Self {
        Self {
            time_to_live: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(1),
            lock_wait: Duration::from_secs(5),
        }
    }
}

impl TxnConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the transaction time-to-live.
    #[must_use]
    pub const fn time_to_live(mut self, ttl: Duration) -> Self {
        self.time_to_live = ttl;
        self
    }

    /// Sets the sweep interval.
    #[must_use]
    pub const fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Sets the lock wait bound.
    #[must_use]
    pub const fn lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }
}
