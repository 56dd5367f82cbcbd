//! Configuration for the sync engine.

use rand::Rng;
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts allowed before a transiently failing operation is marked failed.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% random jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration that retries immediately, mostly for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier. A negative product means no delay, an
    /// undefined one means `max_delay`.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, add_jitter: bool) -> Self {
        self.add_jitter = add_jitter;
        self
    }

    /// Delay before the next attempt, given how many attempts were already made.
    pub fn delay_for_attempt(&self, attempts_made: u32) -> Duration {
        if attempts_made == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempts_made - 1).unwrap_or(i32::MAX);
        let base_delay = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        // NaN falls through `min` to max_delay; negatives clamp to zero.
        let delay_secs = base_delay.min(self.max_delay.as_secs_f64()).max(0.0);

        if self.add_jitter && delay_secs > 0.0 {
            let jitter = delay_secs * 0.25 * rand::thread_rng().gen::<f64>();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Configuration for the sync queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Retry policy for transient failures.
    pub retry: RetryConfig,
    /// Time box for a single network call.
    pub execute_timeout: Duration,
    /// How long completed operations are kept. `None` keeps them forever.
    pub completed_retention: Option<Duration>,
    /// How long failed operations are kept. `None` keeps them until cleared.
    pub failed_retention: Option<Duration>,
    /// Start a processing pass after each enqueue while online.
    pub process_on_enqueue: bool,
}

impl QueueConfig {
    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the network call timeout.
    pub fn with_execute_timeout(mut self, timeout: Duration) -> Self {
        self.execute_timeout = timeout;
        self
    }

    /// Sets the retention for completed operations.
    pub fn with_completed_retention(mut self, retention: Option<Duration>) -> Self {
        self.completed_retention = retention;
        self
    }

    /// Sets the retention for failed operations.
    pub fn with_failed_retention(mut self, retention: Option<Duration>) -> Self {
        self.failed_retention = retention;
        self
    }

    /// Enables or disables processing right after enqueue.
    pub fn with_process_on_enqueue(mut self, enabled: bool) -> Self {
        self.process_on_enqueue = enabled;
        self
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            execute_timeout: Duration::from_secs(30),
            completed_retention: Some(Duration::from_secs(24 * 60 * 60)),
            failed_retention: None,
            process_on_enqueue: true,
        }
    }
}

/// Configuration for the network status monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Quiet period a status must hold before it is published.
    pub debounce: Duration,
    /// Latency above which the link is poor.
    pub poor_latency: Duration,
    /// Latency above which the link is only fair.
    pub fair_latency: Duration,
    /// Downlink below which the link is poor, in kbit/s.
    pub poor_downlink_kbps: f64,
    /// Downlink below which the link is only fair, in kbit/s.
    pub fair_downlink_kbps: f64,
}

impl MonitorConfig {
    /// Sets the debounce window.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Sets the latency thresholds.
    pub fn with_latency_thresholds(mut self, fair: Duration, poor: Duration) -> Self {
        self.fair_latency = fair;
        self.poor_latency = poor;
        self
    }

    /// Sets the downlink thresholds.
    pub fn with_downlink_thresholds(mut self, fair_kbps: f64, poor_kbps: f64) -> Self {
        self.fair_downlink_kbps = fair_kbps;
        self.poor_downlink_kbps = poor_kbps;
        self
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(1),
            poor_latency: Duration::from_millis(1000),
            fair_latency: Duration::from_millis(300),
            poor_downlink_kbps: 150.0,
            fair_downlink_kbps: 1500.0,
        }
    }
}

/// Which side wins when local and server timestamps are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    /// The server is the source of truth on ties.
    #[default]
    PreferServer,
    /// The local edit wins ties.
    PreferLocal,
}

/// Configuration for the conflict manager.
#[derive(Debug, Clone)]
pub struct ConflictConfig {
    /// Maximum number of conflicts kept in history.
    pub history_limit: usize,
    /// Tie-break rule for equal timestamps.
    pub tie_break: TieBreak,
}

impl ConflictConfig {
    /// Sets the history cap.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Sets the tie-break rule.
    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            history_limit: 100,
            tie_break: TieBreak::PreferServer,
        }
    }
}
