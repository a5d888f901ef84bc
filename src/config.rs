//! Configuration for follow sessions.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long the slow reconnect phase may keep trying after the fast phase
/// failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryBudget {
    /// No slow phase; a failed fast phase ends the session.
    Disabled,
    /// Retry forever.
    Unbounded,
    /// Retry until this much wall-clock time has passed in the slow phase.
    Bounded(Duration),
}

impl RetryBudget {
    /// Maps a signed millisecond budget: `0` disables reconnection, a
    /// negative value is unbounded, anything else is a bounded budget.
    pub fn from_millis(millis: i64) -> Self {
        match millis {
            0 => RetryBudget::Disabled,
            m if m < 0 => RetryBudget::Unbounded,
            m => RetryBudget::Bounded(Duration::from_millis(m.unsigned_abs())),
        }
    }
}

/// Where the initial open positions the cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartPosition {
    /// Only content written after the session starts is emitted.
    #[default]
    End,
    /// Existing content is emitted first.
    Beginning,
}

/// Immutable configuration for a follower.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowConfig {
    /// Byte that terminates a line (default: `\n`)
    pub delimiter: u8,
    /// Initial cursor placement (default: end of file)
    pub start_position: StartPosition,
    /// Reconnect attempts in the fast phase, the first one immediate (default: 10)
    pub fast_attempts: u32,
    /// Interval between fast phase attempts in milliseconds (default: 50ms)
    pub fast_interval_ms: u64,
    /// Interval between slow phase attempts in milliseconds (default: 1000ms)
    pub slow_interval_ms: u64,
    /// Slow phase budget in milliseconds: 0 disables it, negative is
    /// unbounded (default: -1)
    pub retry_budget_ms: i64,
}

impl FollowConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration from builder
    pub fn builder() -> FollowConfigBuilder {
        FollowConfigBuilder::default()
    }

    pub fn fast_interval(&self) -> Duration {
        Duration::from_millis(self.fast_interval_ms)
    }

    pub fn slow_interval(&self) -> Duration {
        Duration::from_millis(self.slow_interval_ms)
    }

    pub fn retry_budget(&self) -> RetryBudget {
        RetryBudget::from_millis(self.retry_budget_ms)
    }
}

impl Default for FollowConfig {
    fn default() -> Self {
        Self {
            delimiter: b'\n',
            start_position: StartPosition::End,
            fast_attempts: 10,
            fast_interval_ms: 50,
            slow_interval_ms: 1000,
            retry_budget_ms: -1,
        }
    }
}

/// Builder for [`FollowConfig`]
#[derive(Debug, Default)]
pub struct FollowConfigBuilder {
    config: FollowConfig,
}

impl FollowConfigBuilder {
    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.config.delimiter = delimiter;
        self
    }

    pub fn start_position(mut self, start_position: StartPosition) -> Self {
        self.config.start_position = start_position;
        self
    }

    pub fn fast_attempts(mut self, attempts: u32) -> Self {
        self.config.fast_attempts = attempts;
        self
    }

    pub fn fast_interval(mut self, interval: Duration) -> Self {
        self.config.fast_interval_ms = duration_millis(interval);
        self
    }

    pub fn slow_interval(mut self, interval: Duration) -> Self {
        self.config.slow_interval_ms = duration_millis(interval);
        self
    }

    pub fn retry_budget(mut self, budget: RetryBudget) -> Self {
        self.config.retry_budget_ms = match budget {
            RetryBudget::Disabled => 0,
            RetryBudget::Unbounded => -1,
            RetryBudget::Bounded(d) => i64::try_from(d.as_millis()).unwrap_or(i64::MAX).max(1),
        };
        self
    }

    pub fn build(self) -> FollowConfig {
        self.config
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
