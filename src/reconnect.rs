//! Two-phase reattach schedule used after the followed file disappears.

use crate::config::{FollowConfig, RetryBudget};
use std::time::Duration;
use tokio::time::Instant;

/// Decides how long to wait before the next reattach attempt.
///
/// The fast phase makes `fast_attempts` attempts spaced `fast_interval`
/// apart; the first attempt happens immediately and is not scheduled here.
/// The slow phase then retries every `slow_interval` as the budget allows,
/// with a bounded budget measured from the moment the slow phase begins.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    fast_attempts: u32,
    fast_interval: Duration,
    slow_interval: Duration,
    budget: RetryBudget,
    failures: u32,
    slow_deadline: Option<Instant>,
}

impl Backoff {
    pub(crate) fn new(config: &FollowConfig) -> Self {
        Self {
            fast_attempts: config.fast_attempts.max(1),
            fast_interval: config.fast_interval(),
            slow_interval: config.slow_interval(),
            budget: config.retry_budget(),
            failures: 0,
            slow_deadline: None,
        }
    }

    /// Records a failed attempt at `now`. Returns the delay before the next
    /// attempt, or `None` once the schedule is exhausted.
    pub(crate) fn next_delay(&mut self, now: Instant) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);
        if self.failures < self.fast_attempts {
            return Some(self.fast_interval);
        }

        match self.budget {
            RetryBudget::Disabled => None,
            RetryBudget::Unbounded => Some(self.slow_interval),
            RetryBudget::Bounded(budget) => {
                let deadline = *self.slow_deadline.get_or_insert(now + budget);
                let remaining = deadline.saturating_duration_since(now);
                if remaining.is_zero() {
                    None
                } else {
                    Some(self.slow_interval.min(remaining))
                }
            }
        }
    }

    /// Failed attempts so far.
    pub(crate) fn failures(&self) -> u32 {
        self.failures
    }

    pub(crate) fn in_slow_phase(&self) -> bool {
        self.failures >= self.fast_attempts
    }
}
