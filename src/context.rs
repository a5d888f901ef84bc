//! Cancellation context handed to [`Follower::start`](crate::Follower::start).

use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

/// Why a context finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cancelled {
    /// Somebody called [`FollowContext::cancel`] (or cancelled the token).
    Requested,
    /// The deadline elapsed.
    DeadlineExceeded,
}

/// A cancellation token with an optional deadline.
///
/// Cloning shares the token, so cancelling any clone cancels them all.
#[derive(Debug, Clone, Default)]
pub struct FollowContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl FollowContext {
    /// A context that only finishes when cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Finish with [`Cancelled::DeadlineExceeded`] once `deadline` passes.
    /// An earlier deadline already on the context wins.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Resolves once the context is finished. Cancel safe.
    pub async fn done(&self) -> Cancelled {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => Cancelled::Requested,
                    _ = sleep_until(deadline) => Cancelled::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                Cancelled::Requested
            }
        }
    }
}

impl From<CancellationToken> for FollowContext {
    fn from(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    #[tokio::test]
    async fn test_cancel_finishes_with_requested() {
        let ctx = FollowContext::new();
        let mut done = task::spawn(ctx.done());
        assert_pending!(done.poll());

        ctx.cancel();
        assert!(done.is_woken());
        assert_ready_eq!(done.poll(), Cancelled::Requested);
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_clones_share_the_token() {
        let ctx = FollowContext::new();
        let clone = ctx.clone();
        clone.cancel();
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.done().await, Cancelled::Requested);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_finishes_with_deadline_exceeded() {
        let ctx = FollowContext::new().with_timeout(Duration::from_millis(100));
        assert!(!ctx.is_cancelled());

        let started = Instant::now();
        assert_eq!(ctx.done().await, Cancelled::DeadlineExceeded);
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(ctx.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_earlier_deadline_wins() {
        let now = Instant::now();
        let ctx = FollowContext::new()
            .with_deadline(now + Duration::from_secs(1))
            .with_deadline(now + Duration::from_secs(5));
        assert_eq!(ctx.deadline(), Some(now + Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_from_token() {
        let token = CancellationToken::new();
        let ctx = FollowContext::from(token.clone());
        token.cancel();
        assert_eq!(ctx.done().await, Cancelled::Requested);
    }
}
