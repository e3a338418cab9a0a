//! Fixed-interval retry policy.

use std::time::Duration;

use tokio::task::JoinHandle;

use super::{AttemptOutcome, Proceed, RetryPolicy};
use crate::providers::{Providers, TaskProvider, TimeProvider};

/// Delay used when no interval (or a zero interval) is configured.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Retries after a fixed interval, up to an optional attempt budget.
pub struct IntervalRetryPolicy<P: Providers> {
    providers: P,
    attempts: u32,
    /// 0 means unlimited
    max_attempts: u32,
    interval: Duration,
    timer: Option<JoinHandle<()>>,
}

impl<P: Providers> IntervalRetryPolicy<P> {
    /// Create a policy allowing `max_attempts` consecutive retries (0 for
    /// unlimited), waiting `interval` before each.
    pub fn new(providers: P, max_attempts: u32, interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            DEFAULT_RETRY_INTERVAL
        } else {
            interval
        };
        Self {
            providers,
            attempts: 0,
            max_attempts,
            interval,
            timer: None,
        }
    }

    /// Unlimited retries every [`DEFAULT_RETRY_INTERVAL`].
    pub fn new_with_defaults(providers: P) -> Self {
        Self::new(providers, 0, DEFAULT_RETRY_INTERVAL)
    }

    /// Configured attempt budget, 0 for unlimited.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before each attempt.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether a retry is currently scheduled.
    pub fn is_pending(&self) -> bool {
        self.timer
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }
}

impl<P: Providers> RetryPolicy for IntervalRetryPolicy<P> {
    fn attempt(&mut self, proceed: Proceed) -> AttemptOutcome {
        if self.max_attempts > 0 && self.attempts >= self.max_attempts {
            tracing::debug!(
                attempts = self.attempts,
                max_attempts = self.max_attempts,
                "retry budget exhausted"
            );
            return AttemptOutcome::GaveUp;
        }

        self.attempts += 1;
        // At most one outstanding timer
        self.cancel();

        let time = self.providers.time().clone();
        let interval = self.interval;
        let attempt = self.attempts;
        tracing::debug!(attempt, ?interval, "scheduling reconnect");

        self.timer = Some(self.providers.task().spawn_task("retry_attempt", async move {
            match time.sleep(interval).await {
                Ok(()) => {
                    tracing::debug!(attempt, "retry timer fired");
                    proceed();
                }
                Err(e) => tracing::warn!(attempt, error = %e, "retry timer interrupted"),
            }
        }));

        AttemptOutcome::Scheduled
    }

    fn reset(&mut self) {
        self.attempts = 0;
    }

    fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn attempts(&self) -> u32 {
        self.attempts
    }
}
