//! Retry strategies for abnormal disconnects.
//!
//! [`RetrySocket`](crate::RetrySocket) consults its [`RetryPolicy`] after every
//! abnormal close. The policy either schedules the reconnect for later or
//! tells the socket to give up. Anything implementing the three operations
//! (`attempt`, `reset`, `cancel`) can be plugged in: the reference
//! [`IntervalRetryPolicy`] waits a fixed interval, a backoff policy would
//! grow the delay instead.

mod interval;

pub use interval::{DEFAULT_RETRY_INTERVAL, IntervalRetryPolicy};

/// Deferred reconnect handed to [`RetryPolicy::attempt`].
pub type Proceed = Box<dyn FnOnce()>;

/// Result of asking a policy for another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// `proceed` will run once the policy's delay elapses
    Scheduled,
    /// The attempt budget is spent; `proceed` was dropped and the caller
    /// must run its give-up path
    GaveUp,
}

/// Strategy deciding whether and when to reconnect.
pub trait RetryPolicy {
    /// Request another attempt.
    ///
    /// Must not call back into the socket synchronously; give-up is
    /// reported through the returned [`AttemptOutcome`].
    fn attempt(&mut self, proceed: Proceed) -> AttemptOutcome;

    /// Forget past attempts. Does not cancel a pending timer.
    fn reset(&mut self);

    /// Cancel the pending timer, if any. Safe to call repeatedly.
    fn cancel(&mut self);

    /// Attempts made since the last reset.
    fn attempts(&self) -> u32;
}
