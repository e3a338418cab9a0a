//! Provider traits that decouple retry timing from the Tokio runtime.
//!
//! The retry timer is the only place this crate suspends, so time and task
//! spawning are the only providers needed. They are bundled behind
//! [`Providers`] to keep type parameters short:
//!
//! ```text
//! IntervalRetryPolicy<P: Providers>
//! ```
//! instead of one parameter per provider.

mod task;
mod time;

pub use task::{TaskProvider, TokioTaskProvider};
pub use time::{TimeError, TimeProvider, TokioTimeProvider};

/// Bundle of the provider types for a runtime environment.
pub trait Providers: Clone + 'static {
    /// Time provider type for sleeps and time queries.
    type Time: TimeProvider + 'static;

    /// Task provider type for spawning local tasks.
    type Task: TaskProvider + 'static;

    /// Get the time provider instance.
    fn time(&self) -> &Self::Time;

    /// Get the task provider instance.
    fn task(&self) -> &Self::Task;
}

/// Production providers using the Tokio runtime.
///
/// ```rust,ignore
/// use moonpool_reconnect::{IntervalRetryPolicy, TokioProviders};
///
/// let policy = IntervalRetryPolicy::new(TokioProviders::new(), 5, Duration::from_millis(250));
/// ```
#[derive(Clone, Debug, Default)]
pub struct TokioProviders {
    time: TokioTimeProvider,
    task: TokioTaskProvider,
}

impl TokioProviders {
    /// Create a new production providers bundle.
    pub fn new() -> Self {
        Self {
            time: TokioTimeProvider::new(),
            task: TokioTaskProvider,
        }
    }
}

impl Providers for TokioProviders {
    type Time = TokioTimeProvider;
    type Task = TokioTaskProvider;

    fn time(&self) -> &Self::Time {
        &self.time
    }

    fn task(&self) -> &Self::Task {
        &self.task
    }
}
