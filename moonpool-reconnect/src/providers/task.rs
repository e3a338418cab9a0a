//! Task spawning abstraction for single-threaded environments.

use std::future::Future;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Provider for spawning local tasks.
///
/// Everything in this crate is `!Send` and runs on one thread, so tasks are
/// spawned onto the current `LocalSet`.
pub trait TaskProvider: Clone {
    /// Spawn a named task that runs on the current thread.
    fn spawn_task<F>(&self, name: &str, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + 'static;
}

/// Tokio-based task provider using `spawn_local`.
///
/// Must be used from within a [`tokio::task::LocalSet`].
#[derive(Clone, Debug, Default)]
pub struct TokioTaskProvider;

impl TaskProvider for TokioTaskProvider {
    fn spawn_task<F>(&self, name: &str, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + 'static,
    {
        let span = tracing::trace_span!("task", name = %name);
        tokio::task::spawn_local(
            async move {
                tracing::trace!("task starting");
                future.await;
                tracing::trace!("task completed");
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[tokio::test]
    async fn test_spawned_task_runs_on_local_set() {
        let ran = Rc::new(Cell::new(false));
        let local = tokio::task::LocalSet::new();

        let flag = ran.clone();
        local
            .run_until(async move {
                let handle = TokioTaskProvider.spawn_task("flag", async move {
                    flag.set(true);
                });
                handle.await.unwrap();
            })
            .await;

        assert!(ran.get());
    }

    #[tokio::test]
    async fn test_aborted_task_never_runs() {
        let ran = Rc::new(Cell::new(false));
        let local = tokio::task::LocalSet::new();

        let flag = ran.clone();
        local
            .run_until(async move {
                let handle = TokioTaskProvider.spawn_task("aborted", async move {
                    flag.set(true);
                });
                handle.abort();
                assert!(handle.await.unwrap_err().is_cancelled());
            })
            .await;

        assert!(!ran.get());
    }
}
