//! Supervised background revalidation.
//!
//! Refresh tasks are detached from the request that scheduled them: the
//! foreground response never waits on them, and their failures (errors and
//! panics alike) end here as log lines and counters.

use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::FutureExt;
use uuid::Uuid;

/// Revalidation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RevalidationStats {
    pub scheduled: usize,
    pub completed: usize,
    pub failed: usize,
    pub in_flight: usize,
}

#[derive(Default)]
struct Counters {
    scheduled: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    in_flight: AtomicUsize,
}

/// Runs refresh tasks on the current thread's local task set.
///
/// Tasks are `!Send` (they hold request state from the web framework), so
/// `submit` must be called from inside a `tokio::task::LocalSet`, which
/// every actix-web worker provides. There is no cancellation and no
/// per-key deduplication: two refreshes of one key may overlap, and the
/// last write wins.
#[derive(Clone, Default)]
pub struct Revalidator {
    counters: Arc<Counters>,
}

impl Revalidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detach `task` as the refresh of `key`. Returns the job id used in logs.
    pub fn submit<F, E>(&self, key: impl Into<String>, task: F) -> Uuid
    where
        F: Future<Output = Result<(), E>> + 'static,
        E: Display + 'static,
    {
        let key = key.into();
        let job_id = Uuid::new_v4();
        let counters = self.counters.clone();

        counters.scheduled.fetch_add(1, Ordering::Relaxed);
        counters.in_flight.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(job_id = %job_id, key = %key, "Revalidation scheduled");

        tokio::task::spawn_local(async move {
            let outcome = AssertUnwindSafe(task).catch_unwind().await;
            counters.in_flight.fetch_sub(1, Ordering::Relaxed);

            match outcome {
                Ok(Ok(())) => {
                    counters.completed.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(job_id = %job_id, key = %key, "Revalidation completed");
                }
                Ok(Err(e)) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(job_id = %job_id, key = %key, error = %e, "Revalidation failed");
                }
                Err(_) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(job_id = %job_id, key = %key, "Revalidation panicked");
                }
            }
        });

        job_id
    }

    pub fn stats(&self) -> RevalidationStats {
        RevalidationStats {
            scheduled: self.counters.scheduled.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            in_flight: self.counters.in_flight.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use tokio::task::LocalSet;

    async fn drain() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_successful_task_is_counted() {
        let local = LocalSet::new();
        let revalidator = Revalidator::new();
        let ran = Rc::new(Cell::new(false));

        local
            .run_until({
                let ran = ran.clone();
                let revalidator = revalidator.clone();
                async move {
                    revalidator.submit("cache:GET:/api/config", async move {
                        ran.set(true);
                        Ok::<_, String>(())
                    });
                    drain().await;
                }
            })
            .await;

        assert!(ran.get());
        assert_eq!(
            revalidator.stats(),
            RevalidationStats {
                scheduled: 1,
                completed: 1,
                failed: 0,
                in_flight: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_errors_and_panics_are_contained() {
        let local = LocalSet::new();
        let revalidator = Revalidator::new();

        local
            .run_until({
                let revalidator = revalidator.clone();
                async move {
                    revalidator.submit("a", async { Err::<(), _>("downstream returned 500") });
                    revalidator.submit("b", async {
                        if true {
                            panic!("handler blew up");
                        }
                        Ok::<_, String>(())
                    });
                    drain().await;
                }
            })
            .await;

        let stats = revalidator.stats();
        assert_eq!(stats.scheduled, 2);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test]
    async fn test_submit_does_not_wait_for_task() {
        let local = LocalSet::new();
        let revalidator = Revalidator::new();

        local
            .run_until({
                let revalidator = revalidator.clone();
                async move {
                    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
                    revalidator.submit("slow", async move {
                        rx.await.map_err(|e| e.to_string())
                    });
                    assert_eq!(revalidator.stats().in_flight, 1);

                    tx.send(()).unwrap();
                    drain().await;
                    assert_eq!(revalidator.stats().completed, 1);
                }
            })
            .await;
    }
}
