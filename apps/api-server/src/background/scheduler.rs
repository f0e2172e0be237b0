//! Cron-style job scheduler using tokio-cron-scheduler.

use std::sync::Arc;

use moodwell_core::ports::Store;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Cron job scheduler wrapper.
pub struct Scheduler {
    inner: JobScheduler,
}

impl Scheduler {
    pub async fn new() -> Result<Self, JobSchedulerError> {
        let inner = JobScheduler::new().await?;
        Ok(Self { inner })
    }

    /// Add a cron job.
    ///
    /// # Example
    /// ```ignore
    /// scheduler.add_cron("0 * * * * *", || async {
    ///     tracing::info!("Running every minute");
    /// }).await?;
    /// ```
    pub async fn add_cron<F, Fut>(
        &self,
        schedule: &str,
        task: F,
    ) -> Result<uuid::Uuid, JobSchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + Clone + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let job = Job::new_async(schedule, move |_uuid, _lock| {
            let task = task.clone();
            Box::pin(async move {
                task().await;
            })
        })?;

        let id = self.inner.add(job).await?;
        tracing::info!(schedule = %schedule, job_id = %id, "Cron job registered");
        Ok(id)
    }

    pub async fn start(&self) -> Result<(), JobSchedulerError> {
        self.inner.start().await?;
        tracing::info!("Scheduler started");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), JobSchedulerError> {
        self.inner.shutdown().await?;
        tracing::info!("Scheduler stopped");
        Ok(())
    }
}

/// Register the store sweep under `cron` and start the scheduler.
pub async fn start_sweep_job(
    store: Arc<dyn Store>,
    cron: &str,
) -> Result<Scheduler, JobSchedulerError> {
    let scheduler = Scheduler::new().await?;

    scheduler
        .add_cron(cron, move || {
            let store = store.clone();
            async move {
                super::sweep_store(store.as_ref()).await;
            }
        })
        .await?;

    scheduler.start().await?;
    Ok(scheduler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use moodwell_infra::InMemoryStore;

    #[tokio::test]
    async fn test_invalid_cron_is_rejected() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        assert!(start_sweep_job(store, "not a cron").await.is_err());
    }
}
