//! Background maintenance of the traffic-control store.

#[cfg(feature = "scheduler")]
pub mod scheduler;

use std::sync::Arc;

use moodwell_core::ports::Store;

use crate::config::SweepConfig;

/// Drop expired entries once.
pub async fn sweep_store(store: &dyn Store) {
    match store.sweep().await {
        Ok(0) => tracing::trace!("Store sweep found nothing to remove"),
        Ok(removed) => tracing::debug!(removed, "Store sweep removed expired entries"),
        Err(e) => tracing::warn!(error = %e, "Store sweep failed"),
    }
}

/// Handle to whatever runs the periodic sweep.
pub enum SweepHandle {
    #[cfg(feature = "scheduler")]
    Scheduler(scheduler::Scheduler),
    Interval(tokio::task::JoinHandle<()>),
}

impl SweepHandle {
    pub async fn shutdown(self) {
        match self {
            #[cfg(feature = "scheduler")]
            SweepHandle::Scheduler(mut scheduler) => {
                if let Err(e) = scheduler.shutdown().await {
                    tracing::warn!(error = %e, "Failed to stop scheduler");
                }
            }
            SweepHandle::Interval(handle) => handle.abort(),
        }
    }
}

/// Run the sweep on a fixed interval on the tokio runtime.
pub fn spawn_interval_sweep(store: Arc<dyn Store>, config: &SweepConfig) -> SweepHandle {
    let period = config.interval;
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sweep_store(store.as_ref()).await;
        }
    });

    tracing::info!(interval_secs = period.as_secs(), "Store sweep running on interval");
    SweepHandle::Interval(handle)
}

/// Start the periodic sweep, on the cron scheduler when it is compiled in.
#[cfg(feature = "scheduler")]
pub async fn start_sweep(store: Arc<dyn Store>, config: &SweepConfig) -> SweepHandle {
    match scheduler::start_sweep_job(store.clone(), &config.cron).await {
        Ok(scheduler) => SweepHandle::Scheduler(scheduler),
        Err(e) => {
            tracing::warn!(error = %e, cron = %config.cron, "Failed to schedule store sweep, using interval");
            spawn_interval_sweep(store, config)
        }
    }
}

#[cfg(not(feature = "scheduler"))]
pub async fn start_sweep(store: Arc<dyn Store>, config: &SweepConfig) -> SweepHandle {
    spawn_interval_sweep(store, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use moodwell_core::ports::ManualClock;
    use moodwell_infra::InMemoryStore;
    use std::time::Duration;

    #[tokio::test]
    async fn test_sweep_store_drops_expired_entries() {
        let clock = Arc::new(ManualClock::new(0));
        let store = InMemoryStore::with_clock(clock.clone());
        store.set("a", "1", Some(Duration::from_secs(1))).await.unwrap();
        store.set("b", "1", None).await.unwrap();

        clock.advance(Duration::from_secs(2));
        sweep_store(&store).await;

        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_interval_sweep_runs_periodically() {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(InMemoryStore::with_clock(clock.clone()));
        store.set("a", "1", Some(Duration::from_secs(1))).await.unwrap();
        clock.advance(Duration::from_secs(2));

        let config = SweepConfig {
            cron: "0 * * * * *".to_string(),
            interval: Duration::from_millis(20),
        };
        let handle = spawn_interval_sweep(store.clone(), &config);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(store.is_empty());

        handle.shutdown().await;
    }
}
