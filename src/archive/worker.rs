use super::service::ArchiveService;
use crate::core::{ArchiveError, ItemType, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{Level, event};

/// Shortest accepted sweep interval.
pub const MIN_WORKER_INTERVAL: Duration = Duration::from_millis(10);

/// Background worker for periodic archive garbage collection.
pub struct RetentionWorker {
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<u64>>,
}

impl RetentionWorker {
    /// Signals the worker to stop and waits for it to finish.
    ///
    /// Returns the number of completed sweep rounds.
    pub async fn stop(mut self) -> Result<u64> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        match self.join_handle.take() {
            Some(join_handle) => join_handle
                .await
                .map_err(|err| ArchiveError::Worker(format!("retention worker join: {}", err))),
            None => Ok(0),
        }
    }
}

impl Drop for RetentionWorker {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
    }
}

/// Spawns a worker that runs GC for every `item_types` entry each `every`.
///
/// The first round runs immediately. A failed sweep is logged and the loop
/// keeps going.
pub fn spawn_retention_worker(
    service: Arc<ArchiveService>,
    item_types: Vec<ItemType>,
    every: Duration,
) -> Result<RetentionWorker> {
    if item_types.is_empty() {
        return Err(ArchiveError::Worker(
            "retention worker needs at least one item type".to_string(),
        ));
    }
    let every = every.max(MIN_WORKER_INTERVAL);

    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let join_handle = tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut rounds = 0u64;

        event!(Level::INFO, interval_ms = every.as_millis() as u64, "retention worker started");
        loop {
            tokio::select! {
                _ = &mut stop_rx => {
                    event!(Level::INFO, rounds, "retention worker stopping");
                    break;
                }
                _ = ticker.tick() => {
                    for item_type in &item_types {
                        match service.run_garbage_collection(*item_type).await {
                            Ok(report) if report.total() > 0 => {
                                event!(Level::INFO, item_type = %item_type, purged = report.total(), "retention sweep purged records");
                            }
                            Ok(_) => {}
                            Err(err) => {
                                event!(Level::ERROR, item_type = %item_type, error = %err, "retention sweep failed");
                            }
                        }
                    }
                    rounds += 1;
                }
            }
        }
        rounds
    });

    Ok(RetentionWorker {
        stop_tx: Some(stop_tx),
        join_handle: Some(join_handle),
    })
}
