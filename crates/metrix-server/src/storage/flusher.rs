use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{MetricStore, Storage};

/// Periodically writes the whole store to a snapshot file, independently of
/// how often it is mutated.
pub struct SnapshotFlusher {
    storage: Arc<Storage>,
    path: PathBuf,
    period: Duration,
}

impl SnapshotFlusher {
    pub fn new(storage: Arc<Storage>, path: PathBuf, period: Duration) -> Self {
        Self {
            storage,
            path,
            period,
        }
    }

    /// Starts the flusher task; it stops when `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run(cancel).await;
        })
    }

    async fn run(self, cancel: CancellationToken) {
        info!(
            "Snapshot flusher writing {} every {:?}",
            self.path.display(),
            self.period
        );
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.flush().await,
            }
        }
        debug!("Snapshot flusher stopped");
    }

    async fn flush(&self) {
        let result = match self.storage.snapshot().await {
            Ok(snapshot) => snapshot.save(&self.path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            error!("Failed to flush snapshot to {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, Snapshot};

    async fn wait_for_counter(path: &std::path::Path, name: &str, expected: i64) {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Ok(Some(snapshot)) = Snapshot::load(path).await {
                if snapshot.counters.get(name) == Some(&expected) {
                    return;
                }
            }
            assert!(Instant::now() < deadline, "snapshot never showed {} = {}", name, expected);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn test_flushes_periodically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        let storage = Arc::new(Storage::Memory(MemoryStore::new()));
        storage.upsert_counter("PollCount", 1).await.unwrap();

        let cancel = CancellationToken::new();
        let handle = SnapshotFlusher::new(storage.clone(), path.clone(), Duration::from_millis(50))
            .spawn(cancel.clone());

        wait_for_counter(&path, "PollCount", 1).await;

        // No further request reaches the flusher; it still picks up the change.
        storage.upsert_counter("PollCount", 4).await.unwrap();
        wait_for_counter(&path, "PollCount", 5).await;

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_no_flush_before_first_period() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        let storage = Arc::new(Storage::Memory(MemoryStore::new()));
        let cancel = CancellationToken::new();
        let handle = SnapshotFlusher::new(storage, path.clone(), Duration::from_secs(3600))
            .spawn(cancel.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!path.exists());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(Storage::Memory(MemoryStore::new()));
        let cancel = CancellationToken::new();
        let handle = SnapshotFlusher::new(storage, dir.path().join("m.json"), Duration::from_secs(3600))
            .spawn(cancel.clone());
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
