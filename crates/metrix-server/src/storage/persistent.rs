//! Synchronous persistence.
//!
//! [`PersistentStore`] decorates any [`MetricStore`]: reads pass through,
//! and every successful mutation is followed by a full snapshot write before
//! the call returns. The write mutex orders snapshot writes so the file
//! always ends up holding the latest state.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use metrix_common::protocol::error::Result;
use metrix_common::MetricRecord;

use super::{MetricStore, Snapshot};

pub struct PersistentStore<S> {
    inner: S,
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl<S: MetricStore> PersistentStore<S> {
    pub fn new(inner: S, path: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let snapshot = self.inner.snapshot().await?;
        snapshot.save(&self.path).await
    }
}

#[async_trait]
impl<S: MetricStore> MetricStore for PersistentStore<S> {
    async fn upsert_counter(&self, name: &str, delta: i64) -> Result<i64> {
        let total = self.inner.upsert_counter(name, delta).await?;
        self.persist().await?;
        Ok(total)
    }

    async fn replace_gauge(&self, name: &str, value: f64) -> Result<()> {
        self.inner.replace_gauge(name, value).await?;
        self.persist().await
    }

    async fn counter(&self, name: &str) -> Result<i64> {
        self.inner.counter(name).await
    }

    async fn gauge(&self, name: &str) -> Result<f64> {
        self.inner.gauge(name).await
    }

    async fn counters(&self) -> Result<BTreeMap<String, i64>> {
        self.inner.counters().await
    }

    async fn gauges(&self) -> Result<BTreeMap<String, f64>> {
        self.inner.gauges().await
    }

    async fn apply_batch(&self, records: &[MetricRecord]) -> Result<()> {
        self.inner.apply_batch(records).await?;
        self.persist().await
    }

    async fn health_check(&self) -> Result<()> {
        self.inner.health_check().await
    }

    async fn snapshot(&self) -> Result<Snapshot> {
        self.inner.snapshot().await
    }

    async fn restore(&self, snapshot: Snapshot) -> Result<()> {
        self.inner.restore(snapshot).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use metrix_common::{Metric, MetricKind};

    #[tokio::test]
    async fn test_every_mutation_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        let store = PersistentStore::new(MemoryStore::new(), &path);

        store.upsert_counter("PollCount", 2).await.unwrap();
        let on_disk = Snapshot::load(&path).await.unwrap().unwrap();
        assert_eq!(on_disk.counters["PollCount"], 2);

        store.replace_gauge("Alloc", 9.5).await.unwrap();
        let on_disk = Snapshot::load(&path).await.unwrap().unwrap();
        assert_eq!(on_disk.gauges["Alloc"], 9.5);

        store
            .apply_batch(&[Metric::counter("PollCount", 3).into()])
            .await
            .unwrap();
        let on_disk = Snapshot::load(&path).await.unwrap().unwrap();
        assert_eq!(on_disk.counters["PollCount"], 5);
    }

    #[tokio::test]
    async fn test_reads_do_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        let store = PersistentStore::new(MemoryStore::new(), &path);

        assert!(store.gauge("Alloc").await.is_err());
        store.gauges().await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_failed_batch_is_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        let store = PersistentStore::new(MemoryStore::new(), &path);

        let invalid = MetricRecord::query(MetricKind::Counter, "broken");
        assert!(store.apply_batch(&[invalid]).await.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        {
            let store = PersistentStore::new(MemoryStore::new(), &path);
            store.upsert_counter("PollCount", 7).await.unwrap();
            store.replace_gauge("Alloc", 1.25).await.unwrap();
        }

        let restarted = MemoryStore::new();
        restarted
            .restore(Snapshot::load(&path).await.unwrap().unwrap())
            .await
            .unwrap();
        assert_eq!(restarted.counter("PollCount").await.unwrap(), 7);
        assert_eq!(restarted.gauge("Alloc").await.unwrap(), 1.25);
    }
}
