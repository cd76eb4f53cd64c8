//! Storage Engine
//!
//! All backends implement [`MetricStore`], so the HTTP and RPC front-ends
//! never know which one is active.
//!
//! # Backends
//!
//! - **[`MemoryStore`]**: two maps behind one mutex
//! - **[`PersistentStore`]**: wraps another store and writes a snapshot file
//!   after every successful mutation (synchronous persistence)
//! - **[`SqlStore`]**: SQLite through `sqlx`, transactional batches
//!
//! Interval persistence is not a backend of its own: it is a
//! [`SnapshotFlusher`] task ticking next to a `MemoryStore`.
//!
//! # Selection
//!
//! [`Storage::open`] picks exactly one backend from [`StorageSettings`]:
//!
//! ```text
//! database DSN set                   -> Sql
//! store file set and interval == 0   -> Persistent(Memory)
//! otherwise                          -> Memory (+ flusher if a file is set)
//! ```

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use metrix_common::protocol::error::{MetrixError, Result};
use metrix_common::{Metric, MetricKind, MetricRecord, MetricValue};

pub mod flusher;
pub mod memory;
pub mod migrations;
pub mod persistent;
pub mod snapshot;
pub mod sql;

pub use flusher::SnapshotFlusher;
pub use memory::MemoryStore;
pub use persistent::PersistentStore;
pub use snapshot::Snapshot;
pub use sql::SqlStore;

/// Capabilities every storage backend provides.
///
/// Gauges and counters are independent namespaces. Absent names are
/// reported as `MetrixError::NotFound`.
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Adds `delta` to the named counter, creating it at zero first if absent.
    ///
    /// Returns the new total. A total that would leave the `i64` range is a
    /// `Storage` error and the counter keeps its old value.
    async fn upsert_counter(&self, name: &str, delta: i64) -> Result<i64>;

    /// Sets the named gauge, creating it if absent.
    async fn replace_gauge(&self, name: &str, value: f64) -> Result<()>;

    async fn counter(&self, name: &str) -> Result<i64>;

    async fn gauge(&self, name: &str) -> Result<f64>;

    /// Independent copy of all counters, sorted by name.
    async fn counters(&self) -> Result<BTreeMap<String, i64>>;

    /// Independent copy of all gauges, sorted by name.
    async fn gauges(&self) -> Result<BTreeMap<String, f64>>;

    /// Validates and applies a batch. A batch that fails leaves the store
    /// unchanged.
    async fn apply_batch(&self, records: &[MetricRecord]) -> Result<()>;

    /// Checks the backing database; `Unsupported` for backends without one.
    async fn health_check(&self) -> Result<()>;

    /// Applies one validated metric and returns the stored state.
    ///
    /// For counters the returned value is the accumulated total.
    async fn apply(&self, metric: Metric) -> Result<Metric> {
        match metric.value {
            MetricValue::Counter(delta) => {
                let total = self.upsert_counter(&metric.id, delta).await?;
                Ok(Metric::counter(metric.id, total))
            }
            MetricValue::Gauge(value) => {
                self.replace_gauge(&metric.id, value).await?;
                Ok(metric)
            }
        }
    }

    /// Reads one metric by kind and name.
    async fn get(&self, kind: MetricKind, name: &str) -> Result<Metric> {
        match kind {
            MetricKind::Counter => Ok(Metric::counter(name, self.counter(name).await?)),
            MetricKind::Gauge => Ok(Metric::gauge(name, self.gauge(name).await?)),
        }
    }

    async fn snapshot(&self) -> Result<Snapshot> {
        Ok(Snapshot {
            gauges: self.gauges().await?,
            counters: self.counters().await?,
        })
    }

    /// Loads a snapshot into an empty store.
    async fn restore(&self, snapshot: Snapshot) -> Result<()> {
        self.apply_batch(&snapshot.into_records()).await
    }
}

fn counter_overflow(name: &str) -> MetrixError {
    MetrixError::Storage(format!("counter {name} overflows a 64-bit total"))
}

/// Storage selection inputs, resolved from the server configuration.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub database_dsn: Option<String>,
    pub store_file: Option<PathBuf>,
    pub store_interval: Duration,
    pub restore: bool,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_dsn: None,
            store_file: None,
            store_interval: Duration::from_secs(300),
            restore: false,
        }
    }
}

impl StorageSettings {
    /// File the interval flusher writes to, if interval persistence applies.
    pub fn flush_target(&self) -> Option<(PathBuf, Duration)> {
        if self.database_dsn.is_some() || self.store_interval.is_zero() {
            return None;
        }
        self.store_file.clone().map(|path| (path, self.store_interval))
    }

    /// File to write on shutdown; never for the relational backend.
    pub fn shutdown_target(&self) -> Option<&PathBuf> {
        if self.database_dsn.is_some() {
            return None;
        }
        self.store_file.as_ref()
    }
}

/// The single backend chosen at startup.
pub enum Storage {
    Memory(MemoryStore),
    Persistent(PersistentStore<MemoryStore>),
    Sql(SqlStore),
}

impl Storage {
    /// Builds the backend selected by `settings` and restores the snapshot
    /// when asked to. A missing or corrupt snapshot starts empty.
    pub async fn open(settings: &StorageSettings) -> Result<Self> {
        if let Some(dsn) = &settings.database_dsn {
            info!("Using relational storage");
            return Ok(Storage::Sql(SqlStore::connect(dsn).await?));
        }

        let memory = MemoryStore::new();
        if let (true, Some(path)) = (settings.restore, &settings.store_file) {
            match Snapshot::load(path).await {
                Ok(Some(snapshot)) => {
                    info!(
                        "Restored {} gauges and {} counters from {}",
                        snapshot.gauges.len(),
                        snapshot.counters.len(),
                        path.display()
                    );
                    memory.restore(snapshot).await?;
                }
                Ok(None) => info!("No snapshot at {}, starting empty", path.display()),
                Err(e) => warn!("Ignoring unreadable snapshot {}: {}", path.display(), e),
            }
        }

        match &settings.store_file {
            Some(path) if settings.store_interval.is_zero() => {
                info!("Using in-memory storage with synchronous persistence to {}", path.display());
                Ok(Storage::Persistent(PersistentStore::new(memory, path.clone())))
            }
            Some(path) => {
                info!(
                    "Using in-memory storage flushed to {} every {:?}",
                    path.display(),
                    settings.store_interval
                );
                Ok(Storage::Memory(memory))
            }
            None => {
                info!("Using in-memory storage without persistence");
                Ok(Storage::Memory(memory))
            }
        }
    }

    fn backend(&self) -> &dyn MetricStore {
        match self {
            Storage::Memory(store) => store,
            Storage::Persistent(store) => store,
            Storage::Sql(store) => store,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Storage::Memory(_) => "memory",
            Storage::Persistent(_) => "persistent",
            Storage::Sql(_) => "sql",
        }
    }

    /// Writes the final snapshot on shutdown.
    pub async fn shutdown(&self, settings: &StorageSettings) -> Result<()> {
        if let Some(path) = settings.shutdown_target() {
            let snapshot = self.snapshot().await?;
            snapshot.save(path).await?;
            info!("Wrote final snapshot to {}", path.display());
        }
        if let Storage::Sql(store) = self {
            store.close().await;
        }
        Ok(())
    }
}

#[async_trait]
impl MetricStore for Storage {
    async fn upsert_counter(&self, name: &str, delta: i64) -> Result<i64> {
        self.backend().upsert_counter(name, delta).await
    }

    async fn replace_gauge(&self, name: &str, value: f64) -> Result<()> {
        self.backend().replace_gauge(name, value).await
    }

    async fn counter(&self, name: &str) -> Result<i64> {
        self.backend().counter(name).await
    }

    async fn gauge(&self, name: &str) -> Result<f64> {
        self.backend().gauge(name).await
    }

    async fn counters(&self) -> Result<BTreeMap<String, i64>> {
        self.backend().counters().await
    }

    async fn gauges(&self) -> Result<BTreeMap<String, f64>> {
        self.backend().gauges().await
    }

    async fn apply_batch(&self, records: &[MetricRecord]) -> Result<()> {
        self.backend().apply_batch(records).await
    }

    async fn health_check(&self) -> Result<()> {
        self.backend().health_check().await
    }

    async fn snapshot(&self) -> Result<Snapshot> {
        self.backend().snapshot().await
    }
}
