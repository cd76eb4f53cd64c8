//! In-memory backend.
//!
//! One mutex guards both maps. Every operation is a short critical section
//! without I/O and without `.await`, so readers never observe a half-applied
//! batch.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use metrix_common::protocol::error::{MetrixError, Result};
use metrix_common::{MetricKind, MetricRecord, MetricValue};

use super::{counter_overflow, MetricStore, Snapshot};

#[derive(Debug, Default)]
struct Maps {
    gauges: HashMap<String, f64>,
    counters: HashMap<String, i64>,
}

fn add(name: &str, total: i64, delta: i64) -> Result<i64> {
    total.checked_add(delta).ok_or_else(|| counter_overflow(name))
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    maps: Mutex<Maps>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Maps> {
        self.maps.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MetricStore for MemoryStore {
    async fn upsert_counter(&self, name: &str, delta: i64) -> Result<i64> {
        let mut maps = self.lock();
        let total = maps.counters.entry(name.to_string()).or_insert(0);
        *total = add(name, *total, delta)?;
        Ok(*total)
    }

    async fn replace_gauge(&self, name: &str, value: f64) -> Result<()> {
        self.lock().gauges.insert(name.to_string(), value);
        Ok(())
    }

    async fn counter(&self, name: &str) -> Result<i64> {
        self.lock()
            .counters
            .get(name)
            .copied()
            .ok_or_else(|| MetrixError::not_found(MetricKind::Counter, name))
    }

    async fn gauge(&self, name: &str) -> Result<f64> {
        self.lock()
            .gauges
            .get(name)
            .copied()
            .ok_or_else(|| MetrixError::not_found(MetricKind::Gauge, name))
    }

    async fn counters(&self) -> Result<BTreeMap<String, i64>> {
        Ok(self.lock().counters.iter().map(|(k, v)| (k.clone(), *v)).collect())
    }

    async fn gauges(&self) -> Result<BTreeMap<String, f64>> {
        Ok(self.lock().gauges.iter().map(|(k, v)| (k.clone(), *v)).collect())
    }

    async fn apply_batch(&self, records: &[MetricRecord]) -> Result<()> {
        let metrics = records
            .iter()
            .map(MetricRecord::validate)
            .collect::<Result<Vec<_>>>()?;

        let mut maps = self.lock();
        // counter totals are computed before anything is written
        let mut totals: HashMap<&str, i64> = HashMap::new();
        for metric in &metrics {
            if let MetricValue::Counter(delta) = metric.value {
                let current = match totals.get(metric.id.as_str()) {
                    Some(total) => *total,
                    None => maps.counters.get(&metric.id).copied().unwrap_or(0),
                };
                totals.insert(&metric.id, add(&metric.id, current, delta)?);
            }
        }

        for metric in &metrics {
            if let MetricValue::Gauge(value) = metric.value {
                maps.gauges.insert(metric.id.clone(), value);
            }
        }
        for (name, total) in totals {
            maps.counters.insert(name.to_string(), total);
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        Err(MetrixError::Unsupported("in-memory storage has no database".into()))
    }

    async fn snapshot(&self) -> Result<Snapshot> {
        let maps = self.lock();
        Ok(Snapshot {
            gauges: maps.gauges.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            counters: maps.counters.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        })
    }

    /// Replaces the whole contents with the snapshot.
    async fn restore(&self, snapshot: Snapshot) -> Result<()> {
        let mut maps = self.lock();
        maps.gauges = snapshot.gauges.into_iter().collect();
        maps.counters = snapshot.counters.into_iter().collect();
        Ok(())
    }
}
