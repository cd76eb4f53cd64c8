//! Sampled values shared by the samplers and the sender.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use metrix_common::Metric;

/// Name of the single counter the agent reports.
pub const POLL_COUNT: &str = "PollCount";

/// Latest gauge values plus the running poll counter.
#[derive(Debug, Default)]
pub struct AgentMemory {
    gauges: HashMap<String, f64>,
    poll_count: i64,
}

pub type SharedMemory = Arc<RwLock<AgentMemory>>;

pub fn shared() -> SharedMemory {
    Arc::new(RwLock::new(AgentMemory::default()))
}

impl AgentMemory {
    pub fn set_gauge(&mut self, name: impl Into<String>, value: f64) {
        self.gauges.insert(name.into(), value);
    }

    pub fn set_gauges(&mut self, values: impl IntoIterator<Item = (String, f64)>) {
        self.gauges.extend(values);
    }

    pub fn gauge(&self, name: &str) -> Option<f64> {
        self.gauges.get(name).copied()
    }

    pub fn increment_poll_count(&mut self) {
        self.poll_count = self.poll_count.wrapping_add(1);
    }

    pub fn poll_count(&self) -> i64 {
        self.poll_count
    }

    /// All gauges sorted by name, followed by `PollCount`.
    ///
    /// `PollCount` carries the running total; the server adds it to its
    /// counter on every report.
    pub fn snapshot(&self) -> Vec<Metric> {
        let mut metrics: Vec<Metric> = self
            .gauges
            .iter()
            .map(|(name, value)| Metric::gauge(name.clone(), *value))
            .collect();
        metrics.sort_by(|a, b| a.id.cmp(&b.id));
        metrics.push(Metric::counter(POLL_COUNT, self.poll_count));
        metrics
    }
}
