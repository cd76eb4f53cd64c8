//! Delivery
//!
//! # Architecture
//!
//! ```text
//! ReportTask (every report interval)
//!     │ snapshot of AgentMemory
//!     ▼
//! Dispatcher ── partition into <= rate_limit chunks
//!     │
//!     ├── worker ── semaphore permit ── RetryPolicy ── Transport
//!     └── worker ── semaphore permit ── RetryPolicy ── Transport
//! ```

use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use metrix_common::MetricRecord;

use crate::memory::SharedMemory;

pub mod dispatcher;
pub mod partition;
pub mod retry;

pub use dispatcher::{DispatchReport, Dispatcher};
pub use partition::partition;
pub use retry::RetryPolicy;

/// Reads the current snapshot as wire records.
pub async fn collect(memory: &SharedMemory) -> Vec<MetricRecord> {
    memory
        .read()
        .await
        .snapshot()
        .into_iter()
        .map(MetricRecord::from)
        .collect()
}

/// Sends the memory snapshot on every report tick.
///
/// The first report goes out one full period after start, once samplers
/// have had time to fill the memory.
pub struct ReportTask {
    dispatcher: Dispatcher,
    memory: SharedMemory,
    period: Duration,
}

impl ReportTask {
    pub fn new(dispatcher: Dispatcher, memory: SharedMemory, period: Duration) -> Self {
        Self {
            dispatcher,
            memory,
            period,
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run(cancel).await;
        })
    }

    async fn run(self, cancel: CancellationToken) {
        info!(
            "Reporting every {:?} with up to {} concurrent requests",
            self.period,
            self.dispatcher.rate_limit()
        );
        let mut ticker = tokio::time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let records = collect(&self.memory).await;
                    let report = tokio::select! {
                        _ = cancel.cancelled() => break,
                        report = self.dispatcher.dispatch(records) => report,
                    };
                    if report.is_clean() {
                        debug!("Report delivered in {} chunks", report.chunks);
                    } else {
                        warn!(
                            "Report incomplete: {} delivered, {} rejected, {} failed",
                            report.delivered, report.rejected, report.failed
                        );
                    }
                }
            }
        }
        debug!("Reporter stopped");
    }
}
