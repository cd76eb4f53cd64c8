//! Bounded concurrent delivery.
//!
//! A batch is split into at most `rate_limit` chunks and each chunk is sent by
//! its own worker. Workers share one semaphore sized to `rate_limit`, so the
//! number of requests in flight never exceeds the limit even when reports
//! overlap.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use metrix_common::MetricRecord;

use super::partition::partition;
use super::retry::RetryPolicy;
use crate::transport::Transport;

/// Outcome of one [`Dispatcher::dispatch`] call, counted in chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub chunks: usize,
    pub delivered: usize,
    /// Chunks the server answered with a non-empty error.
    pub rejected: usize,
    /// Chunks that never got an answer.
    pub failed: usize,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.delivered == self.chunks
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    permits: Arc<Semaphore>,
    rate_limit: usize,
    retry: RetryPolicy,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, rate_limit: usize) -> Self {
        let rate_limit = rate_limit.max(1);
        Self {
            transport,
            permits: Arc::new(Semaphore::new(rate_limit)),
            rate_limit,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn rate_limit(&self) -> usize {
        self.rate_limit
    }

    /// Sends `records` and waits for every chunk to finish.
    pub async fn dispatch(&self, records: Vec<MetricRecord>) -> DispatchReport {
        let chunks = partition(&records, self.rate_limit);
        let mut report = DispatchReport {
            chunks: chunks.len(),
            ..DispatchReport::default()
        };
        if chunks.is_empty() {
            return report;
        }

        let mut workers = JoinSet::new();
        for (index, chunk) in chunks.into_iter().enumerate() {
            let transport = Arc::clone(&self.transport);
            let permits = Arc::clone(&self.permits);
            let retry = self.retry.clone();
            workers.spawn(async move {
                // the semaphore is never closed
                let _permit = permits.acquire_owned().await.ok();
                let result = retry.run(|_| transport.deliver(&chunk)).await;
                (index, chunk.len(), result)
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((index, len, Ok(ack))) if ack.is_ok() => {
                    debug!("Chunk {} delivered ({} records)", index, len);
                    report.delivered += 1;
                }
                Ok((index, _, Ok(ack))) => {
                    warn!("Chunk {} rejected by server: {}", index, ack.error);
                    report.rejected += 1;
                }
                Ok((index, len, Err(e))) => {
                    error!("Chunk {} ({} records) not delivered: {}", index, len, e);
                    report.failed += 1;
                }
                Err(e) => {
                    error!("Delivery worker panicked: {}", e);
                    report.failed += 1;
                }
            }
        }
        report
    }
}
