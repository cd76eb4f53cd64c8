//! Samplers
//!
//! Each sampler reads one source of values and writes them into the shared
//! [`AgentMemory`](crate::memory::AgentMemory). Sampling happens outside the
//! lock; the write lock is only held to store the results.
//!
//! - [`RuntimeSampler`]: process and async-runtime statistics, `RandomValue`,
//!   and the `PollCount` increment
//! - [`SystemSampler`]: per-core CPU utilization and host memory
//!
//! Both run as [`SamplerTask`]s on the poll interval.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use metrix_common::protocol::error::Result;

use crate::memory::SharedMemory;

pub mod runtime;
pub mod system;

pub use runtime::RuntimeSampler;
pub use system::SystemSampler;

#[async_trait]
pub trait Sampler: Send {
    fn name(&self) -> &'static str;

    /// Takes one sample and stores it. On error nothing is written.
    async fn sample(&mut self, memory: &SharedMemory) -> Result<()>;
}

/// Runs a sampler on a fixed period until cancelled.
pub struct SamplerTask {
    sampler: Box<dyn Sampler>,
    memory: SharedMemory,
    period: Duration,
}

impl SamplerTask {
    pub fn new(sampler: Box<dyn Sampler>, memory: SharedMemory, period: Duration) -> Self {
        Self {
            sampler,
            memory,
            period,
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run(cancel).await;
        })
    }

    async fn run(mut self, cancel: CancellationToken) {
        info!("{} sampler polling every {:?}", self.sampler.name(), self.period);
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.sampler.sample(&self.memory).await {
                        warn!("{} sampler failed: {}", self.sampler.name(), e);
                    }
                }
            }
        }
        debug!("{} sampler stopped", self.sampler.name());
    }
}
