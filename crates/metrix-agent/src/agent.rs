use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use metrix_common::protocol::error::Result;

use crate::collector::{RuntimeSampler, SamplerTask, SystemSampler};
use crate::config::AgentConfig;
use crate::delivery::{self, DispatchReport, Dispatcher, ReportTask};
use crate::memory::{self, SharedMemory};
use crate::transport::{self, Transport};

/// The metrics agent: two samplers and one reporter around a shared memory.
pub struct Agent {
    config: AgentConfig,
    memory: SharedMemory,
    dispatcher: Dispatcher,
}

impl Agent {
    pub fn new(config: AgentConfig) -> Result<Self> {
        let transport = transport::build(&config)?;
        Ok(Self::with_transport(config, transport))
    }

    pub fn with_transport(config: AgentConfig, transport: Arc<dyn Transport>) -> Self {
        let dispatcher = Dispatcher::new(transport, config.rate_limit);
        Self {
            config,
            memory: memory::shared(),
            dispatcher,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn memory(&self) -> SharedMemory {
        Arc::clone(&self.memory)
    }

    /// Sends the current snapshot once.
    pub async fn flush(&self) -> DispatchReport {
        let records = delivery::collect(&self.memory).await;
        self.dispatcher.dispatch(records).await
    }

    /// Runs until `cancel` fires, then makes one last bounded flush.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        info!(
            "Agent reporting to {} over {}",
            self.config.rpc_address.as_deref().unwrap_or(&self.config.address),
            if self.config.rpc_address.is_some() { "JSON-RPC" } else { "HTTP" },
        );

        let tasks = vec![
            SamplerTask::new(Box::new(RuntimeSampler::new()), self.memory(), self.config.poll_interval)
                .spawn(cancel.child_token()),
            SamplerTask::new(Box::new(SystemSampler::new()), self.memory(), self.config.poll_interval)
                .spawn(cancel.child_token()),
            ReportTask::new(self.dispatcher.clone(), self.memory(), self.config.report_interval)
                .spawn(cancel.child_token()),
        ];

        cancel.cancelled().await;
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Agent task ended abnormally: {}", e);
            }
        }

        info!("Sending final report");
        match tokio::time::timeout(self.config.report_interval, self.flush()).await {
            Ok(report) if report.is_clean() => info!("Final report delivered"),
            Ok(report) => warn!(
                "Final report incomplete: {} delivered, {} rejected, {} failed",
                report.delivered, report.rejected, report.failed
            ),
            Err(_) => warn!("Final report timed out after {:?}", self.config.report_interval),
        }
        Ok(())
    }
}
