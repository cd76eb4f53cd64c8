//! Host CPU and memory.
//!
//! CPU usage is a difference between two refreshes, so every sample waits
//! `sysinfo::MINIMUM_CPU_UPDATE_INTERVAL` between them. Cores are reported
//! as `CPUutilization1..N`, plus `TotalMemory` and `FreeMemory` in bytes.

use async_trait::async_trait;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};

use metrix_common::protocol::error::{MetrixError, Result};

use super::Sampler;
use crate::memory::SharedMemory;

pub const CPU_GAUGE_PREFIX: &str = "CPUutilization";

pub struct SystemSampler {
    system: System,
}

impl SystemSampler {
    pub fn new() -> Self {
        let refresh = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::nothing().with_cpu_usage())
            .with_memory(MemoryRefreshKind::nothing().with_ram());
        Self {
            system: System::new_with_specifics(refresh),
        }
    }

    async fn read(&mut self) -> Result<Vec<(String, f64)>> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(MetrixError::Unsupported(format!(
                "host statistics on {}",
                std::env::consts::OS
            )));
        }

        self.system.refresh_cpu_usage();
        tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();

        let mut gauges: Vec<(String, f64)> = self
            .system
            .cpus()
            .iter()
            .enumerate()
            .map(|(i, cpu)| (format!("{}{}", CPU_GAUGE_PREFIX, i + 1), f64::from(cpu.cpu_usage())))
            .collect();
        if gauges.is_empty() {
            return Err(MetrixError::Unsupported("no CPUs reported".into()));
        }
        gauges.push(("TotalMemory".to_string(), self.system.total_memory() as f64));
        gauges.push(("FreeMemory".to_string(), self.system.free_memory() as f64));
        Ok(gauges)
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sampler for SystemSampler {
    fn name(&self) -> &'static str {
        "system"
    }

    async fn sample(&mut self, memory: &SharedMemory) -> Result<()> {
        let gauges = self.read().await?;
        memory.write().await.set_gauges(gauges);
        Ok(())
    }
}
