//! Process and async-runtime statistics.
//!
//! | gauge                | source                                 |
//! |----------------------|----------------------------------------|
//! | `ResidentMemory`     | process resident set, bytes            |
//! | `VirtualMemory`      | process virtual size, bytes            |
//! | `ProcessCPU`         | process CPU usage, percent             |
//! | `RunTime`            | process run time, seconds              |
//! | `RuntimeWorkers`     | tokio worker threads                   |
//! | `RuntimeAliveTasks`  | tokio tasks not yet finished           |
//! | `RuntimeQueueDepth`  | tokio global queue depth               |
//! | `RandomValue`        | fresh random value in `[0, 1)`         |

use async_trait::async_trait;
use rand::Rng;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::runtime::Handle;

use metrix_common::protocol::error::Result;

use super::Sampler;
use crate::memory::SharedMemory;

pub struct RuntimeSampler {
    system: System,
    pid: Option<Pid>,
}

impl RuntimeSampler {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    fn process_gauges(&mut self) -> Vec<(String, f64)> {
        let Some(pid) = self.pid else {
            return Vec::new();
        };
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory().with_cpu(),
        );
        match self.system.process(pid) {
            Some(process) => vec![
                ("ResidentMemory".to_string(), process.memory() as f64),
                ("VirtualMemory".to_string(), process.virtual_memory() as f64),
                ("ProcessCPU".to_string(), f64::from(process.cpu_usage())),
                ("RunTime".to_string(), process.run_time() as f64),
            ],
            None => Vec::new(),
        }
    }

    fn runtime_gauges() -> Vec<(String, f64)> {
        let Ok(handle) = Handle::try_current() else {
            return Vec::new();
        };
        let metrics = handle.metrics();
        vec![
            ("RuntimeWorkers".to_string(), metrics.num_workers() as f64),
            ("RuntimeAliveTasks".to_string(), metrics.num_alive_tasks() as f64),
            ("RuntimeQueueDepth".to_string(), metrics.global_queue_depth() as f64),
        ]
    }
}

impl Default for RuntimeSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sampler for RuntimeSampler {
    fn name(&self) -> &'static str {
        "runtime"
    }

    async fn sample(&mut self, memory: &SharedMemory) -> Result<()> {
        let mut gauges = self.process_gauges();
        gauges.extend(Self::runtime_gauges());
        gauges.push(("RandomValue".to_string(), rand::thread_rng().gen::<f64>()));

        let mut memory = memory.write().await;
        memory.set_gauges(gauges);
        memory.increment_poll_count();
        Ok(())
    }
}
