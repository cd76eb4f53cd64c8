//! Metrix Agent
//!
//! Samples process, runtime and host metrics into memory and pushes them to
//! a metrix server on a fixed schedule.
//!
//! # Architecture
//!
//! ```text
//! RuntimeSampler ──┐
//!                  ├──► AgentMemory ──► ReportTask ──► Dispatcher ──► Transport
//! SystemSampler ───┘                                                 (HTTP or JSON-RPC)
//! ```
//!
//! - Samplers run on the poll interval and only touch memory.
//! - The reporter snapshots memory on the report interval and hands the batch
//!   to the [`Dispatcher`](delivery::Dispatcher), which splits it across at
//!   most `rate_limit` concurrent requests.
//! - A refused connection is retried after 1s, 3s and 5s.
//! - On shutdown the agent sends one final report.
//!
//! # Example
//!
//! ```no_run
//! use metrix_agent::{Agent, AgentConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> metrix_common::Result<()> {
//! let agent = Agent::new(AgentConfig::default())?;
//! agent.run(CancellationToken::new()).await
//! # }
//! ```

pub mod agent;
pub mod collector;
pub mod config;
pub mod delivery;
pub mod memory;
pub mod transport;

pub use agent::Agent;
pub use config::{AgentConfig, AgentOptions};
pub use delivery::{DispatchReport, Dispatcher, RetryPolicy};
pub use memory::AgentMemory;
pub use transport::Transport;
