//! Metrix Server
//!
//! Receives metric batches from agents and serves them back over two
//! front-ends sharing one storage backend.
//!
//! # Architecture
//!
//! ```text
//!              +---------------------+      +----------------------+
//!   agents --> | HTTP (axum)         | ---> |                      |
//!              | subnet/sign/crypt/gz|      |  Storage             |
//!              +---------------------+      |  memory | persistent |
//!              +---------------------+      |  | sql (SQLite)      |
//!   agents --> | JSON-RPC (hyper)    | ---> |                      |
//!              | interceptor chain   |      +----------------------+
//!              +---------------------+               |
//!                                          snapshot flusher / final flush
//! ```
//!
//! - **[`config`]**: layered configuration (defaults, file, flags, env)
//! - **[`storage`]**: the [`MetricStore`](storage::MetricStore) backends
//! - **[`http`]**: REST-style endpoints and the inbound middleware
//! - **[`rpc`]**: JSON-RPC endpoint and its interceptor chain
//! - **[`server`]**: runs everything under one cancellation token

pub mod config;
pub mod http;
pub mod rpc;
pub mod server;
pub mod state;
pub mod storage;

pub use config::{ServerConfig, ServerOptions};
pub use server::MetricsServer;
pub use state::AppState;
pub use storage::{MetricStore, Storage, StorageSettings};
