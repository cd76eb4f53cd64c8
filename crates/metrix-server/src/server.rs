//! Server runtime: storage, both front-ends and the snapshot flusher under
//! one cancellation token.

use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use metrix_common::protocol::error::{MetrixError, Result};

use crate::config::ServerConfig;
use crate::http::HttpServer;
use crate::rpc::RpcServer;
use crate::state::AppState;
use crate::storage::{SnapshotFlusher, Storage};

pub struct MetricsServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl MetricsServer {
    /// Opens the configured storage (restoring the snapshot when asked to).
    pub async fn new(config: ServerConfig) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config.storage).await?);
        let state = Arc::new(AppState::new(storage, &config));
        Ok(Self { config, state })
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Binds the configured addresses and serves until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let http = bind(&self.config.address).await?;
        let rpc = bind(&self.config.rpc_address).await?;
        self.serve(http, rpc, cancel).await
    }

    /// Serves on bound listeners until `cancel` fires or a front-end fails,
    /// then stops the flusher and writes the final snapshot.
    pub async fn serve(self, http: TcpListener, rpc: TcpListener, cancel: CancellationToken) -> Result<()> {
        let storage = self.state.storage.clone();
        let flusher = self
            .config
            .storage
            .flush_target()
            .map(|(path, period)| SnapshotFlusher::new(storage.clone(), path, period).spawn(cancel.child_token()));

        let http_task = guarded(
            "HTTP",
            HttpServer::new(self.state.clone()).serve(http, cancel.clone()),
            cancel.clone(),
        );
        let rpc_task = guarded(
            "RPC",
            RpcServer::new(self.state.clone()).serve(rpc, cancel.clone()),
            cancel.clone(),
        );
        let (http_result, rpc_result) = tokio::join!(http_task, rpc_task);

        cancel.cancel();
        if let Some(handle) = flusher {
            if let Err(e) = handle.await {
                error!("Snapshot flusher panicked: {}", e);
            }
        }

        storage.shutdown(&self.config.storage).await?;
        info!("Server stopped");
        http_result.and(rpc_result)
    }
}

async fn bind(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| MetrixError::Transport(format!("Failed to bind to {}: {}", addr, e)))
}

/// Cancels the siblings when one front-end fails.
async fn guarded<F>(name: &str, server: F, cancel: CancellationToken) -> Result<()>
where
    F: std::future::Future<Output = Result<()>>,
{
    let result = server.await;
    if let Err(e) = &result {
        error!("{} server failed: {}", name, e);
        cancel.cancel();
    }
    result
}
