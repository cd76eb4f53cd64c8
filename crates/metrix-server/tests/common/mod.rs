//! Shared helpers for the server integration tests.

#![allow(dead_code)]

use metrix_common::protocol::error::Result;
use metrix_server::{MetricsServer, ServerConfig, StorageSettings};
use std::io::Read;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A running server on random local ports.
pub struct TestServer {
    pub http: SocketAddr,
    pub rpc: SocketAddr,
    pub cancel: CancellationToken,
    pub handle: JoinHandle<Result<()>>,
}

impl TestServer {
    pub async fn start(config: ServerConfig) -> Self {
        let http_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let rpc_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let http = http_listener.local_addr().unwrap();
        let rpc = rpc_listener.local_addr().unwrap();

        let server = MetricsServer::new(config).await.unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(server.serve(http_listener, rpc_listener, cancel.clone()));

        Self { http, rpc, cancel, handle }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.http, path)
    }

    pub fn rpc_url(&self) -> String {
        format!("http://{}/", self.rpc)
    }

    /// Cancels the server and waits for the final snapshot.
    pub async fn stop(self) {
        self.cancel.cancel();
        self.handle.await.unwrap().unwrap();
    }
}

/// In-memory storage, no persistence, no security.
pub fn memory_config() -> ServerConfig {
    ServerConfig {
        storage: StorageSettings::default(),
        ..ServerConfig::default()
    }
}

pub fn gunzip(data: &[u8]) -> String {
    let mut out = String::new();
    flate2::read::GzDecoder::new(data).read_to_string(&mut out).unwrap();
    out
}

/// Sends a JSON-RPC call and returns the decoded response envelope.
pub async fn rpc_call(server: &TestServer, method: &str, params: serde_json::Value) -> serde_json::Value {
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1,
    });
    reqwest::Client::new()
        .post(server.rpc_url())
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}
