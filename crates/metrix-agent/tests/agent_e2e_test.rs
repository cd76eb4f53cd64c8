//! Agent against a live server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use metrix_agent::{Agent, AgentConfig};
use metrix_common::security::{keys, Decryptor, Encryptor, Signer, TrustedSubnet};
use metrix_server::storage::MetricStore;
use metrix_server::{AppState, MetricsServer, ServerConfig, StorageSettings};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Running {
    http: SocketAddr,
    rpc: SocketAddr,
    state: Arc<AppState>,
    cancel: CancellationToken,
    handle: JoinHandle<metrix_common::Result<()>>,
}

impl Running {
    async fn stop(self) {
        self.cancel.cancel();
        self.handle.await.unwrap().unwrap();
    }
}

async fn serve_on(http_listener: TcpListener, config: ServerConfig) -> Running {
    let rpc_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let http = http_listener.local_addr().unwrap();
    let rpc = rpc_listener.local_addr().unwrap();

    let server = MetricsServer::new(config).await.unwrap();
    let state = server.state();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(server.serve(http_listener, rpc_listener, cancel.clone()));
    Running {
        http,
        rpc,
        state,
        cancel,
        handle,
    }
}

async fn serve(config: ServerConfig) -> Running {
    serve_on(TcpListener::bind("127.0.0.1:0").await.unwrap(), config).await
}

fn memory_config() -> ServerConfig {
    ServerConfig {
        storage: StorageSettings::default(),
        ..ServerConfig::default()
    }
}

async fn seed(agent: &Agent) {
    let memory = agent.memory();
    let mut guard = memory.write().await;
    guard.set_gauge("Alloc", 1024.5);
    guard.set_gauge("HeapObjects", 7.0);
    guard.increment_poll_count();
    guard.increment_poll_count();
}

#[tokio::test]
async fn test_http_delivery() {
    let server = serve(memory_config()).await;
    let agent = Agent::new(AgentConfig {
        address: server.http.to_string(),
        ..AgentConfig::default()
    })
    .unwrap();
    seed(&agent).await;

    let report = agent.flush().await;
    assert!(report.is_clean(), "{:?}", report);

    let storage = &server.state.storage;
    assert_eq!(storage.gauge("Alloc").await.unwrap(), 1024.5);
    assert_eq!(storage.gauge("HeapObjects").await.unwrap(), 7.0);
    assert_eq!(storage.counter("PollCount").await.unwrap(), 2);

    // PollCount is sent as the running total, so a second report adds it again
    agent.flush().await;
    assert_eq!(storage.counter("PollCount").await.unwrap(), 4);

    server.stop().await;
}

#[tokio::test]
async fn test_http_delivery_with_full_security() {
    let (private, public) = keys::generate(2048).unwrap();
    let server = serve(ServerConfig {
        signer: Some(Signer::new("secret").unwrap()),
        decryptor: Some(Decryptor::new(private)),
        trusted_subnet: Some(TrustedSubnet::parse("127.0.0.0/8").unwrap()),
        ..memory_config()
    })
    .await;

    let agent = Agent::new(AgentConfig {
        address: server.http.to_string(),
        rate_limit: 3,
        signer: Some(Signer::new("secret").unwrap()),
        encryptor: Some(Encryptor::new(public)),
        ..AgentConfig::default()
    })
    .unwrap();
    seed(&agent).await;

    let report = agent.flush().await;
    assert_eq!(report.chunks, 3);
    assert!(report.is_clean(), "{:?}", report);
    assert_eq!(server.state.storage.counter("PollCount").await.unwrap(), 2);

    server.stop().await;
}

#[tokio::test]
async fn test_wrong_key_is_rejected() {
    let server = serve(ServerConfig {
        signer: Some(Signer::new("secret").unwrap()),
        ..memory_config()
    })
    .await;

    let agent = Agent::new(AgentConfig {
        address: server.http.to_string(),
        signer: Some(Signer::new("guess").unwrap()),
        ..AgentConfig::default()
    })
    .unwrap();
    seed(&agent).await;

    let report = agent.flush().await;
    assert_eq!(report.rejected, report.chunks);
    assert!(server.state.storage.counter("PollCount").await.is_err());

    server.stop().await;
}

#[tokio::test]
async fn test_rpc_delivery_encrypted() {
    let (private, public) = keys::generate(2048).unwrap();
    let server = serve(ServerConfig {
        signer: Some(Signer::new("secret").unwrap()),
        decryptor: Some(Decryptor::new(private)),
        ..memory_config()
    })
    .await;

    let agent = Agent::new(AgentConfig {
        rpc_address: Some(server.rpc.to_string()),
        signer: Some(Signer::new("secret").unwrap()),
        encryptor: Some(Encryptor::new(public)),
        ..AgentConfig::default()
    })
    .unwrap();
    seed(&agent).await;

    let report = agent.flush().await;
    assert!(report.is_clean(), "{:?}", report);
    assert_eq!(server.state.storage.gauge("Alloc").await.unwrap(), 1024.5);
    assert_eq!(server.state.storage.counter("PollCount").await.unwrap(), 2);

    server.stop().await;
}

#[tokio::test]
async fn test_retries_until_server_starts() {
    let reserved = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = reserved.local_addr().unwrap();
    drop(reserved);

    let agent = Agent::new(AgentConfig {
        address: addr.to_string(),
        rate_limit: 1,
        ..AgentConfig::default()
    })
    .unwrap();
    seed(&agent).await;

    let late = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        serve_on(TcpListener::bind(addr).await.unwrap(), memory_config()).await
    });

    let report = agent.flush().await;
    let server = late.await.unwrap();
    assert!(report.is_clean(), "{:?}", report);
    assert_eq!(server.state.storage.counter("PollCount").await.unwrap(), 2);

    server.stop().await;
}

#[tokio::test]
async fn test_run_reports_and_flushes_on_shutdown() {
    let server = serve(memory_config()).await;
    let agent = Agent::new(AgentConfig {
        address: server.http.to_string(),
        poll_interval: Duration::from_millis(50),
        report_interval: Duration::from_secs(30),
        ..AgentConfig::default()
    })
    .unwrap();

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(agent.run(cancel.clone()));
    tokio::time::sleep(Duration::from_millis(400)).await;
    cancel.cancel();
    handle.await.unwrap().unwrap();

    // nothing was due before shutdown; the final report carries everything
    let storage = &server.state.storage;
    assert!(storage.counter("PollCount").await.unwrap() > 0);
    assert!(storage.gauge("RandomValue").await.is_ok());

    server.stop().await;
}
