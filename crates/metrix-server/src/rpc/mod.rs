//! JSON-RPC Front-End
//!
//! JSON-RPC 2.0 over HTTP/1.1 on its own listener, served with hyper.
//!
//! # Architecture
//!
//! - Listens on a TCP socket and spawns a tokio task per connection
//! - Buffers the body and parses the JSON-RPC envelope
//! - Runs the [`InterceptorChain`] (subnet, logging, signature, decryption)
//! - Dispatches to the [`RpcRouter`] and returns the JSON-RPC response
//!
//! Every JSON-RPC outcome, including errors, is an HTTP `200`.
//!
//! # Example
//!
//! ```no_run
//! use metrix_server::rpc::RpcServer;
//! use metrix_server::state::AppState;
//! use metrix_server::storage::{MemoryStore, Storage};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let storage = Arc::new(Storage::Memory(MemoryStore::new()));
//!     let server = RpcServer::new(Arc::new(AppState::open(storage)));
//!     server.run("127.0.0.1:9090", CancellationToken::new()).await.unwrap();
//! }
//! ```

use http_body_util::BodyExt;
use hyper::header::HeaderValue;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use metrix_common::protocol::error::{MetrixError, Result};
use metrix_common::protocol::jsonrpc::{self, JsonRpcError};
use metrix_common::transport::http::HASH_HEADER;
use metrix_common::transport::{HttpTransport, HyperRequest, HyperResponse};

use crate::state::AppState;

pub mod interceptor;
pub mod router;

pub use interceptor::{Interceptor, InterceptorChain, RpcCall};
pub use router::RpcRouter;

struct RpcService {
    chain: InterceptorChain,
    router: RpcRouter,
}

/// JSON-RPC server.
pub struct RpcServer {
    service: Arc<RpcService>,
}

impl RpcServer {
    pub fn new(state: Arc<AppState>) -> Self {
        let service = RpcService {
            chain: InterceptorChain::standard(state.clone()),
            router: RpcRouter::new(state),
        };
        Self {
            service: Arc::new(service),
        }
    }

    /// Binds `addr` and serves until `cancel` fires.
    pub async fn run(self, addr: &str, cancel: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| MetrixError::Transport(format!("Failed to bind to {}: {}", addr, e)))?;
        self.serve(listener, cancel).await
    }

    /// Accepts connections until `cancel` fires. Connections already
    /// accepted run to completion on their own tasks.
    pub async fn serve(self, listener: TcpListener, cancel: CancellationToken) -> Result<()> {
        info!(
            "RPC server listening on {}",
            listener
                .local_addr()
                .map_err(|e| MetrixError::Transport(format!("Failed to get local address: {}", e)))?
        );

        loop {
            let (stream, peer) = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => accepted
                    .map_err(|e| MetrixError::Transport(format!("Failed to accept connection: {}", e)))?,
            };

            let io = TokioIo::new(stream);
            let service = self.service.clone();

            tokio::task::spawn(async move {
                let handler = service_fn(move |req| {
                    let service = service.clone();
                    async move { Ok::<_, std::convert::Infallible>(Self::handle_request(service, peer, req).await) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, handler).await {
                    error!("Error serving RPC connection: {}", err);
                }
            });
        }

        info!("RPC server stopped");
        Ok(())
    }

    async fn handle_request(service: Arc<RpcService>, peer: SocketAddr, req: HyperRequest) -> HyperResponse {
        if req.method() != hyper::Method::POST {
            return HttpTransport::to_http_error(
                json!(null),
                JsonRpcError::with_code(jsonrpc::INVALID_REQUEST, "Only POST requests are supported"),
            );
        }

        let (parts, body) = req.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                error!("Failed to read RPC body: {}", e);
                return HttpTransport::to_http_error(json!(null), JsonRpcError::invalid_request());
            }
        };

        let request = match HttpTransport::parse_jsonrpc(&body) {
            Ok(request) => request,
            Err(e) => {
                error!("Failed to parse JSON-RPC request: {}", e);
                return HttpTransport::to_http_error(json!(null), JsonRpcError::parse_error());
            }
        };

        let mut call = RpcCall::new(Some(peer), parts.headers, body, request);
        if let Err(e) = service.chain.run(&mut call) {
            return HttpTransport::to_http_error(call.request.id, e.to_jsonrpc());
        }

        let response_hash = call.response_hash.take();
        let reply = service.router.handle_request(call.request).await;
        let mut response = HttpTransport::to_http_response(reply);
        if let Some(value) = response_hash.and_then(|hash| HeaderValue::from_str(&hash).ok()) {
            response.headers_mut().insert(HASH_HEADER, value);
        }
        response
    }
}
