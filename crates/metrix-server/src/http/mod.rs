//! HTTP Front-End
//!
//! The axum router serving the metric endpoints. Every request passes the
//! inbound chain before reaching a handler:
//!
//! ```text
//! trace -> trusted subnet -> signature -> decrypt -> gzip -> handler
//! ```
//!
//! # Endpoints
//!
//! | method | path                            | body / result                      |
//! |--------|---------------------------------|------------------------------------|
//! | POST   | `/update/{kind}/{name}/{value}` | `text/plain` confirmation          |
//! | GET    | `/value/{kind}/{name}`          | value as text                      |
//! | GET    | `/`                             | HTML table of all metrics          |
//! | POST   | `/update/`                      | record in, stored record out       |
//! | POST   | `/value/`                       | query record in, full record out   |
//! | POST   | `/updates/`                     | record array in, `{"error": ""}`   |
//! | GET    | `/ping`                         | `200` if the database is reachable |
//!
//! Failures are answered with `{"error": "<message>"}` and the status from
//! `MetrixError::status_code`.

use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use metrix_common::protocol::error::{MetrixError, Result};

use crate::state::AppState;

pub mod handlers;
pub mod middleware;

pub use handlers::ApiError;

/// HTTP server for the metric endpoints.
pub struct HttpServer {
    state: Arc<AppState>,
}

impl HttpServer {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Builds the router with the full inbound chain.
    pub fn router(&self) -> Router {
        let state = self.state.clone();
        Router::new()
            .route("/", get(handlers::index))
            .route("/ping", get(handlers::ping))
            .route("/update/", post(handlers::update_json))
            .route("/updates/", post(handlers::updates))
            .route("/value/", post(handlers::value_json))
            .route("/update/:kind/:name/:value", post(handlers::update_path))
            .route("/value/:kind/:name", get(handlers::value_path))
            // innermost first
            .layer(from_fn(middleware::gzip))
            .layer(from_fn_with_state(state.clone(), middleware::decrypt))
            .layer(from_fn_with_state(state.clone(), middleware::verify_signature))
            .layer(from_fn_with_state(state.clone(), middleware::trusted_subnet))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Binds `addr` and serves until `cancel` fires.
    pub async fn run(self, addr: &str, cancel: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| MetrixError::Transport(format!("Failed to bind to {}: {}", addr, e)))?;
        self.serve(listener, cancel).await
    }

    /// Serves on an already bound listener until `cancel` fires.
    ///
    /// In-flight requests are allowed to finish.
    pub async fn serve(self, listener: TcpListener, cancel: CancellationToken) -> Result<()> {
        let local = listener
            .local_addr()
            .map_err(|e| MetrixError::Transport(format!("Failed to get local addr: {}", e)))?;
        info!("HTTP server listening on {}", local);

        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
            .map_err(|e| MetrixError::Transport(format!("HTTP server error: {}", e)))?;

        info!("HTTP server stopped");
        Ok(())
    }
}
