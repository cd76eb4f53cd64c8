//! Transports
//!
//! A [`Transport`] delivers one chunk of records and returns the server's
//! acknowledgement. Two implementations share the [`OutboundPipeline`]:
//!
//! - [`HttpTransport`]: `POST /updates/` with gzip, optional RSA and HMAC
//! - [`RpcTransport`]: JSON-RPC `Updates` / `CryptUpdates`
//!
//! Transport errors are classified so that only a refused connection is
//! retried by the delivery pipeline.

use async_trait::async_trait;
use std::error::Error as StdError;
use std::sync::Arc;

use metrix_common::protocol::error::{MetrixError, Result};
use metrix_common::{Ack, MetricRecord};

use crate::config::AgentConfig;

pub mod http;
pub mod pipeline;
pub mod rpc;

pub use http::HttpTransport;
pub use pipeline::{OutboundPipeline, SealedBody};
pub use rpc::RpcTransport;

#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    /// Sends one chunk. A non-empty `Ack::error` is an application-level
    /// rejection; `Err` is a delivery failure.
    async fn deliver(&self, records: &[MetricRecord]) -> Result<Ack>;
}

/// Picks the transport the configuration asks for.
pub fn build(config: &AgentConfig) -> Result<Arc<dyn Transport>> {
    let pipeline = OutboundPipeline::new(config.signer.clone(), config.encryptor.clone());
    match &config.rpc_address {
        Some(rpc_address) => Ok(Arc::new(RpcTransport::new(
            rpc_address,
            pipeline,
            config.report_interval,
        )?)),
        None => Ok(Arc::new(HttpTransport::new(
            &config.address,
            pipeline,
            config.report_interval,
        )?)),
    }
}

/// Prefixes `http://` when the address has no scheme.
pub(crate) fn base_url(address: &str) -> String {
    let trimmed = address.trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

/// Maps a client error, walking its source chain for a refused connection.
pub(crate) fn classify(error: reqwest::Error) -> MetrixError {
    let mut source: Option<&(dyn StdError + 'static)> = Some(&error);
    while let Some(current) = source {
        if let Some(io) = current.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionRefused {
                return MetrixError::ConnectionRefused(error.to_string());
            }
        }
        source = current.source();
    }
    MetrixError::Transport(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url() {
        assert_eq!(base_url("localhost:8080"), "http://localhost:8080");
        assert_eq!(base_url("http://10.0.0.1:80/"), "http://10.0.0.1:80");
    }

    #[tokio::test]
    async fn test_refused_connection_is_classified() {
        // bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let error = reqwest::Client::new()
            .post(format!("http://{}/updates/", addr))
            .send()
            .await
            .unwrap_err();
        assert!(classify(error).is_retryable());
    }

    #[test]
    fn test_build_selects_transport() {
        let http = build(&AgentConfig::default()).unwrap();
        assert_eq!(http.name(), "http");

        let rpc = build(&AgentConfig {
            rpc_address: Some("localhost:9090".into()),
            ..AgentConfig::default()
        })
        .unwrap();
        assert_eq!(rpc.name(), "rpc");
    }
}
