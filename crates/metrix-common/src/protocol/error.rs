//! Error type shared by every metrix crate.
//!
//! [`MetrixError`] maps to an HTTP status through `status_code` and to a
//! JSON-RPC error object through `to_jsonrpc`, so both front-ends report a
//! failure the same way.

use hyper::StatusCode;
use thiserror::Error;

use super::jsonrpc::{self, JsonRpcError};
use super::metric::MetricKind;

#[derive(Error, Debug)]
pub enum MetrixError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{kind} metric {name:?} not found")]
    NotFound { kind: MetricKind, name: String },

    #[error("Signature mismatch")]
    Signature,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Method is not implemented: {0}")]
    Unsupported(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),
}

impl MetrixError {
    /// Convenience constructor for a missing metric.
    pub fn not_found(kind: MetricKind, name: impl Into<String>) -> Self {
        MetrixError::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// HTTP status used when this error terminates an HTTP request.
    pub fn status_code(&self) -> StatusCode {
        match self {
            MetrixError::Validation(_)
            | MetrixError::JsonSerialization(_)
            | MetrixError::Signature
            | MetrixError::Crypto(_)
            | MetrixError::Compression(_) => StatusCode::BAD_REQUEST,
            MetrixError::NotFound { .. } => StatusCode::NOT_FOUND,
            MetrixError::Forbidden(_) => StatusCode::FORBIDDEN,
            MetrixError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON-RPC error object used when this error terminates an RPC call.
    pub fn to_jsonrpc(&self) -> JsonRpcError {
        let message = self.to_string();
        match self {
            MetrixError::Validation(_)
            | MetrixError::JsonSerialization(_)
            | MetrixError::Crypto(_)
            | MetrixError::Compression(_) => JsonRpcError::invalid_params(&message),
            MetrixError::NotFound { .. } => JsonRpcError::with_code(jsonrpc::NOT_FOUND, &message),
            MetrixError::Signature => JsonRpcError::with_code(jsonrpc::SIGNATURE_MISMATCH, &message),
            MetrixError::Forbidden(_) => JsonRpcError::with_code(jsonrpc::FORBIDDEN, &message),
            _ => JsonRpcError::server_error(&message),
        }
    }

    /// Only a refused connection is worth another delivery attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MetrixError::ConnectionRefused(_))
    }
}

pub type Result<T> = std::result::Result<T, MetrixError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(MetrixError::Validation("bad".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(MetrixError::Signature.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            MetrixError::not_found(MetricKind::Gauge, "Alloc").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(MetrixError::Forbidden("10.0.0.1".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            MetrixError::Storage("disk full".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            MetrixError::Unsupported("ping".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_jsonrpc_codes() {
        assert_eq!(
            MetrixError::not_found(MetricKind::Counter, "PollCount").to_jsonrpc().code,
            jsonrpc::NOT_FOUND
        );
        assert_eq!(MetrixError::Signature.to_jsonrpc().code, jsonrpc::SIGNATURE_MISMATCH);
        assert_eq!(
            MetrixError::Validation("bad".into()).to_jsonrpc().code,
            jsonrpc::INVALID_PARAMS
        );
        assert_eq!(
            MetrixError::Storage("locked".into()).to_jsonrpc().code,
            jsonrpc::SERVER_ERROR
        );
    }

    #[test]
    fn test_only_connection_refused_is_retryable() {
        assert!(MetrixError::ConnectionRefused("127.0.0.1:8080".into()).is_retryable());
        assert!(!MetrixError::Transport("reset".into()).is_retryable());
        assert!(!MetrixError::Timeout(1000).is_retryable());
        assert!(!MetrixError::Signature.is_retryable());
    }

    #[test]
    fn test_not_found_message() {
        let err = MetrixError::not_found(MetricKind::Gauge, "Alloc");
        assert_eq!(err.to_string(), "gauge metric \"Alloc\" not found");
    }
}
