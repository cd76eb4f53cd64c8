//! JSON-RPC over HTTP
//!
//! Conversions between HTTP messages and the JSON-RPC envelope, plus the
//! header names both metrix front-ends and the agent agree on.
//!
//! # Headers
//!
//! - `HashSHA256`: hex HMAC-SHA256 of the request body as transmitted
//! - `X-Real-IP`: the agent's outbound address, used by the subnet filter
//! - `Content-Encoding: gzip`: the body (or the decrypted body) is gzip
//! - `Content-Type: application/octet-stream`: the body is RSA ciphertext
//!
//! # Example
//!
//! ```
//! use metrix_common::transport::http::HttpTransport;
//! use metrix_common::protocol::JsonRpcResponse;
//! use serde_json::json;
//!
//! let request = HttpTransport::parse_jsonrpc(br#"{"jsonrpc":"2.0","method":"Updates","params":[],"id":1}"#).unwrap();
//! assert_eq!(request.method, "Updates");
//!
//! let response = HttpTransport::to_http_response(JsonRpcResponse::success(json!(1), json!({})));
//! assert_eq!(response.status(), 200);
//! ```

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Request, Response};

use crate::protocol::error::{MetrixError, Result};
use crate::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};

pub const HASH_HEADER: &str = "HashSHA256";
pub const REAL_IP_HEADER: &str = "X-Real-IP";
pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_ENCRYPTED: &str = "application/octet-stream";
pub const CONTENT_TYPE_HTML: &str = "text/html; charset=utf-8";
pub const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";

pub type HyperRequest = Request<Incoming>;
pub type HyperResponse = Response<Full<Bytes>>;

/// Envelope conversions for the hyper-based RPC front-end.
pub struct HttpTransport;

impl HttpTransport {
    /// Decodes a request body that has already passed the inbound chain.
    /// Any version other than `"2.0"` is a validation error.
    pub fn parse_jsonrpc(body: &[u8]) -> Result<JsonRpcRequest> {
        let request: JsonRpcRequest = serde_json::from_slice(body)?;
        if request.jsonrpc != "2.0" {
            return Err(MetrixError::Validation(format!(
                "unsupported JSON-RPC version {:?}",
                request.jsonrpc
            )));
        }
        Ok(request)
    }

    /// Wraps an envelope in a 200 JSON response; JSON-RPC errors also travel as 200.
    pub fn to_http_response(jsonrpc: JsonRpcResponse) -> HyperResponse {
        let body = serde_json::to_vec(&jsonrpc).unwrap_or_default();
        let mut response = Response::new(Full::new(Bytes::from(body)));
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));
        response
    }

    pub fn to_http_error(id: serde_json::Value, error: JsonRpcError) -> HyperResponse {
        Self::to_http_response(JsonRpcResponse::error(id, error))
    }
}
