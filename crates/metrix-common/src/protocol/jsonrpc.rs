//! JSON-RPC 2.0 Envelope
//!
//! The RPC front-end of the metrix server speaks JSON-RPC 2.0 over HTTP/1.1.
//! This module holds the envelope types shared by the server and the agent's
//! RPC transport.
//!
//! # Methods
//!
//! | method         | params                 | result          |
//! |----------------|------------------------|-----------------|
//! | `Update`       | `MetricRecord`         | `MetricRecord`  |
//! | `Updates`      | `[MetricRecord]`       | `Ack`           |
//! | `GetValue`     | `MetricRecord` (query) | `MetricRecord`  |
//! | `CryptUpdates` | `CryptPayload`         | `Ack`           |
//!
//! # Error Codes
//!
//! The reserved `-32700..-32600` range keeps its standard meaning; a bad
//! metric record is `-32602`. Application failures use the server range:
//! `-32000` storage, `-32003` signature, `-32004` unknown metric and `-32005`
//! untrusted client.
//!
//! # Example
//!
//! ```
//! use metrix_common::protocol::jsonrpc::{JsonRpcRequest, JsonRpcResponse, JsonRpcError};
//! use serde_json::json;
//!
//! let request = JsonRpcRequest::new("GetValue", json!({"id": "Alloc", "type": "gauge"}), json!(1));
//! assert_eq!(request.method, "GetValue");
//!
//! let response = JsonRpcResponse::error(json!(1), JsonRpcError::method_not_found());
//! assert!(response.into_result().is_err());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const METHOD_UPDATE: &str = "Update";
pub const METHOD_UPDATES: &str = "Updates";
pub const METHOD_GET_VALUE: &str = "GetValue";
pub const METHOD_CRYPT_UPDATES: &str = "CryptUpdates";

/// Inbound call envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    /// Single record, record array or `CryptPayload`, depending on `method`.
    #[serde(default)]
    pub params: Value,
    /// Echoed back verbatim; absent ids decode as `null`.
    #[serde(default)]
    pub id: Value,
}

/// Reply envelope; exactly one of `result` and `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Body is not JSON.
pub const PARSE_ERROR: i32 = -32700;
/// Not a POST, or not a request object.
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Params do not decode into the method's record type, or fail validation.
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
/// Storage failure or any other server-side error
pub const SERVER_ERROR: i32 = -32000;
/// `HashSHA256` header does not match the request body
pub const SIGNATURE_MISMATCH: i32 = -32003;
/// Requested metric does not exist
pub const NOT_FOUND: i32 = -32004;
/// Client address is outside the trusted subnet
pub const FORBIDDEN: i32 = -32005;

impl JsonRpcRequest {
    /// Builds a "2.0" request.
    pub fn new(method: impl Into<String>, params: Value, id: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
            id,
        }
    }
}

impl JsonRpcError {
    pub fn with_code(code: i32, msg: &str) -> Self {
        Self {
            code,
            message: msg.into(),
            data: None,
        }
    }

    pub fn parse_error() -> Self {
        Self::with_code(PARSE_ERROR, "Parse error")
    }

    pub fn invalid_request() -> Self {
        Self::with_code(INVALID_REQUEST, "Invalid Request")
    }

    pub fn method_not_found() -> Self {
        Self::with_code(METHOD_NOT_FOUND, "Method not found")
    }

    pub fn invalid_params(msg: &str) -> Self {
        Self::with_code(INVALID_PARAMS, msg)
    }

    pub fn internal_error(msg: &str) -> Self {
        Self::with_code(INTERNAL_ERROR, msg)
    }

    pub fn server_error(msg: &str) -> Self {
        Self::with_code(SERVER_ERROR, msg)
    }
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: None,
            error: Some(error),
            id,
        }
    }

    /// Splits the response into its result or its error object.
    ///
    /// A response carrying neither is reported as an internal error.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        match (self.result, self.error) {
            (_, Some(error)) => Err(error),
            (Some(result), None) => Ok(result),
            (None, None) => Err(JsonRpcError::internal_error("response carries neither result nor error")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let req = JsonRpcRequest::new(METHOD_UPDATES, json!([]), json!(7));
        let serialized = serde_json::to_string(&req).unwrap();
        assert!(serialized.contains("\"jsonrpc\":\"2.0\""));
        assert!(serialized.contains("\"method\":\"Updates\""));
        assert!(serialized.contains("\"id\":7"));
    }

    #[test]
    fn test_request_without_id_is_notification() {
        let req: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"Update","params":{}}"#).unwrap();
        assert_eq!(req.id, Value::Null);
    }

    #[test]
    fn test_success_omits_error_field() {
        let res = JsonRpcResponse::success(json!(1), json!({"error": ""}));
        let serialized = serde_json::to_string(&res).unwrap();
        assert!(!serialized.contains("\"error\":{"));
        assert_eq!(res.into_result().unwrap(), json!({"error": ""}));
    }

    #[test]
    fn test_error_response_into_result() {
        let res = JsonRpcResponse::error(json!(1), JsonRpcError::with_code(NOT_FOUND, "missing"));
        let err = res.into_result().unwrap_err();
        assert_eq!(err.code, NOT_FOUND);
        assert_eq!(err.message, "missing");
    }

    #[test]
    fn test_empty_response_is_internal_error() {
        let res = JsonRpcResponse {
            jsonrpc: "2.0".into(),
            result: None,
            error: None,
            id: json!(1),
        };
        assert_eq!(res.into_result().unwrap_err().code, INTERNAL_ERROR);
    }

    #[test]
    fn test_error_constructors() {
        assert_eq!(JsonRpcError::parse_error().code, PARSE_ERROR);
        assert_eq!(JsonRpcError::invalid_request().code, INVALID_REQUEST);
        assert_eq!(JsonRpcError::method_not_found().code, METHOD_NOT_FOUND);
        assert_eq!(JsonRpcError::invalid_params("x").code, INVALID_PARAMS);
        assert_eq!(JsonRpcError::internal_error("x").code, INTERNAL_ERROR);
        assert_eq!(JsonRpcError::server_error("x").code, SERVER_ERROR);
    }
}
