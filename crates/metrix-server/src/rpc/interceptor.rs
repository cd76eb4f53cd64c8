//! RPC interceptor chain.
//!
//! Every call runs through the chain before it reaches the router:
//!
//! ```text
//! trusted subnet -> logging -> signature -> decryption
//! ```
//!
//! An interceptor may reject the call, or rewrite it in place (decryption
//! swaps the sealed `CryptUpdates` payload for the decrypted record array).

use hyper::body::Bytes;
use hyper::HeaderMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use metrix_common::protocol::error::{MetrixError, Result};
use metrix_common::protocol::jsonrpc::METHOD_CRYPT_UPDATES;
use metrix_common::transport::http::{HASH_HEADER, REAL_IP_HEADER};
use metrix_common::{CryptPayload, JsonRpcRequest, MetricRecord};

use crate::state::AppState;

/// A call in flight.
pub struct RpcCall {
    pub peer: Option<SocketAddr>,
    pub headers: HeaderMap,
    /// Raw request body, as signed by the client
    pub body: Bytes,
    pub request: JsonRpcRequest,
    /// Hash to echo in the response, set once the signature checks out
    pub response_hash: Option<String>,
}

impl RpcCall {
    pub fn new(peer: Option<SocketAddr>, headers: HeaderMap, body: Bytes, request: JsonRpcRequest) -> Self {
        Self {
            peer,
            headers,
            body,
            request,
            response_hash: None,
        }
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub trait Interceptor: Send + Sync {
    fn name(&self) -> &'static str;

    fn intercept(&self, call: &mut RpcCall) -> Result<()>;
}

struct SubnetInterceptor {
    state: Arc<AppState>,
}

impl Interceptor for SubnetInterceptor {
    fn name(&self) -> &'static str {
        "subnet"
    }

    fn intercept(&self, call: &mut RpcCall) -> Result<()> {
        self.state.check_subnet(call.header(REAL_IP_HEADER), call.peer)
    }
}

struct LoggingInterceptor;

impl Interceptor for LoggingInterceptor {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn intercept(&self, call: &mut RpcCall) -> Result<()> {
        info!(
            method = %call.request.method,
            peer = ?call.peer,
            bytes = call.body.len(),
            "RPC call"
        );
        Ok(())
    }
}

struct SignatureInterceptor {
    state: Arc<AppState>,
}

impl Interceptor for SignatureInterceptor {
    fn name(&self) -> &'static str {
        "signature"
    }

    fn intercept(&self, call: &mut RpcCall) -> Result<()> {
        let hash = call.header(HASH_HEADER).map(str::to_owned);
        call.response_hash = self.state.require_signature(&call.body, hash.as_deref())?;
        Ok(())
    }
}

struct DecryptInterceptor {
    state: Arc<AppState>,
}

impl Interceptor for DecryptInterceptor {
    fn name(&self) -> &'static str {
        "decrypt"
    }

    fn intercept(&self, call: &mut RpcCall) -> Result<()> {
        if call.request.method != METHOD_CRYPT_UPDATES {
            return Ok(());
        }
        let payload: CryptPayload = serde_json::from_value(call.request.params.take())
            .map_err(|e| MetrixError::Validation(format!("invalid CryptUpdates payload: {e}")))?;
        let plain = self.state.decrypt(&payload.ciphertext()?)?;
        let records: Vec<MetricRecord> = serde_json::from_slice(&plain)
            .map_err(|e| MetrixError::Validation(format!("decrypted payload is not a record array: {e}")))?;
        call.request.params = serde_json::to_value(records)?;
        Ok(())
    }
}

/// Ordered interceptors; the first rejection stops the call.
pub struct InterceptorChain {
    interceptors: Vec<Box<dyn Interceptor>>,
}

impl InterceptorChain {
    pub fn new(interceptors: Vec<Box<dyn Interceptor>>) -> Self {
        Self { interceptors }
    }

    /// The server's chain.
    pub fn standard(state: Arc<AppState>) -> Self {
        Self::new(vec![
            Box::new(SubnetInterceptor { state: state.clone() }),
            Box::new(LoggingInterceptor),
            Box::new(SignatureInterceptor { state: state.clone() }),
            Box::new(DecryptInterceptor { state }),
        ])
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }

    pub fn run(&self, call: &mut RpcCall) -> Result<()> {
        for interceptor in &self.interceptors {
            if let Err(e) = interceptor.intercept(call) {
                tracing::warn!("RPC call rejected by {}: {}", interceptor.name(), e);
                return Err(e);
            }
        }
        Ok(())
    }
}
