//! JSON-RPC transport.
//!
//! Plain batches go out as `Updates(records)`. With a public key the record
//! array is encrypted and sent as `CryptUpdates({"cryptbuff": ...})`. The
//! envelope body is signed either way.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrix_common::protocol::error::{MetrixError, Result};
use metrix_common::protocol::jsonrpc::{METHOD_CRYPT_UPDATES, METHOD_UPDATES};
use metrix_common::transport::http::{CONTENT_TYPE_JSON, HASH_HEADER};
use metrix_common::{Ack, CryptPayload, JsonRpcRequest, JsonRpcResponse, MetricRecord};

use super::{base_url, classify, OutboundPipeline, Transport};

pub struct RpcTransport {
    client: reqwest::Client,
    url: String,
    pipeline: OutboundPipeline,
    next_id: AtomicU64,
}

impl RpcTransport {
    pub fn new(address: &str, pipeline: OutboundPipeline, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MetrixError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: format!("{}/", base_url(address)),
            pipeline,
            next_id: AtomicU64::new(1),
        })
    }

    fn envelope(&self, records: &[MetricRecord]) -> Result<JsonRpcRequest> {
        let id = json!(self.next_id.fetch_add(1, Ordering::Relaxed));
        let plain = serde_json::to_vec(records)?;
        match self.pipeline.encrypt(&plain)? {
            Some(ciphertext) => Ok(JsonRpcRequest::new(
                METHOD_CRYPT_UPDATES,
                serde_json::to_value(CryptPayload::seal(&ciphertext))?,
                id,
            )),
            None => Ok(JsonRpcRequest::new(METHOD_UPDATES, serde_json::to_value(records)?, id)),
        }
    }
}

#[async_trait]
impl Transport for RpcTransport {
    fn name(&self) -> &'static str {
        "rpc"
    }

    async fn deliver(&self, records: &[MetricRecord]) -> Result<Ack> {
        let body = serde_json::to_vec(&self.envelope(records)?)?;

        let mut request = self.client.post(&self.url).header(CONTENT_TYPE, CONTENT_TYPE_JSON);
        if let Some(hash) = self.pipeline.sign(&body) {
            request = request.header(HASH_HEADER, hash);
        }

        let response = request.body(body).send().await.map_err(classify)?;
        let bytes = response.bytes().await.map_err(classify)?;
        let reply: JsonRpcResponse = serde_json::from_slice(&bytes)?;

        match reply.into_result() {
            Ok(result) => Ok(serde_json::from_value(result)?),
            Err(error) => Ok(Ack::failed(error.message)),
        }
    }
}
