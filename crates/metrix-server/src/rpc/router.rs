//! JSON-RPC method dispatch.
//!
//! | method         | params                    | result           |
//! |----------------|---------------------------|------------------|
//! | `Update`       | record                    | stored record    |
//! | `Updates`      | record array              | `{"error": ""}`  |
//! | `GetValue`     | `{id, type}`              | full record      |
//! | `CryptUpdates` | record array (decrypted)  | `{"error": ""}`  |
//!
//! A batch that fails validation or storage is a JSON-RPC error, with the
//! same code the error maps to everywhere else.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use metrix_common::protocol::error::{MetrixError, Result};
use metrix_common::protocol::jsonrpc::{METHOD_CRYPT_UPDATES, METHOD_GET_VALUE, METHOD_UPDATE, METHOD_UPDATES};
use metrix_common::{Ack, JsonRpcError, JsonRpcRequest, JsonRpcResponse, MetricRecord};

use crate::state::AppState;
use crate::storage::MetricStore;

pub struct RpcRouter {
    state: Arc<AppState>,
}

fn params<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| MetrixError::Validation(format!("invalid params: {e}")))
}

impl RpcRouter {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Handles a request that already passed the interceptor chain.
    pub async fn handle_request(&self, req: JsonRpcRequest) -> JsonRpcResponse {
        let id = req.id.clone();
        let result = match req.method.as_str() {
            METHOD_UPDATE => self.update(req.params).await,
            METHOD_GET_VALUE => self.get_value(req.params).await,
            METHOD_UPDATES | METHOD_CRYPT_UPDATES => self.updates(req.params).await,
            _ => return JsonRpcResponse::error(id, JsonRpcError::method_not_found()),
        };
        match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => JsonRpcResponse::error(id, e.to_jsonrpc()),
        }
    }

    async fn update(&self, raw: Value) -> Result<Value> {
        let record: MetricRecord = params(raw)?;
        let metric = record.validate()?;
        let stored = self.state.timed(self.state.storage.apply(metric)).await?;
        Ok(serde_json::to_value(MetricRecord::from(stored))?)
    }

    async fn get_value(&self, raw: Value) -> Result<Value> {
        let query: MetricRecord = params(raw)?;
        let metric = self
            .state
            .timed(self.state.storage.get(query.kind, &query.id))
            .await?;
        Ok(serde_json::to_value(MetricRecord::from(metric))?)
    }

    async fn updates(&self, raw: Value) -> Result<Value> {
        let records: Vec<MetricRecord> = params(raw)?;
        if let Err(e) = self.state.timed(self.state.storage.apply_batch(&records)).await {
            tracing::warn!("Batch of {} records rejected: {}", records.len(), e);
            return Err(e);
        }
        Ok(serde_json::to_value(Ack::ok())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, Storage};
    use metrix_common::protocol::jsonrpc;
    use metrix_common::{Metric, MetricKind};
    use serde_json::json;

    fn router() -> RpcRouter {
        RpcRouter::new(Arc::new(AppState::open(Arc::new(Storage::Memory(MemoryStore::new())))))
    }

    async fn call(router: &RpcRouter, method: &str, params: Value) -> JsonRpcResponse {
        router
            .handle_request(JsonRpcRequest::new(method, params, json!(1)))
            .await
    }

    #[tokio::test]
    async fn test_update_returns_total() {
        let router = router();
        call(&router, "Update", json!({"id": "c", "type": "counter", "delta": 2})).await;
        let response = call(&router, "Update", json!({"id": "c", "type": "counter", "delta": 3})).await;
        let record: MetricRecord = serde_json::from_value(response.into_result().unwrap()).unwrap();
        assert_eq!(record.delta, Some(5));
    }

    #[tokio::test]
    async fn test_get_value_not_found() {
        let response = call(&router(), "GetValue", json!({"id": "nope", "type": "gauge"})).await;
        assert_eq!(response.into_result().unwrap_err().code, jsonrpc::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_params() {
        let response = call(&router(), "Update", json!({"id": "g", "type": "gauge"})).await;
        assert_eq!(response.into_result().unwrap_err().code, jsonrpc::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_updates_acks() {
        let router = router();
        let batch: Vec<MetricRecord> = vec![Metric::gauge("Alloc", 1.5).into(), Metric::counter("PollCount", 1).into()];
        let response = call(&router, "Updates", serde_json::to_value(&batch).unwrap()).await;
        let ack: Ack = serde_json::from_value(response.into_result().unwrap()).unwrap();
        assert!(ack.is_ok());

        let value = call(&router, "GetValue", json!({"id": "Alloc", "type": "gauge"})).await;
        let record: MetricRecord = serde_json::from_value(value.into_result().unwrap()).unwrap();
        assert_eq!(record.kind, MetricKind::Gauge);
        assert_eq!(record.value, Some(1.5));
    }

    #[tokio::test]
    async fn test_rejected_batch_is_an_error() {
        let router = router();
        let batch = json!([
            {"id": "ok", "type": "gauge", "value": 1.0},
            {"id": "c", "type": "counter", "value": 1.0}
        ]);
        let response = call(&router, "Updates", batch).await;
        let error = response.into_result().unwrap_err();
        assert_eq!(error.code, jsonrpc::INVALID_PARAMS);
        assert!(!error.message.is_empty());

        // nothing from the batch was applied
        let value = call(&router, "GetValue", json!({"id": "ok", "type": "gauge"})).await;
        assert_eq!(value.into_result().unwrap_err().code, jsonrpc::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let response = call(&router(), "Delete", json!({})).await;
        assert_eq!(response.into_result().unwrap_err().code, jsonrpc::METHOD_NOT_FOUND);
    }
}
