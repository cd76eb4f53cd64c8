//! JSON-RPC Front-End Integration Tests
//!
//! Test Scenarios:
//! 1. Update / GetValue / Updates round trips
//! 2. Error codes for missing metrics and bad params
//! 3. Interceptors: subnet, signature, CryptUpdates decryption
//! 4. The same record through HTTP and RPC yields the same state

mod common;

use common::{memory_config, rpc_call, TestServer};
use metrix_common::protocol::jsonrpc;
use metrix_common::security::{keys, Decryptor, Encryptor, Signer, TrustedSubnet};
use metrix_common::transport::http::{HASH_HEADER, REAL_IP_HEADER};
use metrix_common::{CryptPayload, JsonRpcRequest, Metric, MetricRecord};
use metrix_server::ServerConfig;
use serde_json::{json, Value};

#[tokio::test]
async fn test_update_and_get_value() {
    let server = TestServer::start(memory_config()).await;

    rpc_call(&server, "Update", json!({"id": "PollCount", "type": "counter", "delta": 4})).await;
    let response = rpc_call(&server, "Update", json!({"id": "PollCount", "type": "counter", "delta": 6})).await;
    assert_eq!(response["result"]["delta"], 10);

    let value = rpc_call(&server, "GetValue", json!({"id": "PollCount", "type": "counter"})).await;
    assert_eq!(value["result"], json!({"id": "PollCount", "type": "counter", "delta": 10}));

    server.stop().await;
}

#[tokio::test]
async fn test_updates_batch() {
    let server = TestServer::start(memory_config()).await;

    let batch = json!([
        {"id": "Alloc", "type": "gauge", "value": 1.0},
        {"id": "Alloc", "type": "gauge", "value": 2.0},
    ]);
    let response = rpc_call(&server, "Updates", batch).await;
    assert_eq!(response["result"]["error"], "");

    let value = rpc_call(&server, "GetValue", json!({"id": "Alloc", "type": "gauge"})).await;
    assert_eq!(value["result"]["value"], 2.0);

    server.stop().await;
}

#[tokio::test]
async fn test_error_codes() {
    let server = TestServer::start(memory_config()).await;

    let missing = rpc_call(&server, "GetValue", json!({"id": "nope", "type": "gauge"})).await;
    assert_eq!(missing["error"]["code"], jsonrpc::NOT_FOUND);

    let bad = rpc_call(&server, "Update", json!({"id": "x", "type": "histogram"})).await;
    assert_eq!(bad["error"]["code"], jsonrpc::INVALID_PARAMS);

    let unknown = rpc_call(&server, "Drop", json!({})).await;
    assert_eq!(unknown["error"]["code"], jsonrpc::METHOD_NOT_FOUND);

    let garbage: Value = reqwest::Client::new()
        .post(server.rpc_url())
        .body("{not json")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(garbage["error"]["code"], jsonrpc::PARSE_ERROR);

    server.stop().await;
}

#[tokio::test]
async fn test_subnet_interceptor() {
    let config = ServerConfig {
        trusted_subnet: Some(TrustedSubnet::parse("172.16.0.0/12").unwrap()),
        ..memory_config()
    };
    let server = TestServer::start(config).await;
    let request = JsonRpcRequest::new("Updates", json!([]), json!(1));

    let rejected: Value = reqwest::Client::new()
        .post(server.rpc_url())
        .header(REAL_IP_HEADER, "8.8.8.8")
        .json(&request)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(rejected["error"]["code"], jsonrpc::FORBIDDEN);

    let accepted: Value = reqwest::Client::new()
        .post(server.rpc_url())
        .header(REAL_IP_HEADER, "172.20.1.1")
        .json(&request)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(accepted["result"]["error"], "");

    server.stop().await;
}

#[tokio::test]
async fn test_signed_crypt_updates() {
    let (private, public) = keys::generate(1024).unwrap();
    let signer = Signer::new("s3cret").unwrap();
    let config = ServerConfig {
        signer: Some(signer.clone()),
        decryptor: Some(Decryptor::new(private)),
        ..memory_config()
    };
    let server = TestServer::start(config).await;

    let records: Vec<MetricRecord> = vec![Metric::gauge("TotalMemory", 1024.0).into(), Metric::counter("PollCount", 2).into()];
    let sealed = Encryptor::new(public)
        .encrypt(&serde_json::to_vec(&records).unwrap())
        .unwrap();
    let request = JsonRpcRequest::new(
        "CryptUpdates",
        serde_json::to_value(CryptPayload::seal(&sealed)).unwrap(),
        json!(7),
    );
    let body = serde_json::to_vec(&request).unwrap();

    let response = reqwest::Client::new()
        .post(server.rpc_url())
        .header(HASH_HEADER, signer.sign(&body))
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert!(response.headers().contains_key(HASH_HEADER));
    let reply: Value = response.json().await.unwrap();
    assert_eq!(reply["id"], 7);
    assert_eq!(reply["result"]["error"], "");

    let forged: Value = reqwest::Client::new()
        .post(server.rpc_url())
        .header(HASH_HEADER, "deadbeef")
        .body(body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(forged["error"]["code"], jsonrpc::SIGNATURE_MISMATCH);

    let lookup = serde_json::to_vec(&JsonRpcRequest::new(
        "GetValue",
        json!({"id": "PollCount", "type": "counter"}),
        json!(8),
    ))
    .unwrap();
    let value: Value = reqwest::Client::new()
        .post(server.rpc_url())
        .header(HASH_HEADER, signer.sign(&lookup))
        .body(lookup)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(value["result"]["delta"], 2);

    server.stop().await;
}

#[tokio::test]
async fn test_unsigned_request_rejected_when_keyed() {
    let server = TestServer::start(ServerConfig {
        signer: Some(Signer::new("s3cret").unwrap()),
        ..memory_config()
    })
    .await;

    let reply = rpc_call(&server, "Updates", json!([{"id": "PollCount", "type": "counter", "delta": 1}])).await;
    assert_eq!(reply["error"]["code"], jsonrpc::SIGNATURE_MISMATCH);
    assert!(reply.get("result").is_none());

    server.stop().await;
}

#[tokio::test]
async fn test_http_and_rpc_agree() {
    let server = TestServer::start(memory_config()).await;
    let client = reqwest::Client::new();

    client
        .post(server.url("/update/"))
        .json(&json!({"id": "PollCount", "type": "counter", "delta": 5}))
        .send()
        .await
        .unwrap();
    rpc_call(&server, "Update", json!({"id": "PollCount", "type": "counter", "delta": 5})).await;
    rpc_call(&server, "Update", json!({"id": "Alloc", "type": "gauge", "value": 7.5})).await;

    let over_http: Value = client
        .post(server.url("/value/"))
        .json(&json!({"id": "PollCount", "type": "counter"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let over_rpc = rpc_call(&server, "GetValue", json!({"id": "PollCount", "type": "counter"})).await;
    assert_eq!(over_http, over_rpc["result"]);
    assert_eq!(over_http["delta"], 10);

    let gauge = client.get(server.url("/value/gauge/Alloc")).send().await.unwrap();
    assert_eq!(gauge.text().await.unwrap(), "7.5");

    // a counter without a delta fails the whole batch on both transports
    let bad_batch = json!([{"id": "Alloc", "type": "gauge", "value": 1.0}, {"id": "c", "type": "counter", "value": 1.0}]);
    let rejected = client.post(server.url("/updates/")).json(&bad_batch).send().await.unwrap();
    assert_eq!(rejected.status(), reqwest::StatusCode::BAD_REQUEST);
    let reply = rpc_call(&server, "Updates", bad_batch).await;
    assert_eq!(reply["error"]["code"], jsonrpc::INVALID_PARAMS);
    assert!(reply.get("result").is_none());

    let gauge = client.get(server.url("/value/gauge/Alloc")).send().await.unwrap();
    assert_eq!(gauge.text().await.unwrap(), "7.5");

    server.stop().await;
}
