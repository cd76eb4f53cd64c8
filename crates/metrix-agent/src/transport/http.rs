//! `POST /updates/` transport.

use async_trait::async_trait;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;
use std::net::{ToSocketAddrs, UdpSocket};
use std::time::Duration;
use tracing::{debug, warn};

use metrix_common::protocol::error::{MetrixError, Result};
use metrix_common::security::gzip::GZIP;
use metrix_common::transport::http::{HASH_HEADER, REAL_IP_HEADER};
use metrix_common::{Ack, MetricRecord};

use super::{base_url, classify, OutboundPipeline, Transport};

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    pipeline: OutboundPipeline,
    real_ip: Option<String>,
}

impl HttpTransport {
    pub fn new(address: &str, pipeline: OutboundPipeline, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MetrixError::Transport(format!("failed to build HTTP client: {e}")))?;
        let real_ip = outbound_ip(address);
        if real_ip.is_none() {
            warn!("Could not determine the outbound address for {}", address);
        }
        Ok(Self {
            client,
            url: format!("{}/updates/", base_url(address)),
            pipeline,
            real_ip,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn real_ip(&self) -> Option<&str> {
        self.real_ip.as_deref()
    }
}

/// Local address the OS would use to reach `address`.
///
/// Connecting a UDP socket sends nothing; it only selects a route.
fn outbound_ip(address: &str) -> Option<String> {
    let host = address
        .trim_start_matches("http://")
        .trim_start_matches("https://")
        .trim_end_matches('/');
    let target = host.to_socket_addrs().ok()?.next()?;
    let bind = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(bind).ok()?;
    socket.connect(target).ok()?;
    Some(socket.local_addr().ok()?.ip().to_string())
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn deliver(&self, records: &[MetricRecord]) -> Result<Ack> {
        let json = serde_json::to_vec(records)?;
        let sealed = self.pipeline.seal(&json)?;

        let mut request = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, sealed.content_type)
            .header(CONTENT_ENCODING, GZIP);
        if let Some(hash) = &sealed.hash {
            request = request.header(HASH_HEADER, hash);
        }
        if let Some(ip) = &self.real_ip {
            request = request.header(REAL_IP_HEADER, ip);
        }

        let response = request.body(sealed.body).send().await.map_err(classify)?;
        let status = response.status();
        let body = response.bytes().await.map_err(classify)?;
        debug!("POST {} -> {} ({} records)", self.url, status, records.len());

        Ok(decode_ack(status, &body))
    }
}

/// Reads the server's answer. A 2xx body that is not an `Ack` counts as a
/// failed delivery.
fn decode_ack(status: StatusCode, body: &[u8]) -> Ack {
    if status.is_success() {
        return serde_json::from_slice(body)
            .unwrap_or_else(|e| Ack::failed(format!("malformed response ({}): {}", status, e)));
    }
    let message = serde_json::from_slice::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| format!("server answered {}", status));
    Ack::failed(message)
}
