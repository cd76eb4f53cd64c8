//! Inbound middleware for the HTTP front-end.
//!
//! Each function is an `axum::middleware::from_fn` layer. Layers that need
//! the whole body buffer it, transform it, and rebuild the request.

use axum::body::{to_bytes, Body, Bytes};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;

use metrix_common::protocol::error::MetrixError;
use metrix_common::security::gzip;
use metrix_common::transport::http::{CONTENT_TYPE_ENCRYPTED, CONTENT_TYPE_JSON, HASH_HEADER, REAL_IP_HEADER};

use super::handlers::ApiError;
use crate::state::AppState;

/// Upper bound on a buffered request or response body.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn read_body(body: Body) -> Result<Bytes, Response> {
    to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ApiError::from(MetrixError::Validation(format!("failed to read body: {e}"))).into_response())
}

/// Rejects requests from outside the trusted subnet with `403`.
pub async fn trusted_subnet(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let real_ip = header_str(req.headers(), REAL_IP_HEADER);
    let peer = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|info| info.0);
    if let Err(e) = state.check_subnet(real_ip, peer) {
        warn!("Rejected request from {:?} / {:?}: {}", real_ip, peer, e);
        return ApiError::from(e).into_response();
    }
    next.run(req).await
}

/// Verifies `HashSHA256` over the raw body and echoes the computed hash.
pub async fn verify_signature(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    if state.signer.is_none() {
        return next.run(req).await;
    }
    let Some(hash) = header_str(req.headers(), HASH_HEADER).map(str::to_owned) else {
        return next.run(req).await;
    };

    let (parts, body) = req.into_parts();
    let bytes = match read_body(body).await {
        Ok(bytes) => bytes,
        Err(response) => return response,
    };
    let computed = match state.verify_signature(&bytes, Some(&hash)) {
        Ok(computed) => computed,
        Err(e) => {
            warn!("Signature mismatch on {}", parts.uri.path());
            return ApiError::from(e).into_response();
        }
    };

    let mut response = next.run(Request::from_parts(parts, Body::from(bytes))).await;
    if let Some(value) = computed.and_then(|hash| HeaderValue::from_str(&hash).ok()) {
        response.headers_mut().insert(HASH_HEADER, value);
    }
    response
}

/// Decrypts `application/octet-stream` bodies when a private key is set.
pub async fn decrypt(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let encrypted = header_str(req.headers(), CONTENT_TYPE.as_str())
        .map(|ct| ct.starts_with(CONTENT_TYPE_ENCRYPTED))
        .unwrap_or(false);
    if state.decryptor.is_none() || !encrypted {
        return next.run(req).await;
    }

    let (mut parts, body) = req.into_parts();
    let bytes = match read_body(body).await {
        Ok(bytes) => bytes,
        Err(response) => return response,
    };
    let plain = match state.decrypt(&bytes) {
        Ok(plain) => plain,
        Err(e) => return ApiError::from(e).into_response(),
    };

    parts
        .headers
        .insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));
    parts.headers.remove(CONTENT_LENGTH);
    next.run(Request::from_parts(parts, Body::from(plain))).await
}

/// Inflates gzip request bodies and compresses JSON and HTML responses for
/// clients that accept gzip.
pub async fn gzip(req: Request, next: Next) -> Response {
    let accepts_gzip = header_str(req.headers(), ACCEPT_ENCODING.as_str())
        .map(gzip::mentions_gzip)
        .unwrap_or(false);
    let inflate = header_str(req.headers(), CONTENT_ENCODING.as_str())
        .map(gzip::mentions_gzip)
        .unwrap_or(false);

    let req = if inflate {
        let (mut parts, body) = req.into_parts();
        let bytes = match read_body(body).await {
            Ok(bytes) => bytes,
            Err(response) => return response,
        };
        let plain = match gzip::decompress(&bytes) {
            Ok(plain) => plain,
            Err(e) => return ApiError::from(e).into_response(),
        };
        parts.headers.remove(CONTENT_ENCODING);
        parts.headers.remove(CONTENT_LENGTH);
        Request::from_parts(parts, Body::from(plain))
    } else {
        req
    };

    let response = next.run(req).await;

    let compressible = header_str(response.headers(), CONTENT_TYPE.as_str())
        .map(gzip::is_compressible)
        .unwrap_or(false);
    if !accepts_gzip || !compressible || response.headers().contains_key(CONTENT_ENCODING) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match read_body(body).await {
        Ok(bytes) => bytes,
        Err(response) => return response,
    };
    let packed = match gzip::compress(&bytes) {
        Ok(packed) => packed,
        Err(e) => return ApiError::from(e).into_response(),
    };
    parts
        .headers
        .insert(CONTENT_ENCODING, HeaderValue::from_static(gzip::GZIP));
    parts.headers.remove(CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(packed))
}
