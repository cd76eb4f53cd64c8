//! gzip request and response compression.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::protocol::error::{MetrixError, Result};

pub const GZIP: &str = "gzip";

pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| MetrixError::Compression(e.to_string()))?;
    encoder.finish().map_err(|e| MetrixError::Compression(e.to_string()))
}

pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() * 2);
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| MetrixError::Compression(e.to_string()))?;
    Ok(out)
}

/// Only JSON and HTML responses are worth compressing.
pub fn is_compressible(content_type: &str) -> bool {
    let mime = content_type.split(';').next().unwrap_or_default().trim();
    mime.eq_ignore_ascii_case("application/json") || mime.eq_ignore_ascii_case("text/html")
}

/// Whether an `Accept-Encoding` / `Content-Encoding` header value names gzip.
pub fn mentions_gzip(header: &str) -> bool {
    header
        .split(',')
        .any(|token| token.split(';').next().unwrap_or_default().trim().eq_ignore_ascii_case(GZIP))
}
