//! Metrix Common Types and Security Primitives
//!
//! This crate provides the metric model, the JSON-RPC envelope and the
//! security middleware primitives shared by the metrix agent and server.
//!
//! # Overview
//!
//! Metrix is a metrics collection-and-delivery pipeline. An agent samples
//! runtime and OS gauges plus a poll counter and pushes them in batches to a
//! server, which stores them and exposes them over HTTP and JSON-RPC. Both
//! sides agree on the contents of this crate:
//!
//! - **Protocol Layer**: metric records, typed metrics, error taxonomy and
//!   the JSON-RPC 2.0 envelope
//! - **Security Layer**: HMAC-SHA256 signing, chunked RSA encryption, gzip
//!   and the trusted-subnet filter
//! - **Transport Layer**: HTTP/JSON-RPC conversion helpers and header names
//!
//! # Wire Format
//!
//! A metric record is a JSON object:
//!
//! ```json
//! {"id": "PollCount", "type": "counter", "delta": 5}
//! {"id": "Alloc", "type": "gauge", "value": 1024.5}
//! ```
//!
//! Exactly one of `delta` (counters) or `value` (gauges) is present.
//!
//! # Example
//!
//! ```
//! use metrix_common::{MetricRecord, MetricValue};
//!
//! let record: MetricRecord =
//!     serde_json::from_str(r#"{"id":"PollCount","type":"counter","delta":5}"#).unwrap();
//! let metric = record.validate().unwrap();
//! assert_eq!(metric.value, MetricValue::Counter(5));
//! ```

pub mod config;
pub mod humanize;
pub mod protocol;
pub mod security;
pub mod transport;

pub use protocol::*;
