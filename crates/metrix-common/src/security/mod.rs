//! Security Middleware Primitives
//!
//! Building blocks for the outbound (agent) and inbound (server) payload
//! chains. Each primitive is a pure byte transformation so both front-ends
//! and the agent transports can compose them in the same order.
//!
//! # Chains
//!
//! Outbound, applied by the agent:
//!
//! ```text
//! JSON -> gzip -> RSA encrypt (optional) -> HMAC over final body (optional)
//! ```
//!
//! Inbound, applied by the server in reverse:
//!
//! ```text
//! subnet filter -> HMAC verify -> RSA decrypt -> gunzip -> handler
//! ```
//!
//! # Components
//!
//! - [`sign`] - HMAC-SHA256 signing with constant-time verification
//! - [`crypt`] - chunked RSA PKCS#1 v1.5 encryption
//! - [`keys`] - PEM loading and key-pair generation
//! - [`gzip`] - request/response compression
//! - [`subnet`] - trusted-subnet filter

pub mod crypt;
pub mod gzip;
pub mod keys;
pub mod sign;
pub mod subnet;

pub use crypt::{Decryptor, Encryptor};
pub use sign::Signer;
pub use subnet::TrustedSubnet;
