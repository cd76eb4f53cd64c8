//! HMAC-SHA256 Payload Signing
//!
//! When a shared secret is configured, the agent signs each request body and
//! sends the lowercase hex digest in the `HashSHA256` header. The server
//! recomputes the digest over the body it received and rejects mismatches.
//!
//! # Example
//!
//! ```
//! use metrix_common::security::Signer;
//!
//! let signer = Signer::new("shared-secret").unwrap();
//! let hash = signer.sign(b"payload");
//! assert!(signer.verify(b"payload", &hash));
//! assert!(!signer.verify(b"payloaD", &hash));
//! ```

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

use crate::protocol::error::{MetrixError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies payloads with a shared secret.
#[derive(Clone)]
pub struct Signer {
    mac: HmacSha256,
}

impl Signer {
    /// Creates a signer keyed by `key`.
    pub fn new(key: impl AsRef<[u8]>) -> Result<Self> {
        let mac = HmacSha256::new_from_slice(key.as_ref())
            .map_err(|e| MetrixError::Config(format!("invalid signing key: {e}")))?;
        Ok(Self { mac })
    }

    /// Builds a signer from an optional configured secret.
    ///
    /// `None` and the empty string both disable signing.
    pub fn from_key(key: Option<&str>) -> Result<Option<Self>> {
        match key {
            Some(key) if !key.is_empty() => Self::new(key).map(Some),
            _ => Ok(None),
        }
    }

    /// Returns the lowercase hex HMAC-SHA256 of `payload`.
    pub fn sign(&self, payload: &[u8]) -> String {
        let mut mac = self.mac.clone();
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Checks `hash` against `payload` in constant time.
    ///
    /// Malformed hex is a mismatch.
    pub fn verify(&self, payload: &[u8], hash: &str) -> bool {
        let Ok(expected) = hex::decode(hash.trim()) else {
            return false;
        };
        let mut mac = self.mac.clone();
        mac.update(payload);
        mac.verify_slice(&expected).is_ok()
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Signer(HMAC-SHA256, key=***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_is_deterministic_hex() {
        let signer = Signer::new("secret").unwrap();
        let a = signer.sign(b"hello");
        let b = signer.sign(b"hello");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2
        let signer = Signer::new("Jefe").unwrap();
        assert_eq!(
            signer.sign(b"what do ya want for nothing?"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_verify_symmetry() {
        let signer = Signer::new("secret").unwrap();
        let payload = br#"[{"id":"Alloc","type":"gauge","value":1.5}]"#;
        let hash = signer.sign(payload);
        assert!(signer.verify(payload, &hash));
    }

    #[test]
    fn test_any_single_byte_mutation_fails() {
        let signer = Signer::new("secret").unwrap();
        let payload = b"metrics batch body".to_vec();
        let hash = signer.sign(&payload);

        for i in 0..payload.len() {
            let mut mutated = payload.clone();
            mutated[i] ^= 0x01;
            assert!(!signer.verify(&mutated, &hash), "mutation at byte {} verified", i);
        }
    }

    #[test]
    fn test_different_keys_disagree() {
        let a = Signer::new("key-a").unwrap();
        let b = Signer::new("key-b").unwrap();
        let hash = a.sign(b"payload");
        assert!(!b.verify(b"payload", &hash));
    }

    #[test]
    fn test_malformed_hash_is_mismatch() {
        let signer = Signer::new("secret").unwrap();
        assert!(!signer.verify(b"payload", "zz-not-hex"));
        assert!(!signer.verify(b"payload", ""));
    }

    #[test]
    fn test_from_key() {
        assert!(Signer::from_key(None).unwrap().is_none());
        assert!(Signer::from_key(Some("")).unwrap().is_none());
        assert!(Signer::from_key(Some("k")).unwrap().is_some());
    }

    #[test]
    fn test_debug_masks_key() {
        let signer = Signer::new("super-secret").unwrap();
        assert!(!format!("{:?}", signer).contains("super-secret"));
    }
}
