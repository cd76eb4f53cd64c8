//! Outbound payload chain.
//!
//! ```text
//! JSON -> gzip -> RSA encrypt (if a public key is set) -> HMAC (if a key is set)
//! ```
//!
//! The HMAC always covers the bytes that go on the wire.

use metrix_common::protocol::error::Result;
use metrix_common::security::{gzip, Encryptor, Signer};
use metrix_common::transport::http::{CONTENT_TYPE_ENCRYPTED, CONTENT_TYPE_JSON};

#[derive(Clone, Default)]
pub struct OutboundPipeline {
    signer: Option<Signer>,
    encryptor: Option<Encryptor>,
}

/// A body ready to send, with the headers that describe it.
#[derive(Debug, Clone)]
pub struct SealedBody {
    pub body: Vec<u8>,
    pub content_type: &'static str,
    pub hash: Option<String>,
}

impl OutboundPipeline {
    pub fn new(signer: Option<Signer>, encryptor: Option<Encryptor>) -> Self {
        Self { signer, encryptor }
    }

    pub fn encrypts(&self) -> bool {
        self.encryptor.is_some()
    }

    /// Encrypts when a public key is configured; otherwise `None`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Option<Vec<u8>>> {
        self.encryptor
            .as_ref()
            .map(|encryptor| encryptor.encrypt(plaintext))
            .transpose()
    }

    pub fn sign(&self, body: &[u8]) -> Option<String> {
        self.signer.as_ref().map(|signer| signer.sign(body))
    }

    /// Full HTTP chain: always gzip, then optional encryption and signature.
    pub fn seal(&self, json: &[u8]) -> Result<SealedBody> {
        let packed = gzip::compress(json)?;
        let (body, content_type) = match self.encrypt(&packed)? {
            Some(sealed) => (sealed, CONTENT_TYPE_ENCRYPTED),
            None => (packed, CONTENT_TYPE_JSON),
        };
        let hash = self.sign(&body);
        Ok(SealedBody {
            body,
            content_type,
            hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrix_common::security::{keys, Decryptor};

    #[test]
    fn test_plain_chain_is_gzip_only() {
        let sealed = OutboundPipeline::default().seal(b"[]").unwrap();
        assert_eq!(sealed.content_type, CONTENT_TYPE_JSON);
        assert!(sealed.hash.is_none());
        assert_eq!(gzip::decompress(&sealed.body).unwrap(), b"[]");
    }

    #[test]
    fn test_full_chain_reverses() {
        let (private, public) = keys::generate(1024).unwrap();
        let signer = Signer::new("k").unwrap();
        let pipeline = OutboundPipeline::new(Some(signer.clone()), Some(Encryptor::new(public)));

        let json = br#"[{"id":"PollCount","type":"counter","delta":1}]"#;
        let sealed = pipeline.seal(json).unwrap();
        assert_eq!(sealed.content_type, CONTENT_TYPE_ENCRYPTED);

        // the hash covers the ciphertext
        assert!(signer.verify(&sealed.body, sealed.hash.as_deref().unwrap()));

        let packed = Decryptor::new(private).decrypt(&sealed.body).unwrap();
        assert_eq!(gzip::decompress(&packed).unwrap(), json);
    }
}
