//! Chunked RSA Encryption
//!
//! PKCS#1 v1.5 can only seal `key_size - 11` bytes at a time, so payloads
//! are split into blocks of that size. Each block becomes exactly
//! `key_size` bytes of ciphertext and the blocks are concatenated. The
//! decryptor splits on `key_size` and concatenates the plaintexts.

use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use std::path::Path;

use super::keys;
use crate::protocol::error::{MetrixError, Result};

/// PKCS#1 v1.5 padding overhead per block.
const PKCS1_OVERHEAD: usize = 11;

/// Encrypts outbound payloads with the server's public key.
#[derive(Debug, Clone)]
pub struct Encryptor {
    key: RsaPublicKey,
}

impl Encryptor {
    pub fn new(key: RsaPublicKey) -> Self {
        Self { key }
    }

    /// Loads a PEM public key from disk.
    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self> {
        keys::load_public_key(path).map(Self::new)
    }

    /// Largest plaintext that fits in one block.
    pub fn block_size(&self) -> usize {
        self.key.size() - PKCS1_OVERHEAD
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let block = self.block_size();
        let mut rng = rand::thread_rng();
        let mut out = Vec::with_capacity(plaintext.len().div_ceil(block) * self.key.size());
        for chunk in plaintext.chunks(block) {
            let sealed = self
                .key
                .encrypt(&mut rng, Pkcs1v15Encrypt, chunk)
                .map_err(|e| MetrixError::Crypto(format!("encryption failed: {e}")))?;
            out.extend_from_slice(&sealed);
        }
        Ok(out)
    }
}

/// Decrypts inbound payloads with the server's private key.
#[derive(Debug, Clone)]
pub struct Decryptor {
    key: RsaPrivateKey,
}

impl Decryptor {
    pub fn new(key: RsaPrivateKey) -> Self {
        Self { key }
    }

    /// Loads a PEM private key from disk.
    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self> {
        keys::load_private_key(path).map(Self::new)
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let block = self.key.size();
        if ciphertext.len() % block != 0 {
            return Err(MetrixError::Crypto(format!(
                "ciphertext length {} is not a multiple of the {}-byte block",
                ciphertext.len(),
                block
            )));
        }
        let mut out = Vec::with_capacity(ciphertext.len());
        for chunk in ciphertext.chunks(block) {
            let plain = self
                .key
                .decrypt(Pkcs1v15Encrypt, chunk)
                .map_err(|e| MetrixError::Crypto(format!("decryption failed: {e}")))?;
            out.extend_from_slice(&plain);
        }
        Ok(out)
    }
}
