//! Shared state for both front-ends.
//!
//! The HTTP middleware and the RPC interceptors call the same inbound
//! checks defined here, so the two transports cannot drift apart.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use metrix_common::protocol::error::{MetrixError, Result};
use metrix_common::security::{Decryptor, Signer, TrustedSubnet};

use crate::config::{ServerConfig, DEFAULT_REQUEST_TIMEOUT};
use crate::storage::Storage;

pub struct AppState {
    pub storage: Arc<Storage>,
    pub signer: Option<Signer>,
    pub decryptor: Option<Decryptor>,
    pub trusted_subnet: Option<TrustedSubnet>,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(storage: Arc<Storage>, config: &ServerConfig) -> Self {
        Self {
            storage,
            signer: config.signer.clone(),
            decryptor: config.decryptor.clone(),
            trusted_subnet: config.trusted_subnet.clone(),
            request_timeout: config.request_timeout,
        }
    }

    /// State without any inbound security.
    pub fn open(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            signer: None,
            decryptor: None,
            trusted_subnet: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Runs a storage call under the request timeout.
    pub async fn timed<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.request_timeout, fut)
            .await
            .map_err(|_| MetrixError::Timeout(self.request_timeout.as_millis() as u64))?
    }

    /// Trusted-subnet filter; passes everything when no subnet is configured.
    pub fn check_subnet(&self, real_ip: Option<&str>, peer: Option<SocketAddr>) -> Result<()> {
        match &self.trusted_subnet {
            Some(subnet) => subnet.check(real_ip, peer),
            None => Ok(()),
        }
    }

    /// Verifies `HashSHA256` over the body as received.
    ///
    /// Returns the computed hash to echo back, or `None` when verification
    /// does not apply (no secret configured or no header sent).
    pub fn verify_signature(&self, body: &[u8], hash: Option<&str>) -> Result<Option<String>> {
        let (Some(signer), Some(hash)) = (&self.signer, hash) else {
            return Ok(None);
        };
        if !signer.verify(body, hash) {
            return Err(MetrixError::Signature);
        }
        Ok(Some(signer.sign(body)))
    }

    /// Like [`verify_signature`](Self::verify_signature), but a configured
    /// secret makes the header mandatory.
    pub fn require_signature(&self, body: &[u8], hash: Option<&str>) -> Result<Option<String>> {
        if self.signer.is_some() && hash.is_none() {
            return Err(MetrixError::Signature);
        }
        self.verify_signature(body, hash)
    }

    /// Decrypts a ciphertext body with the configured private key.
    pub fn decrypt(&self, body: &[u8]) -> Result<Vec<u8>> {
        match &self.decryptor {
            Some(decryptor) => decryptor.decrypt(body),
            None => Err(MetrixError::Crypto(
                "encrypted payload received but no private key is configured".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn state() -> AppState {
        AppState::open(Arc::new(Storage::Memory(MemoryStore::new())))
    }

    #[test]
    fn test_verification_skipped_without_secret_or_header() {
        let mut state = state();
        assert_eq!(state.verify_signature(b"body", Some("abc")).unwrap(), None);

        state.signer = Some(Signer::new("k").unwrap());
        assert_eq!(state.verify_signature(b"body", None).unwrap(), None);
    }

    #[test]
    fn test_required_signature_rejects_missing_header() {
        let mut state = state();
        assert_eq!(state.require_signature(b"body", None).unwrap(), None);

        state.signer = Some(Signer::new("k").unwrap());
        assert!(matches!(state.require_signature(b"body", None), Err(MetrixError::Signature)));
        let hash = state.signer.as_ref().unwrap().sign(b"body");
        assert_eq!(state.require_signature(b"body", Some(&hash)).unwrap(), Some(hash.clone()));
    }

    #[test]
    fn test_verification_echoes_hash() {
        let mut state = state();
        let signer = Signer::new("k").unwrap();
        let hash = signer.sign(b"body");
        state.signer = Some(signer);

        assert_eq!(state.verify_signature(b"body", Some(&hash)).unwrap(), Some(hash.clone()));
        assert!(matches!(
            state.verify_signature(b"bodY", Some(&hash)),
            Err(MetrixError::Signature)
        ));
    }

    #[test]
    fn test_subnet_open_by_default() {
        assert!(state().check_subnet(Some("8.8.8.8"), None).is_ok());
    }

    #[test]
    fn test_decrypt_without_key() {
        assert!(matches!(state().decrypt(b"x"), Err(MetrixError::Crypto(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_reports_timeout() {
        let state = state();
        let slow = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        };
        assert!(matches!(state.timed(slow).await, Err(MetrixError::Timeout(20_000))));
    }
}
