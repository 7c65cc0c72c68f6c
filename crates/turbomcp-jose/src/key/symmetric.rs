//! Raw shared-secret keys (JWK `kty` = `oct`)

use std::fmt;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::algorithm::{Algorithm, AlgorithmFamily, EncryptionAlgorithm};
use crate::error::ConfigurationError;

/// A symmetric key used for HMAC signatures, AES key wrap and direct encryption
#[derive(Clone)]
pub struct SymmetricSecurityKey {
    key: Zeroizing<Vec<u8>>,
    key_id: Option<String>,
    thumbprint: String,
}

impl SymmetricSecurityKey {
    /// Create a key from raw secret bytes
    ///
    /// # Errors
    /// Returns [`ConfigurationError::InvalidKey`] if the secret is empty.
    pub fn new(key: impl Into<Vec<u8>>) -> Result<Self, ConfigurationError> {
        let key = Zeroizing::new(key.into());
        if key.is_empty() {
            return Err(ConfigurationError::InvalidKey(
                "symmetric key must not be empty".to_string(),
            ));
        }

        // RFC 7638 members in lexicographic order
        let canonical = serde_json::json!({
            "k": URL_SAFE_NO_PAD.encode(key.as_slice()),
            "kty": "oct",
        })
        .to_string();
        let thumbprint = URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes()));

        Ok(Self {
            key,
            key_id: None,
            thumbprint,
        })
    }

    /// Attach a key identifier (`kid`)
    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    /// Secret bytes. Never log these.
    pub fn key_bytes(&self) -> &[u8] {
        &self.key
    }

    pub fn key_size(&self) -> usize {
        self.key.len() * 8
    }

    /// Algorithms a shared secret can serve at all, ignoring key length
    pub(crate) fn supports(algorithm: Algorithm) -> bool {
        matches!(
            algorithm.family(),
            AlgorithmFamily::Hmac | AlgorithmFamily::AesKeyWrap | AlgorithmFamily::Direct
        )
    }

    /// Whether this key has exactly the length `enc` needs for direct encryption
    pub fn fits_content_encryption(&self, enc: EncryptionAlgorithm) -> bool {
        self.key.len() == enc.key_length()
    }
}

impl fmt::Debug for SymmetricSecurityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymmetricSecurityKey")
            .field("key_id", &self.key_id)
            .field("key_size", &self.key_size())
            .field("thumbprint", &self.thumbprint)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_key_rejected() {
        assert!(matches!(
            SymmetricSecurityKey::new(Vec::new()),
            Err(ConfigurationError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_thumbprint_is_stable() {
        let a = SymmetricSecurityKey::new(vec![7u8; 32]).unwrap();
        let b = SymmetricSecurityKey::new(vec![7u8; 32])
            .unwrap()
            .with_key_id("other");
        let c = SymmetricSecurityKey::new(vec![8u8; 32]).unwrap();

        assert_eq!(a.thumbprint(), b.thumbprint());
        assert_ne!(a.thumbprint(), c.thumbprint());
        assert_eq!(a.key_size(), 256);
    }

    #[test]
    fn test_debug_hides_secret() {
        let key = SymmetricSecurityKey::new(b"super-secret-value-0123456789abc".to_vec()).unwrap();
        let rendered = format!("{key:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("key_size"));
    }
}
