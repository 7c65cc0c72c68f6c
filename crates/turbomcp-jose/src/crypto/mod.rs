//! Crypto provider factory and cache
//!
//! [`CryptoProviderFactory`] turns an (algorithm, key, usage) triple into a ready
//! provider and keeps it for reuse. Each provider type has its own concurrent map with
//! atomic get-or-insert, so a provider is either fully built and visible to every thread
//! or not present at all. Construction failures are returned as [`ConfigurationError`]
//! and never cached.
//!
//! The factory is an explicit object owned by the token handler (shared through `Arc`),
//! not a process global, so tests can observe an isolated cache.

pub mod agreement;
pub mod encryption;
pub mod key_wrap;
pub mod signature;

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

pub use agreement::{AgreementContext, EphemeralPublicKey, KeyAgreementProvider};
pub use encryption::{AuthenticatedEncryptionProvider, EncryptedContent};
pub use key_wrap::KeyWrapProvider;
pub use signature::SignatureProvider;

use crate::algorithm::{Algorithm, EncryptionAlgorithm};
use crate::error::ConfigurationError;
use crate::key::{KeyMaterial, KeyUsage, PrivateKeyExistence, SecurityKey};

/// Failures of a cryptographic operation on data (as opposed to provider construction)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Key wrap failed")]
    KeyWrap,

    #[error("Key unwrap failed")]
    KeyUnwrap,

    #[error("Content encryption failed")]
    Encryption,

    #[error("Content decryption failed")]
    Decryption,

    #[error("Invalid ephemeral public key")]
    InvalidEphemeralKey,

    #[error("Operation requires a private key")]
    MissingPrivateKey,
}

/// Identity of a cached provider
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ProviderCacheKey {
    algorithm: &'static str,
    thumbprint: String,
    private: bool,
    usage: KeyUsage,
}

impl ProviderCacheKey {
    fn new(algorithm: &'static str, key: &SecurityKey, usage: KeyUsage) -> Self {
        Self {
            algorithm,
            thumbprint: key.thumbprint().to_string(),
            private: key.private_key_status() == PrivateKeyExistence::Yes,
            usage,
        }
    }
}

/// Builds and caches crypto providers
#[derive(Debug, Default)]
pub struct CryptoProviderFactory {
    signature: DashMap<ProviderCacheKey, Arc<SignatureProvider>>,
    key_wrap: DashMap<ProviderCacheKey, Arc<KeyWrapProvider>>,
    agreement: DashMap<ProviderCacheKey, Arc<KeyAgreementProvider>>,
    encryption: DashMap<ProviderCacheKey, Arc<AuthenticatedEncryptionProvider>>,
}

impl CryptoProviderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider for signing (`KeyUsage::Sign`) or verification (`KeyUsage::Verify`)
    ///
    /// # Errors
    /// Returns [`ConfigurationError`] if the key cannot serve `algorithm`, is too short,
    /// or lacks the private key needed to sign.
    pub fn signature_provider(
        &self,
        key: &SecurityKey,
        algorithm: Algorithm,
        usage: KeyUsage,
    ) -> Result<Arc<SignatureProvider>, ConfigurationError> {
        ensure_supported(key, algorithm, usage)?;
        let cache_key = ProviderCacheKey::new(algorithm.as_str(), key, usage);
        get_or_build(&self.signature, cache_key, || {
            SignatureProvider::build(key, algorithm, usage)
        })
    }

    /// Provider for AES key wrap or RSA-OAEP
    ///
    /// # Errors
    /// Returns [`ConfigurationError`] if the key cannot serve `algorithm`.
    pub fn key_wrap_provider(
        &self,
        key: &SecurityKey,
        algorithm: Algorithm,
        usage: KeyUsage,
    ) -> Result<Arc<KeyWrapProvider>, ConfigurationError> {
        ensure_supported(key, algorithm, usage)?;
        let cache_key = ProviderCacheKey::new(algorithm.as_str(), key, usage);
        get_or_build(&self.key_wrap, cache_key, || {
            KeyWrapProvider::build(key, algorithm, usage)
        })
    }

    /// Provider for ECDH-ES key agreement
    ///
    /// # Errors
    /// Returns [`ConfigurationError`] if the key is not an EC key usable with `algorithm`.
    pub fn key_agreement_provider(
        &self,
        key: &SecurityKey,
        algorithm: Algorithm,
        usage: KeyUsage,
    ) -> Result<Arc<KeyAgreementProvider>, ConfigurationError> {
        ensure_supported(key, algorithm, usage)?;
        let cache_key = ProviderCacheKey::new(algorithm.as_str(), key, usage);
        get_or_build(&self.agreement, cache_key, || {
            KeyAgreementProvider::build(key, algorithm, usage)
        })
    }

    /// Cached AEAD provider for a long-lived shared key used with `dir`
    ///
    /// # Errors
    /// Returns [`ConfigurationError`] if the key is not a symmetric key of the length
    /// `encryption` requires.
    pub fn encryption_provider(
        &self,
        key: &SecurityKey,
        encryption: EncryptionAlgorithm,
        usage: KeyUsage,
    ) -> Result<Arc<AuthenticatedEncryptionProvider>, ConfigurationError> {
        ensure_supported(key, Algorithm::Dir, usage)?;
        let cache_key = ProviderCacheKey::new(encryption.as_str(), key, usage);
        get_or_build(&self.encryption, cache_key, || {
            match key.material() {
                KeyMaterial::Symmetric(secret) => {
                    AuthenticatedEncryptionProvider::new(encryption, secret.key_bytes())
                }
                KeyMaterial::Asymmetric(_) => Err(ConfigurationError::UnsupportedAlgorithm {
                    algorithm: Algorithm::Dir.to_string(),
                    key_type: key.key_type().to_string(),
                }),
            }
        })
    }

    /// AEAD provider for a per-token CEK. Never cached: the CEK is used once.
    ///
    /// # Errors
    /// Returns [`ConfigurationError::InvalidKey`] if `cek` has the wrong length.
    pub fn content_encryption_provider(
        &self,
        cek: &[u8],
        encryption: EncryptionAlgorithm,
    ) -> Result<AuthenticatedEncryptionProvider, ConfigurationError> {
        AuthenticatedEncryptionProvider::new(encryption, cek)
    }

    /// Number of cached providers across all provider types
    pub fn cache_len(&self) -> usize {
        self.signature.len() + self.key_wrap.len() + self.agreement.len() + self.encryption.len()
    }

    pub fn clear(&self) {
        self.signature.clear();
        self.key_wrap.clear();
        self.agreement.clear();
        self.encryption.clear();
    }
}

fn get_or_build<P>(
    cache: &DashMap<ProviderCacheKey, Arc<P>>,
    cache_key: ProviderCacheKey,
    build: impl FnOnce() -> Result<P, ConfigurationError>,
) -> Result<Arc<P>, ConfigurationError> {
    if let Some(provider) = cache.get(&cache_key) {
        debug!(algorithm = cache_key.algorithm, usage = %cache_key.usage, "Crypto provider cache hit");
        return Ok(Arc::clone(provider.value()));
    }

    debug!(algorithm = cache_key.algorithm, usage = %cache_key.usage, "Building crypto provider");
    let entry = cache
        .entry(cache_key)
        .or_try_insert_with(|| build().map(Arc::new))?;
    Ok(Arc::clone(entry.value()))
}

/// Key restrictions (JWK `use`, `key_ops`, `alg`) are not part of the cache key, so they
/// are checked on every lookup, not only when a provider is first built
fn ensure_supported(
    key: &SecurityKey,
    algorithm: Algorithm,
    usage: KeyUsage,
) -> Result<(), ConfigurationError> {
    if key.is_supported_algorithm(algorithm, usage) {
        Ok(())
    } else {
        Err(ConfigurationError::UnsupportedAlgorithm {
            algorithm: algorithm.to_string(),
            key_type: key.key_type().to_string(),
        })
    }
}

/// Reject keys shorter than the algorithm's minimum
pub(crate) fn check_key_size(key: &SecurityKey, algorithm: Algorithm) -> Result<(), ConfigurationError> {
    let minimum = algorithm.minimum_key_size();
    let actual = key.key_size();
    if actual < minimum {
        return Err(ConfigurationError::KeyTooShort {
            algorithm: algorithm.to_string(),
            minimum_bits: minimum,
            actual_bits: actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::SymmetricSecurityKey;
    use std::thread;

    fn hmac_key() -> SecurityKey {
        SymmetricSecurityKey::new(vec![0x11; 32]).unwrap().into()
    }

    #[test]
    fn test_provider_is_cached_once() {
        let factory = CryptoProviderFactory::new();
        let key = hmac_key();

        let first = factory
            .signature_provider(&key, Algorithm::HS256, KeyUsage::Verify)
            .unwrap();
        let second = factory
            .signature_provider(&key, Algorithm::HS256, KeyUsage::Verify)
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.cache_len(), 1);

        factory
            .signature_provider(&key, Algorithm::HS256, KeyUsage::Sign)
            .unwrap();
        assert_eq!(factory.cache_len(), 2);

        factory.clear();
        assert_eq!(factory.cache_len(), 0);
    }

    #[test]
    fn test_failures_are_not_cached() {
        let factory = CryptoProviderFactory::new();
        let key = hmac_key();

        let result = factory.signature_provider(&key, Algorithm::HS512, KeyUsage::Verify);
        assert!(matches!(result, Err(ConfigurationError::KeyTooShort { .. })));
        let result = factory.signature_provider(&key, Algorithm::RS256, KeyUsage::Verify);
        assert!(matches!(
            result,
            Err(ConfigurationError::UnsupportedAlgorithm { .. })
        ));
        assert_eq!(factory.cache_len(), 0);
    }

    #[test]
    fn test_key_restrictions_checked_on_cache_hit() {
        use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
        use crate::key::JsonWebKey;

        let factory = CryptoProviderFactory::new();
        let secret = [0x33u8; 32];
        let plain: SecurityKey = SymmetricSecurityKey::new(secret.to_vec()).unwrap().into();
        let enc_only = JsonWebKey::from_json(&format!(
            r#"{{"kty":"oct","use":"enc","k":"{}"}}"#,
            URL_SAFE_NO_PAD.encode(secret)
        ))
        .unwrap()
        .to_security_key()
        .unwrap();
        assert_eq!(plain.thumbprint(), enc_only.thumbprint());

        factory
            .signature_provider(&plain, Algorithm::HS256, KeyUsage::Verify)
            .unwrap();
        assert!(matches!(
            factory.signature_provider(&enc_only, Algorithm::HS256, KeyUsage::Verify),
            Err(ConfigurationError::UnsupportedAlgorithm { .. })
        ));
    }

    #[test]
    fn test_concurrent_get_or_insert() {
        let factory = Arc::new(CryptoProviderFactory::new());
        let key = Arc::new(hmac_key());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let factory = Arc::clone(&factory);
                let key = Arc::clone(&key);
                thread::spawn(move || {
                    factory
                        .signature_provider(&key, Algorithm::HS256, KeyUsage::Verify)
                        .unwrap()
                })
            })
            .collect();
        let providers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(factory.cache_len(), 1);
        assert!(providers.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_direct_encryption_provider() {
        let factory = CryptoProviderFactory::new();
        let key: SecurityKey = SymmetricSecurityKey::new(vec![0x22; 32]).unwrap().into();

        assert!(
            factory
                .encryption_provider(&key, EncryptionAlgorithm::A256Gcm, KeyUsage::Decrypt)
                .is_ok()
        );
        assert!(matches!(
            factory.encryption_provider(&key, EncryptionAlgorithm::A128Gcm, KeyUsage::Decrypt),
            Err(ConfigurationError::InvalidKey(_))
        ));
        assert_eq!(factory.cache_len(), 1);

        // per-token CEKs bypass the cache
        factory
            .content_encryption_provider(&[0u8; 16], EncryptionAlgorithm::A128Gcm)
            .unwrap();
        assert_eq!(factory.cache_len(), 1);
    }
}
