//! Security key model
//!
//! [`SecurityKey`] is a capability-tagged sum over the three ways a caller can supply
//! key material: raw shared secrets, RSA/EC keys, and JWK documents. Every variant
//! answers the same questions (identifier, thumbprint, size, private-key presence,
//! and whether it can serve an algorithm for a given usage), so the crypto layer never
//! needs to know which variant it was handed.
//!
//! Keys are immutable and shared as `Arc<SecurityKey>` across many validations.

pub mod asymmetric;
pub mod jwk;
pub mod symmetric;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use asymmetric::{AsymmetricSecurityKey, PublicKeyMaterial};
pub use jwk::{JsonWebKey, JsonWebKeySet, JsonWebSecurityKey};
pub use symmetric::SymmetricSecurityKey;

use crate::algorithm::Algorithm;
use jwk::ResolvedKey;

/// Whether a key carries its private half
///
/// `Unknown` is returned when the private material is held outside the process and
/// cannot be introspected. It is never collapsed into `No`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrivateKeyExistence {
    Yes,
    No,
    Unknown,
}

/// Operation a key is asked to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyUsage {
    Sign,
    Verify,
    Encrypt,
    Decrypt,
    WrapKey,
    UnwrapKey,
}

impl KeyUsage {
    /// Matching JWK `key_ops` value
    pub fn key_op(self) -> &'static str {
        match self {
            Self::Sign => "sign",
            Self::Verify => "verify",
            Self::Encrypt => "encrypt",
            Self::Decrypt => "decrypt",
            Self::WrapKey => "wrapKey",
            Self::UnwrapKey => "unwrapKey",
        }
    }

    /// Usages that need the private half of an asymmetric key
    pub fn requires_private_key(self) -> bool {
        matches!(self, Self::Sign | Self::Decrypt | Self::UnwrapKey)
    }
}

impl fmt::Display for KeyUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key_op())
    }
}

/// Normalized view of the key material behind any [`SecurityKey`]
#[derive(Debug, Clone, Copy)]
pub(crate) enum KeyMaterial<'a> {
    Symmetric(&'a SymmetricSecurityKey),
    Asymmetric(&'a AsymmetricSecurityKey),
}

/// A key supplied by the caller for signature validation or token decryption
#[derive(Debug, Clone)]
pub enum SecurityKey {
    Symmetric(SymmetricSecurityKey),
    Asymmetric(AsymmetricSecurityKey),
    JsonWebKey(JsonWebSecurityKey),
}

impl SecurityKey {
    pub(crate) fn material(&self) -> KeyMaterial<'_> {
        match self {
            SecurityKey::Symmetric(key) => KeyMaterial::Symmetric(key),
            SecurityKey::Asymmetric(key) => KeyMaterial::Asymmetric(key),
            SecurityKey::JsonWebKey(jwk) => match jwk.resolved() {
                ResolvedKey::Symmetric(key) => KeyMaterial::Symmetric(key),
                ResolvedKey::Asymmetric(key) => KeyMaterial::Asymmetric(key),
            },
        }
    }

    /// Key identifier (`kid`)
    pub fn key_id(&self) -> Option<&str> {
        match self {
            SecurityKey::Symmetric(key) => key.key_id(),
            SecurityKey::Asymmetric(key) => key.key_id(),
            SecurityKey::JsonWebKey(jwk) => jwk.key_id(),
        }
    }

    /// X.509 certificate SHA-1 thumbprint (`x5t`), only known for JWKs
    pub fn x5t(&self) -> Option<&str> {
        match self {
            SecurityKey::JsonWebKey(jwk) => jwk.x5t(),
            _ => None,
        }
    }

    /// RFC 7638 SHA-256 JWK thumbprint, base64url encoded
    pub fn thumbprint(&self) -> &str {
        match self.material() {
            KeyMaterial::Symmetric(key) => key.thumbprint(),
            KeyMaterial::Asymmetric(key) => key.thumbprint(),
        }
    }

    /// Every supported key type can produce a thumbprint once normalized
    pub fn can_compute_jwk_thumbprint(&self) -> bool {
        match self {
            SecurityKey::JsonWebKey(jwk) => jwk.jwk().can_compute_thumbprint(),
            _ => true,
        }
    }

    /// Key size in bits
    pub fn key_size(&self) -> usize {
        match self.material() {
            KeyMaterial::Symmetric(key) => key.key_size(),
            KeyMaterial::Asymmetric(key) => key.key_size(),
        }
    }

    /// Shared secrets report `No`: they have no private half to find.
    pub fn private_key_status(&self) -> PrivateKeyExistence {
        match self.material() {
            KeyMaterial::Symmetric(_) => PrivateKeyExistence::No,
            KeyMaterial::Asymmetric(key) => key.private_key_status(),
        }
    }

    /// Algorithm the key is bound to, if any (JWK `alg` member)
    pub fn algorithm(&self) -> Option<Algorithm> {
        match self {
            SecurityKey::JsonWebKey(jwk) => jwk.algorithm(),
            _ => None,
        }
    }

    /// Whether this key's type and restrictions allow `algorithm` for `usage`.
    ///
    /// Key length is not considered here; providers enforce minimum sizes when they are
    /// built and report a configuration error for undersized keys.
    pub fn is_supported_algorithm(&self, algorithm: Algorithm, usage: KeyUsage) -> bool {
        if let SecurityKey::JsonWebKey(jwk) = self
            && !jwk.permits(algorithm, usage)
        {
            return false;
        }

        let signing_usage = matches!(usage, KeyUsage::Sign | KeyUsage::Verify);
        if algorithm.is_signing() != signing_usage {
            return false;
        }

        match self.material() {
            KeyMaterial::Symmetric(_) => SymmetricSecurityKey::supports(algorithm),
            KeyMaterial::Asymmetric(key) => key.supports(algorithm),
        }
    }

    /// Short key-type label for diagnostics
    pub fn key_type(&self) -> &'static str {
        match self.material() {
            KeyMaterial::Symmetric(_) => "oct",
            KeyMaterial::Asymmetric(key) => key.kty(),
        }
    }
}

impl From<SymmetricSecurityKey> for SecurityKey {
    fn from(key: SymmetricSecurityKey) -> Self {
        SecurityKey::Symmetric(key)
    }
}

impl From<AsymmetricSecurityKey> for SecurityKey {
    fn from(key: AsymmetricSecurityKey) -> Self {
        SecurityKey::Asymmetric(key)
    }
}

impl From<JsonWebSecurityKey> for SecurityKey {
    fn from(key: JsonWebSecurityKey) -> Self {
        SecurityKey::JsonWebKey(key)
    }
}

// Lets builders take a concrete key where they store `Arc<SecurityKey>`
impl From<SymmetricSecurityKey> for Arc<SecurityKey> {
    fn from(key: SymmetricSecurityKey) -> Self {
        Arc::new(key.into())
    }
}

impl From<AsymmetricSecurityKey> for Arc<SecurityKey> {
    fn from(key: AsymmetricSecurityKey) -> Self {
        Arc::new(key.into())
    }
}

impl From<JsonWebSecurityKey> for Arc<SecurityKey> {
    fn from(key: JsonWebSecurityKey) -> Self {
        Arc::new(key.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symmetric_capabilities() {
        let key: SecurityKey = SymmetricSecurityKey::new(vec![1u8; 32]).unwrap().into();

        assert!(key.is_supported_algorithm(Algorithm::HS256, KeyUsage::Verify));
        assert!(key.is_supported_algorithm(Algorithm::A256KW, KeyUsage::UnwrapKey));
        assert!(key.is_supported_algorithm(Algorithm::Dir, KeyUsage::Decrypt));
        // signing algorithm asked for a decryption usage
        assert!(!key.is_supported_algorithm(Algorithm::HS256, KeyUsage::Decrypt));
        assert!(!key.is_supported_algorithm(Algorithm::RS256, KeyUsage::Verify));
        assert!(!key.is_supported_algorithm(Algorithm::None, KeyUsage::Verify));
        assert_eq!(key.private_key_status(), PrivateKeyExistence::No);
        assert_eq!(key.key_type(), "oct");
        assert!(key.can_compute_jwk_thumbprint());
    }

    #[test]
    fn test_rsa_capabilities() {
        let key: SecurityKey = AsymmetricSecurityKey::from_rsa_components(&[0xC1; 256], &[1, 0, 1])
            .unwrap()
            .with_key_id("rsa-1")
            .into();

        assert_eq!(key.key_id(), Some("rsa-1"));
        assert_eq!(key.key_size(), 2048);
        assert!(key.is_supported_algorithm(Algorithm::PS512, KeyUsage::Verify));
        assert!(key.is_supported_algorithm(Algorithm::RsaOaep256, KeyUsage::UnwrapKey));
        assert!(!key.is_supported_algorithm(Algorithm::ES256, KeyUsage::Verify));
        assert!(!key.is_supported_algorithm(Algorithm::A128KW, KeyUsage::UnwrapKey));
        assert_eq!(key.key_type(), "RSA");
    }

    #[test]
    fn test_usage_private_requirements() {
        assert!(KeyUsage::Sign.requires_private_key());
        assert!(KeyUsage::UnwrapKey.requires_private_key());
        assert!(!KeyUsage::Verify.requires_private_key());
        assert!(!KeyUsage::WrapKey.requires_private_key());
    }
}
