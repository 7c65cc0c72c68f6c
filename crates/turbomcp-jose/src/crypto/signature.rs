//! JWS signature providers backed by `jsonwebtoken`

use std::fmt;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{DecodingKey, EncodingKey};

use super::CryptoError;
use crate::algorithm::Algorithm;
use crate::error::ConfigurationError;
use crate::key::asymmetric::PrivateKeyMaterial;
use crate::key::{KeyMaterial, KeyUsage, PublicKeyMaterial, SecurityKey};

/// Signs and verifies JWS signing input for one (algorithm, key) binding.
///
/// Holds no per-message state, so one instance serves concurrent callers.
pub struct SignatureProvider {
    algorithm: Algorithm,
    jwt_algorithm: jsonwebtoken::Algorithm,
    verifying_key: DecodingKey,
    signing_key: Option<EncodingKey>,
}

impl SignatureProvider {
    pub(crate) fn build(
        key: &SecurityKey,
        algorithm: Algorithm,
        usage: KeyUsage,
    ) -> Result<Self, ConfigurationError> {
        let jwt_algorithm = algorithm
            .to_jwt()
            .ok_or_else(|| unsupported(key, algorithm))?;
        if !key.is_supported_algorithm(algorithm, usage) {
            return Err(unsupported(key, algorithm));
        }
        super::check_key_size(key, algorithm)?;

        let (verifying_key, signing_key) = match key.material() {
            KeyMaterial::Symmetric(secret) => (
                DecodingKey::from_secret(secret.key_bytes()),
                Some(EncodingKey::from_secret(secret.key_bytes())),
            ),
            KeyMaterial::Asymmetric(asymmetric) => {
                let verifying_key = match asymmetric.public_key() {
                    PublicKeyMaterial::Rsa { n, e } => DecodingKey::from_rsa_raw_components(n, e),
                    PublicKeyMaterial::Ec { x, y, .. } => DecodingKey::from_ec_components(
                        &URL_SAFE_NO_PAD.encode(x),
                        &URL_SAFE_NO_PAD.encode(y),
                    )
                    .map_err(|e| ConfigurationError::InvalidKey(e.to_string()))?,
                };
                let signing_key = match asymmetric.private_material() {
                    PrivateKeyMaterial::Rsa(der) => Some(EncodingKey::from_rsa_der(der)),
                    PrivateKeyMaterial::Ec(der) => Some(EncodingKey::from_ec_der(der)),
                    PrivateKeyMaterial::Absent | PrivateKeyMaterial::Opaque => None,
                };
                (verifying_key, signing_key)
            }
        };

        if usage == KeyUsage::Sign && signing_key.is_none() {
            return Err(ConfigurationError::MissingPrivateKey {
                algorithm: algorithm.to_string(),
            });
        }

        Ok(Self {
            algorithm,
            jwt_algorithm,
            verifying_key,
            signing_key,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Verify a base64url signature segment over the JWS signing input.
    ///
    /// Undecodable signatures verify as `false`.
    pub fn verify(&self, signing_input: &[u8], signature: &str) -> bool {
        jsonwebtoken::crypto::verify(
            signature,
            signing_input,
            &self.verifying_key,
            self.jwt_algorithm,
        )
        .unwrap_or(false)
    }

    /// Sign the JWS signing input, returning the base64url signature segment
    ///
    /// # Errors
    /// Returns [`CryptoError::MissingPrivateKey`] for verify-only providers and
    /// [`CryptoError::Signing`] if the backend rejects the key.
    pub fn sign(&self, signing_input: &[u8]) -> Result<String, CryptoError> {
        let key = self
            .signing_key
            .as_ref()
            .ok_or(CryptoError::MissingPrivateKey)?;
        jsonwebtoken::crypto::sign(signing_input, key, self.jwt_algorithm)
            .map_err(|e| CryptoError::Signing(e.to_string()))
    }
}

impl fmt::Debug for SignatureProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureProvider")
            .field("algorithm", &self.algorithm)
            .field("can_sign", &self.signing_key.is_some())
            .finish_non_exhaustive()
    }
}

fn unsupported(key: &SecurityKey, algorithm: Algorithm) -> ConfigurationError {
    ConfigurationError::UnsupportedAlgorithm {
        algorithm: algorithm.to_string(),
        key_type: key.key_type().to_string(),
    }
}
