//! Content-encryption-key wrapping: AES key wrap (RFC 3394) and RSAES-OAEP

use std::fmt;

use aes::cipher::generic_array::GenericArray;
use aes::{Aes128, Aes192, Aes256};
use aes_kw::Kek;
use rand::rngs::OsRng;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::{BigUint, Oaep, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::CryptoError;
use crate::algorithm::{Algorithm, AlgorithmFamily};
use crate::error::ConfigurationError;
use crate::key::asymmetric::PrivateKeyMaterial;
use crate::key::{KeyMaterial, KeyUsage, PublicKeyMaterial, SecurityKey};

enum WrapKey {
    Aes(Zeroizing<Vec<u8>>),
    Rsa {
        public: RsaPublicKey,
        private: Option<RsaPrivateKey>,
    },
}

/// Wraps and unwraps content encryption keys for one (algorithm, key) binding
pub struct KeyWrapProvider {
    algorithm: Algorithm,
    key: WrapKey,
}

impl KeyWrapProvider {
    pub(crate) fn build(
        key: &SecurityKey,
        algorithm: Algorithm,
        usage: KeyUsage,
    ) -> Result<Self, ConfigurationError> {
        let family = algorithm.family();
        if !matches!(family, AlgorithmFamily::AesKeyWrap | AlgorithmFamily::RsaKeyWrap)
            || !key.is_supported_algorithm(algorithm, usage)
        {
            return Err(ConfigurationError::UnsupportedAlgorithm {
                algorithm: algorithm.to_string(),
                key_type: key.key_type().to_string(),
            });
        }
        super::check_key_size(key, algorithm)?;

        let wrap_key = match key.material() {
            KeyMaterial::Symmetric(secret) => {
                // AES-KW needs an exact KEK length, not just a minimum
                if Some(secret.key_bytes().len()) != algorithm.key_wrap_length() {
                    return Err(ConfigurationError::InvalidKey(format!(
                        "{algorithm} requires a {}-bit key, got {} bits",
                        algorithm.minimum_key_size(),
                        secret.key_size()
                    )));
                }
                WrapKey::Aes(Zeroizing::new(secret.key_bytes().to_vec()))
            }
            KeyMaterial::Asymmetric(asymmetric) => {
                let PublicKeyMaterial::Rsa { n, e } = asymmetric.public_key() else {
                    return Err(ConfigurationError::InvalidKey(
                        "RSA-OAEP requires an RSA key".to_string(),
                    ));
                };
                let public = RsaPublicKey::new(BigUint::from_bytes_be(n), BigUint::from_bytes_be(e))
                    .map_err(|e| ConfigurationError::InvalidKey(format!("invalid RSA key: {e}")))?;
                let private = match asymmetric.private_material() {
                    PrivateKeyMaterial::Rsa(der) => Some(
                        RsaPrivateKey::from_pkcs1_der(der).map_err(|e| {
                            ConfigurationError::InvalidKey(format!("invalid RSA private key: {e}"))
                        })?,
                    ),
                    _ => None,
                };
                if usage.requires_private_key() && private.is_none() {
                    return Err(ConfigurationError::MissingPrivateKey {
                        algorithm: algorithm.to_string(),
                    });
                }
                WrapKey::Rsa { public, private }
            }
        };

        Ok(Self {
            algorithm,
            key: wrap_key,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Wrap a content encryption key
    ///
    /// # Errors
    /// Returns [`CryptoError::KeyWrap`] if the backend rejects the input.
    pub fn wrap_key(&self, cek: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match &self.key {
            WrapKey::Aes(kek) => aes_wrap(kek, cek),
            WrapKey::Rsa { public, .. } => {
                let result = if self.algorithm == Algorithm::RsaOaep {
                    public.encrypt(&mut OsRng, Oaep::new::<Sha1>(), cek)
                } else {
                    public.encrypt(&mut OsRng, Oaep::new::<Sha256>(), cek)
                };
                result.map_err(|_| CryptoError::KeyWrap)
            }
        }
    }

    /// Unwrap an encrypted content encryption key
    ///
    /// # Errors
    /// Returns [`CryptoError::KeyUnwrap`] on any integrity or padding failure and
    /// [`CryptoError::MissingPrivateKey`] for public-only RSA providers.
    pub fn unwrap_key(&self, wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        match &self.key {
            WrapKey::Aes(kek) => aes_unwrap(kek, wrapped),
            WrapKey::Rsa { private, .. } => {
                let private = private.as_ref().ok_or(CryptoError::MissingPrivateKey)?;
                let result = if self.algorithm == Algorithm::RsaOaep {
                    private.decrypt(Oaep::new::<Sha1>(), wrapped)
                } else {
                    private.decrypt(Oaep::new::<Sha256>(), wrapped)
                };
                result.map(Zeroizing::new).map_err(|_| CryptoError::KeyUnwrap)
            }
        }
    }
}

impl fmt::Debug for KeyWrapProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyWrapProvider")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// RFC 3394 wrap with a 16, 24 or 32 byte KEK
///
/// # Errors
/// Returns [`CryptoError::KeyWrap`] for a KEK of another length or a CEK that is not a
/// multiple of 8 bytes (minimum 16).
pub fn aes_wrap(kek: &[u8], cek: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if cek.len() < 16 || cek.len() % 8 != 0 {
        return Err(CryptoError::KeyWrap);
    }
    let mut out = vec![0u8; cek.len() + 8];
    let result = match kek.len() {
        16 => Kek::<Aes128>::new(GenericArray::from_slice(kek)).wrap(cek, &mut out),
        24 => Kek::<Aes192>::new(GenericArray::from_slice(kek)).wrap(cek, &mut out),
        32 => Kek::<Aes256>::new(GenericArray::from_slice(kek)).wrap(cek, &mut out),
        _ => return Err(CryptoError::KeyWrap),
    };
    result.map_err(|_| CryptoError::KeyWrap)?;
    Ok(out)
}

/// RFC 3394 unwrap
///
/// # Errors
/// Returns [`CryptoError::KeyUnwrap`] on integrity check failure or bad lengths.
pub fn aes_unwrap(kek: &[u8], wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if wrapped.len() < 24 || wrapped.len() % 8 != 0 {
        return Err(CryptoError::KeyUnwrap);
    }
    let mut out = Zeroizing::new(vec![0u8; wrapped.len() - 8]);
    let result = match kek.len() {
        16 => Kek::<Aes128>::new(GenericArray::from_slice(kek)).unwrap(wrapped, &mut out),
        24 => Kek::<Aes192>::new(GenericArray::from_slice(kek)).unwrap(wrapped, &mut out),
        32 => Kek::<Aes256>::new(GenericArray::from_slice(kek)).unwrap(wrapped, &mut out),
        _ => return Err(CryptoError::KeyUnwrap),
    };
    result.map_err(|_| CryptoError::KeyUnwrap)?;
    Ok(out)
}
