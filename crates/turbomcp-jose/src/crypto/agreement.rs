//! ECDH-ES key agreement with the Concat KDF (RFC 7518 §4.6)

use std::fmt;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use p256::pkcs8::DecodePrivateKey;
use rand::rngs::OsRng;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::CryptoError;
use crate::algorithm::{Algorithm, AlgorithmFamily, EcCurve, EncryptionAlgorithm};
use crate::error::ConfigurationError;
use crate::key::asymmetric::PrivateKeyMaterial;
use crate::key::{KeyMaterial, KeyUsage, PublicKeyMaterial, SecurityKey};

enum StaticSecret {
    P256(p256::SecretKey),
    P384(p384::SecretKey),
}

/// An ephemeral public key as carried in the JWE `epk` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EphemeralPublicKey {
    pub curve: EcCurve,
    pub x: Vec<u8>,
    pub y: Vec<u8>,
}

impl EphemeralPublicKey {
    /// Read an `epk` header member
    ///
    /// # Errors
    /// Returns [`CryptoError::InvalidEphemeralKey`] for anything but a well-formed EC JWK.
    pub fn from_header(epk: &Value) -> Result<Self, CryptoError> {
        let field = |name: &str| epk.get(name).and_then(Value::as_str);
        if field("kty") != Some("EC") {
            return Err(CryptoError::InvalidEphemeralKey);
        }
        let curve: EcCurve = field("crv")
            .ok_or(CryptoError::InvalidEphemeralKey)?
            .parse()
            .map_err(|_| CryptoError::InvalidEphemeralKey)?;
        let decode = |name: &str| {
            field(name)
                .and_then(|v| URL_SAFE_NO_PAD.decode(v).ok())
                .filter(|bytes| bytes.len() == curve.coordinate_length())
                .ok_or(CryptoError::InvalidEphemeralKey)
        };
        Ok(Self {
            curve,
            x: decode("x")?,
            y: decode("y")?,
        })
    }

    /// Render as an `epk` header member
    pub fn to_header(&self) -> Value {
        let mut jwk = Map::new();
        jwk.insert("kty".to_string(), Value::from("EC"));
        jwk.insert("crv".to_string(), Value::from(self.curve.as_str()));
        jwk.insert("x".to_string(), Value::from(URL_SAFE_NO_PAD.encode(&self.x)));
        jwk.insert("y".to_string(), Value::from(URL_SAFE_NO_PAD.encode(&self.y)));
        Value::Object(jwk)
    }

    fn sec1(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + self.x.len() + self.y.len());
        bytes.push(0x04);
        bytes.extend_from_slice(&self.x);
        bytes.extend_from_slice(&self.y);
        bytes
    }
}

/// Party info and output parameters for one agreement
#[derive(Debug, Clone, Copy)]
pub struct AgreementContext<'a> {
    pub algorithm: Algorithm,
    pub encryption: EncryptionAlgorithm,
    pub apu: &'a [u8],
    pub apv: &'a [u8],
}

impl AgreementContext<'_> {
    /// Direct ECDH-ES derives the CEK under the `enc` name; the `+AxxKW` variants
    /// derive a KEK under the `alg` name.
    fn algorithm_id_and_length(&self) -> (&'static str, usize) {
        match self.algorithm.key_wrap_length() {
            Some(kek_length) => (self.algorithm.as_str(), kek_length),
            None => (self.encryption.as_str(), self.encryption.key_length()),
        }
    }
}

/// Performs ECDH-ES agreement for one recipient key
pub struct KeyAgreementProvider {
    algorithm: Algorithm,
    curve: EcCurve,
    public: EphemeralPublicKey,
    secret: Option<StaticSecret>,
}

impl KeyAgreementProvider {
    pub(crate) fn build(
        key: &SecurityKey,
        algorithm: Algorithm,
        usage: KeyUsage,
    ) -> Result<Self, ConfigurationError> {
        let unsupported = || ConfigurationError::UnsupportedAlgorithm {
            algorithm: algorithm.to_string(),
            key_type: key.key_type().to_string(),
        };
        if algorithm.family() != AlgorithmFamily::EcdhEs
            || !key.is_supported_algorithm(algorithm, usage)
        {
            return Err(unsupported());
        }
        super::check_key_size(key, algorithm)?;

        let KeyMaterial::Asymmetric(asymmetric) = key.material() else {
            return Err(unsupported());
        };
        let PublicKeyMaterial::Ec { curve, x, y } = asymmetric.public_key() else {
            return Err(unsupported());
        };

        let secret = match asymmetric.private_material() {
            PrivateKeyMaterial::Ec(der) => Some(match curve {
                EcCurve::P256 => StaticSecret::P256(p256::SecretKey::from_pkcs8_der(der).map_err(
                    |e| ConfigurationError::InvalidKey(format!("invalid P-256 private key: {e}")),
                )?),
                EcCurve::P384 => StaticSecret::P384(p384::SecretKey::from_pkcs8_der(der).map_err(
                    |e| ConfigurationError::InvalidKey(format!("invalid P-384 private key: {e}")),
                )?),
            }),
            _ => None,
        };
        if usage.requires_private_key() && secret.is_none() {
            return Err(ConfigurationError::MissingPrivateKey {
                algorithm: algorithm.to_string(),
            });
        }

        Ok(Self {
            algorithm,
            curve: *curve,
            public: EphemeralPublicKey {
                curve: *curve,
                x: x.clone(),
                y: y.clone(),
            },
            secret,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Recipient side: derive the agreed key from the sender's ephemeral key
    ///
    /// # Errors
    /// Returns [`CryptoError::InvalidEphemeralKey`] if `epk` is not a point on this
    /// key's curve and [`CryptoError::MissingPrivateKey`] for public-only providers.
    pub fn derive_for_recipient(
        &self,
        epk: &EphemeralPublicKey,
        context: &AgreementContext<'_>,
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        if epk.curve != self.curve {
            return Err(CryptoError::InvalidEphemeralKey);
        }
        let secret = self.secret.as_ref().ok_or(CryptoError::MissingPrivateKey)?;
        let sec1 = epk.sec1();

        let shared = match secret {
            StaticSecret::P256(secret) => {
                let public = p256::PublicKey::from_sec1_bytes(&sec1)
                    .map_err(|_| CryptoError::InvalidEphemeralKey)?;
                let shared = p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
                Zeroizing::new(shared.raw_secret_bytes().to_vec())
            }
            StaticSecret::P384(secret) => {
                let public = p384::PublicKey::from_sec1_bytes(&sec1)
                    .map_err(|_| CryptoError::InvalidEphemeralKey)?;
                let shared = p384::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
                Zeroizing::new(shared.raw_secret_bytes().to_vec())
            }
        };

        let (algorithm_id, length) = context.algorithm_id_and_length();
        Ok(concat_kdf(&shared, algorithm_id, context.apu, context.apv, length))
    }

    /// Sender side: generate an ephemeral key and derive the agreed key for this recipient
    ///
    /// # Errors
    /// Returns [`CryptoError::InvalidEphemeralKey`] if the recipient key is not a valid point.
    pub fn derive_for_sender(
        &self,
        context: &AgreementContext<'_>,
    ) -> Result<(Zeroizing<Vec<u8>>, EphemeralPublicKey), CryptoError> {
        use p256::elliptic_curve::sec1::ToEncodedPoint;

        let recipient = self.public.sec1();
        let (shared, x, y) = match self.curve {
            EcCurve::P256 => {
                let public = p256::PublicKey::from_sec1_bytes(&recipient)
                    .map_err(|_| CryptoError::InvalidEphemeralKey)?;
                let ephemeral = p256::ecdh::EphemeralSecret::random(&mut OsRng);
                let shared = ephemeral.diffie_hellman(&public);
                let point = ephemeral.public_key().to_encoded_point(false);
                (
                    Zeroizing::new(shared.raw_secret_bytes().to_vec()),
                    point.x().map(|x| x.to_vec()),
                    point.y().map(|y| y.to_vec()),
                )
            }
            EcCurve::P384 => {
                let public = p384::PublicKey::from_sec1_bytes(&recipient)
                    .map_err(|_| CryptoError::InvalidEphemeralKey)?;
                let ephemeral = p384::ecdh::EphemeralSecret::random(&mut OsRng);
                let shared = ephemeral.diffie_hellman(&public);
                let point = ephemeral.public_key().to_encoded_point(false);
                (
                    Zeroizing::new(shared.raw_secret_bytes().to_vec()),
                    point.x().map(|x| x.to_vec()),
                    point.y().map(|y| y.to_vec()),
                )
            }
        };
        let (Some(x), Some(y)) = (x, y) else {
            return Err(CryptoError::InvalidEphemeralKey);
        };

        let (algorithm_id, length) = context.algorithm_id_and_length();
        let derived = concat_kdf(&shared, algorithm_id, context.apu, context.apv, length);
        Ok((
            derived,
            EphemeralPublicKey {
                curve: self.curve,
                x,
                y,
            },
        ))
    }
}

impl fmt::Debug for KeyAgreementProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyAgreementProvider")
            .field("algorithm", &self.algorithm)
            .field("curve", &self.curve)
            .field("can_derive_as_recipient", &self.secret.is_some())
            .finish_non_exhaustive()
    }
}

/// NIST SP 800-56A single-step KDF with SHA-256, as profiled by RFC 7518 §4.6.2
fn concat_kdf(
    shared_secret: &[u8],
    algorithm_id: &str,
    apu: &[u8],
    apv: &[u8],
    key_length: usize,
) -> Zeroizing<Vec<u8>> {
    let length_prefixed = |data: &[u8]| {
        let mut out = (data.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(data);
        out
    };

    let mut other_info = length_prefixed(algorithm_id.as_bytes());
    other_info.extend(length_prefixed(apu));
    other_info.extend(length_prefixed(apv));
    other_info.extend_from_slice(&((key_length * 8) as u32).to_be_bytes());

    let mut derived = Zeroizing::new(Vec::with_capacity(key_length + 32));
    let mut counter: u32 = 1;
    while derived.len() < key_length {
        let mut hasher = Sha256::new();
        hasher.update(counter.to_be_bytes());
        hasher.update(shared_secret);
        hasher.update(&other_info);
        derived.extend_from_slice(&hasher.finalize());
        counter += 1;
    }
    derived.truncate(key_length);
    derived
}
