//! RSA and elliptic-curve keys

use std::fmt;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::PrivateKeyExistence;
use crate::algorithm::{Algorithm, AlgorithmFamily, EcCurve};
use crate::error::ConfigurationError;

/// Public half of an asymmetric key, as big-endian unsigned integers / affine coordinates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKeyMaterial {
    Rsa { n: Vec<u8>, e: Vec<u8> },
    Ec { curve: EcCurve, x: Vec<u8>, y: Vec<u8> },
}

#[derive(Clone)]
pub(crate) enum PrivateKeyMaterial {
    Absent,
    /// PKCS#1 `RSAPrivateKey` DER
    Rsa(Zeroizing<Vec<u8>>),
    /// PKCS#8 DER
    Ec(Zeroizing<Vec<u8>>),
    /// Private half lives outside this process (HSM, KMS) and cannot be inspected
    Opaque,
}

/// An RSA or EC key with optional private material
#[derive(Clone)]
pub struct AsymmetricSecurityKey {
    public: PublicKeyMaterial,
    private: PrivateKeyMaterial,
    key_id: Option<String>,
    thumbprint: String,
}

impl AsymmetricSecurityKey {
    /// Build a public RSA key from its modulus and exponent (big-endian bytes)
    ///
    /// # Errors
    /// Returns [`ConfigurationError::InvalidKey`] if either component is empty.
    pub fn from_rsa_components(n: &[u8], e: &[u8]) -> Result<Self, ConfigurationError> {
        let n = strip_leading_zeros(n);
        let e = strip_leading_zeros(e);
        if n.is_empty() || e.is_empty() {
            return Err(ConfigurationError::InvalidKey(
                "RSA modulus and exponent must not be empty".to_string(),
            ));
        }
        Ok(Self::assemble(
            PublicKeyMaterial::Rsa {
                n: n.to_vec(),
                e: e.to_vec(),
            },
            PrivateKeyMaterial::Absent,
        ))
    }

    pub fn from_rsa_public_key(key: &RsaPublicKey) -> Self {
        Self::assemble(
            PublicKeyMaterial::Rsa {
                n: key.n().to_bytes_be(),
                e: key.e().to_bytes_be(),
            },
            PrivateKeyMaterial::Absent,
        )
    }

    /// # Errors
    /// Returns [`ConfigurationError::InvalidKey`] if the key cannot be DER encoded.
    pub fn from_rsa_private_key(key: &RsaPrivateKey) -> Result<Self, ConfigurationError> {
        let der = key
            .to_pkcs1_der()
            .map_err(|e| ConfigurationError::InvalidKey(format!("RSA key encoding failed: {e}")))?;
        Ok(Self::assemble(
            PublicKeyMaterial::Rsa {
                n: key.n().to_bytes_be(),
                e: key.e().to_bytes_be(),
            },
            PrivateKeyMaterial::Rsa(Zeroizing::new(der.as_bytes().to_vec())),
        ))
    }

    /// Build a public EC key from affine coordinates
    ///
    /// # Errors
    /// Returns [`ConfigurationError::InvalidKey`] if the coordinates have the wrong
    /// length or do not describe a point on `curve`.
    pub fn from_ec_coordinates(
        curve: EcCurve,
        x: &[u8],
        y: &[u8],
    ) -> Result<Self, ConfigurationError> {
        let len = curve.coordinate_length();
        if x.len() != len || y.len() != len {
            return Err(ConfigurationError::InvalidKey(format!(
                "{curve} coordinates must be {len} bytes"
            )));
        }

        let mut sec1 = Vec::with_capacity(1 + 2 * len);
        sec1.push(0x04);
        sec1.extend_from_slice(x);
        sec1.extend_from_slice(y);
        let on_curve = match curve {
            EcCurve::P256 => p256::PublicKey::from_sec1_bytes(&sec1).is_ok(),
            EcCurve::P384 => p384::PublicKey::from_sec1_bytes(&sec1).is_ok(),
        };
        if !on_curve {
            return Err(ConfigurationError::InvalidKey(format!(
                "point is not on curve {curve}"
            )));
        }

        Ok(Self::assemble(
            PublicKeyMaterial::Ec {
                curve,
                x: x.to_vec(),
                y: y.to_vec(),
            },
            PrivateKeyMaterial::Absent,
        ))
    }

    /// # Errors
    /// Returns [`ConfigurationError::InvalidKey`] if the key cannot be encoded.
    pub fn from_p256_secret(secret: &p256::SecretKey) -> Result<Self, ConfigurationError> {
        use p256::pkcs8::EncodePrivateKey;

        let point = secret.public_key().to_encoded_point(false);
        let der = secret
            .to_pkcs8_der()
            .map_err(|e| ConfigurationError::InvalidKey(format!("P-256 key encoding failed: {e}")))?;
        Self::from_ec_parts(
            EcCurve::P256,
            point.x().map(|x| x.to_vec()),
            point.y().map(|y| y.to_vec()),
            der.as_bytes(),
        )
    }

    /// # Errors
    /// Returns [`ConfigurationError::InvalidKey`] if the key cannot be encoded.
    pub fn from_p384_secret(secret: &p384::SecretKey) -> Result<Self, ConfigurationError> {
        use p384::elliptic_curve::sec1::ToEncodedPoint as _;
        use p384::pkcs8::EncodePrivateKey;

        let point = secret.public_key().to_encoded_point(false);
        let der = secret
            .to_pkcs8_der()
            .map_err(|e| ConfigurationError::InvalidKey(format!("P-384 key encoding failed: {e}")))?;
        Self::from_ec_parts(
            EcCurve::P384,
            point.x().map(|x| x.to_vec()),
            point.y().map(|y| y.to_vec()),
            der.as_bytes(),
        )
    }

    fn from_ec_parts(
        curve: EcCurve,
        x: Option<Vec<u8>>,
        y: Option<Vec<u8>>,
        der: &[u8],
    ) -> Result<Self, ConfigurationError> {
        let (Some(x), Some(y)) = (x, y) else {
            return Err(ConfigurationError::InvalidKey(format!(
                "{curve} public key is the identity point"
            )));
        };
        Ok(Self::assemble(
            PublicKeyMaterial::Ec { curve, x, y },
            PrivateKeyMaterial::Ec(Zeroizing::new(der.to_vec())),
        ))
    }

    fn assemble(public: PublicKeyMaterial, private: PrivateKeyMaterial) -> Self {
        let thumbprint = compute_thumbprint(&public);
        Self {
            public,
            private,
            key_id: None,
            thumbprint,
        }
    }

    /// Attach a key identifier (`kid`)
    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    /// Mark the private half as held externally, so its presence cannot be introspected
    pub fn with_external_private_key(mut self) -> Self {
        if matches!(self.private, PrivateKeyMaterial::Absent) {
            self.private = PrivateKeyMaterial::Opaque;
        }
        self
    }

    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    pub fn public_key(&self) -> &PublicKeyMaterial {
        &self.public
    }

    pub fn curve(&self) -> Option<EcCurve> {
        match &self.public {
            PublicKeyMaterial::Ec { curve, .. } => Some(*curve),
            PublicKeyMaterial::Rsa { .. } => None,
        }
    }

    /// Modulus length for RSA, field size for EC
    pub fn key_size(&self) -> usize {
        match &self.public {
            PublicKeyMaterial::Rsa { n, .. } => match n.first() {
                Some(first) => (n.len() - 1) * 8 + (8 - first.leading_zeros() as usize),
                None => 0,
            },
            PublicKeyMaterial::Ec { curve, .. } => curve.key_size(),
        }
    }

    pub fn private_key_status(&self) -> PrivateKeyExistence {
        match self.private {
            PrivateKeyMaterial::Absent => PrivateKeyExistence::No,
            PrivateKeyMaterial::Rsa(_) | PrivateKeyMaterial::Ec(_) => PrivateKeyExistence::Yes,
            PrivateKeyMaterial::Opaque => PrivateKeyExistence::Unknown,
        }
    }

    pub(crate) fn private_material(&self) -> &PrivateKeyMaterial {
        &self.private
    }

    pub(crate) fn kty(&self) -> &'static str {
        match self.public {
            PublicKeyMaterial::Rsa { .. } => "RSA",
            PublicKeyMaterial::Ec { .. } => "EC",
        }
    }

    /// Algorithms this key type can serve at all, ignoring key length
    pub(crate) fn supports(&self, algorithm: Algorithm) -> bool {
        match (&self.public, algorithm.family()) {
            (
                PublicKeyMaterial::Rsa { .. },
                AlgorithmFamily::Rsa | AlgorithmFamily::RsaPss | AlgorithmFamily::RsaKeyWrap,
            ) => true,
            (PublicKeyMaterial::Ec { curve, .. }, AlgorithmFamily::Ecdsa) => {
                algorithm.curve() == Some(*curve)
            }
            (PublicKeyMaterial::Ec { .. }, AlgorithmFamily::EcdhEs) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for AsymmetricSecurityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsymmetricSecurityKey")
            .field("kty", &self.kty())
            .field("key_id", &self.key_id)
            .field("key_size", &self.key_size())
            .field("private_key", &self.private_key_status())
            .field("thumbprint", &self.thumbprint)
            .finish_non_exhaustive()
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

/// RFC 7638 thumbprint over the required public members, in lexicographic order
fn compute_thumbprint(public: &PublicKeyMaterial) -> String {
    let canonical = match public {
        PublicKeyMaterial::Rsa { n, e } => serde_json::json!({
            "e": URL_SAFE_NO_PAD.encode(e),
            "kty": "RSA",
            "n": URL_SAFE_NO_PAD.encode(n),
        }),
        PublicKeyMaterial::Ec { curve, x, y } => serde_json::json!({
            "crv": curve.as_str(),
            "kty": "EC",
            "x": URL_SAFE_NO_PAD.encode(x),
            "y": URL_SAFE_NO_PAD.encode(y),
        }),
    };
    URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.to_string().as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc7638_example_thumbprint() {
        // RFC 7638 section 3.1
        let n = URL_SAFE_NO_PAD
            .decode(
                "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw",
            )
            .unwrap();
        let e = URL_SAFE_NO_PAD.decode("AQAB").unwrap();
        let key = AsymmetricSecurityKey::from_rsa_components(&n, &e).unwrap();

        assert_eq!(
            key.thumbprint(),
            "NzbLsXh8uDCcd-6MNwXF4W_7noWXFZAfHkxZsRGC9Xs"
        );
        assert_eq!(key.key_size(), 2048);
        assert_eq!(key.private_key_status(), PrivateKeyExistence::No);
    }

    #[test]
    fn test_ec_key_from_secret() {
        let secret = p256::SecretKey::random(&mut rand::rngs::OsRng);
        let key = AsymmetricSecurityKey::from_p256_secret(&secret).unwrap();

        assert_eq!(key.private_key_status(), PrivateKeyExistence::Yes);
        assert_eq!(key.curve(), Some(EcCurve::P256));
        assert_eq!(key.key_size(), 256);
        assert!(key.supports(Algorithm::ES256));
        assert!(!key.supports(Algorithm::ES384));
        assert!(key.supports(Algorithm::EcdhEsA128KW));
        assert!(!key.supports(Algorithm::RS256));

        let PublicKeyMaterial::Ec { x, y, .. } = key.public_key().clone() else {
            panic!("expected EC material");
        };
        let public = AsymmetricSecurityKey::from_ec_coordinates(EcCurve::P256, &x, &y).unwrap();
        assert_eq!(public.thumbprint(), key.thumbprint());
        assert_eq!(public.private_key_status(), PrivateKeyExistence::No);
    }

    #[test]
    fn test_ec_point_validation() {
        let result = AsymmetricSecurityKey::from_ec_coordinates(EcCurve::P256, &[1u8; 32], &[2u8; 32]);
        assert!(matches!(result, Err(ConfigurationError::InvalidKey(_))));

        let result = AsymmetricSecurityKey::from_ec_coordinates(EcCurve::P384, &[1u8; 32], &[2u8; 32]);
        assert!(matches!(result, Err(ConfigurationError::InvalidKey(_))));
    }

    #[test]
    fn test_external_private_key_is_unknown() {
        let key = AsymmetricSecurityKey::from_rsa_components(&[0xC5; 256], &[1, 0, 1])
            .unwrap()
            .with_external_private_key();
        assert_eq!(key.private_key_status(), PrivateKeyExistence::Unknown);
    }
}
