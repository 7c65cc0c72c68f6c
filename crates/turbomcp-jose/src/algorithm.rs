//! JSON Web Algorithms (RFC 7518) identifiers
//!
//! [`Algorithm`] covers the `alg` header namespace, which JWS signature algorithms and
//! JWE key-management algorithms share. [`EncryptionAlgorithm`] covers the JWE `enc`
//! header.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ConfigurationError;

/// Broad family an [`Algorithm`] belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmFamily {
    /// HMAC with SHA-2
    Hmac,
    /// RSASSA-PKCS1-v1_5 with SHA-2
    Rsa,
    /// RSASSA-PSS with SHA-2
    RsaPss,
    /// ECDSA with SHA-2
    Ecdsa,
    /// Unsecured JWS (`none`)
    Unsecured,
    /// Direct use of a shared symmetric key as the CEK
    Direct,
    /// RSAES-OAEP key wrapping
    RsaKeyWrap,
    /// AES key wrap (RFC 3394)
    AesKeyWrap,
    /// ECDH-ES key agreement, optionally followed by AES key wrap
    EcdhEs,
}

/// JWA `alg` header values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    HS256,
    HS384,
    HS512,
    RS256,
    RS384,
    RS512,
    PS256,
    PS384,
    PS512,
    ES256,
    ES384,
    None,
    Dir,
    RsaOaep,
    RsaOaep256,
    A128KW,
    A192KW,
    A256KW,
    EcdhEs,
    EcdhEsA128KW,
    EcdhEsA192KW,
    EcdhEsA256KW,
}

impl Algorithm {
    /// Every algorithm this engine understands, in a stable order
    pub const ALL: [Algorithm; 22] = [
        Algorithm::HS256,
        Algorithm::HS384,
        Algorithm::HS512,
        Algorithm::RS256,
        Algorithm::RS384,
        Algorithm::RS512,
        Algorithm::PS256,
        Algorithm::PS384,
        Algorithm::PS512,
        Algorithm::ES256,
        Algorithm::ES384,
        Algorithm::None,
        Algorithm::Dir,
        Algorithm::RsaOaep,
        Algorithm::RsaOaep256,
        Algorithm::A128KW,
        Algorithm::A192KW,
        Algorithm::A256KW,
        Algorithm::EcdhEs,
        Algorithm::EcdhEsA128KW,
        Algorithm::EcdhEsA192KW,
        Algorithm::EcdhEsA256KW,
    ];

    /// Get the algorithm name as specified in RFC 7518
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HS256 => "HS256",
            Self::HS384 => "HS384",
            Self::HS512 => "HS512",
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::RS512 => "RS512",
            Self::PS256 => "PS256",
            Self::PS384 => "PS384",
            Self::PS512 => "PS512",
            Self::ES256 => "ES256",
            Self::ES384 => "ES384",
            Self::None => "none",
            Self::Dir => "dir",
            Self::RsaOaep => "RSA-OAEP",
            Self::RsaOaep256 => "RSA-OAEP-256",
            Self::A128KW => "A128KW",
            Self::A192KW => "A192KW",
            Self::A256KW => "A256KW",
            Self::EcdhEs => "ECDH-ES",
            Self::EcdhEsA128KW => "ECDH-ES+A128KW",
            Self::EcdhEsA192KW => "ECDH-ES+A192KW",
            Self::EcdhEsA256KW => "ECDH-ES+A256KW",
        }
    }

    pub fn family(self) -> AlgorithmFamily {
        match self {
            Self::HS256 | Self::HS384 | Self::HS512 => AlgorithmFamily::Hmac,
            Self::RS256 | Self::RS384 | Self::RS512 => AlgorithmFamily::Rsa,
            Self::PS256 | Self::PS384 | Self::PS512 => AlgorithmFamily::RsaPss,
            Self::ES256 | Self::ES384 => AlgorithmFamily::Ecdsa,
            Self::None => AlgorithmFamily::Unsecured,
            Self::Dir => AlgorithmFamily::Direct,
            Self::RsaOaep | Self::RsaOaep256 => AlgorithmFamily::RsaKeyWrap,
            Self::A128KW | Self::A192KW | Self::A256KW => AlgorithmFamily::AesKeyWrap,
            Self::EcdhEs | Self::EcdhEsA128KW | Self::EcdhEsA192KW | Self::EcdhEsA256KW => {
                AlgorithmFamily::EcdhEs
            }
        }
    }

    /// True for JWS signature algorithms (including `none`)
    pub fn is_signing(self) -> bool {
        matches!(
            self.family(),
            AlgorithmFamily::Hmac
                | AlgorithmFamily::Rsa
                | AlgorithmFamily::RsaPss
                | AlgorithmFamily::Ecdsa
                | AlgorithmFamily::Unsecured
        )
    }

    /// True for JWE key-management algorithms
    pub fn is_key_management(self) -> bool {
        !self.is_signing()
    }

    /// Minimum key size in bits this engine accepts for the algorithm
    pub fn minimum_key_size(self) -> usize {
        match self {
            Self::HS256 => 256,
            Self::HS384 => 384,
            Self::HS512 => 512,
            Self::RS256
            | Self::RS384
            | Self::RS512
            | Self::PS256
            | Self::PS384
            | Self::PS512
            | Self::RsaOaep
            | Self::RsaOaep256 => 2048,
            Self::ES256 => 256,
            Self::ES384 => 384,
            Self::A128KW => 128,
            Self::A192KW => 192,
            Self::A256KW => 256,
            Self::EcdhEs | Self::EcdhEsA128KW | Self::EcdhEsA192KW | Self::EcdhEsA256KW => 256,
            Self::None | Self::Dir => 0,
        }
    }

    /// Curve required by ECDSA signature algorithms
    pub fn curve(self) -> Option<EcCurve> {
        match self {
            Self::ES256 => Some(EcCurve::P256),
            Self::ES384 => Some(EcCurve::P384),
            _ => None,
        }
    }

    /// Key-encryption key length in bytes for AES key wrap, either direct or after ECDH-ES
    pub fn key_wrap_length(self) -> Option<usize> {
        match self {
            Self::A128KW | Self::EcdhEsA128KW => Some(16),
            Self::A192KW | Self::EcdhEsA192KW => Some(24),
            Self::A256KW | Self::EcdhEsA256KW => Some(32),
            _ => None,
        }
    }

    /// Map to the jsonwebtoken algorithm used for signing and verification
    pub(crate) fn to_jwt(self) -> Option<jsonwebtoken::Algorithm> {
        match self {
            Self::HS256 => Some(jsonwebtoken::Algorithm::HS256),
            Self::HS384 => Some(jsonwebtoken::Algorithm::HS384),
            Self::HS512 => Some(jsonwebtoken::Algorithm::HS512),
            Self::RS256 => Some(jsonwebtoken::Algorithm::RS256),
            Self::RS384 => Some(jsonwebtoken::Algorithm::RS384),
            Self::RS512 => Some(jsonwebtoken::Algorithm::RS512),
            Self::PS256 => Some(jsonwebtoken::Algorithm::PS256),
            Self::PS384 => Some(jsonwebtoken::Algorithm::PS384),
            Self::PS512 => Some(jsonwebtoken::Algorithm::PS512),
            Self::ES256 => Some(jsonwebtoken::Algorithm::ES256),
            Self::ES384 => Some(jsonwebtoken::Algorithm::ES384),
            _ => None,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|alg| alg.as_str() == s)
            .ok_or_else(|| ConfigurationError::UnknownAlgorithm(s.to_string()))
    }
}

impl Serialize for Algorithm {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Algorithm {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// JWA `enc` header values (content encryption)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncryptionAlgorithm {
    A128Gcm,
    A192Gcm,
    A256Gcm,
    A128CbcHs256,
    A192CbcHs384,
    A256CbcHs512,
}

impl EncryptionAlgorithm {
    pub const ALL: [EncryptionAlgorithm; 6] = [
        EncryptionAlgorithm::A128Gcm,
        EncryptionAlgorithm::A192Gcm,
        EncryptionAlgorithm::A256Gcm,
        EncryptionAlgorithm::A128CbcHs256,
        EncryptionAlgorithm::A192CbcHs384,
        EncryptionAlgorithm::A256CbcHs512,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::A128Gcm => "A128GCM",
            Self::A192Gcm => "A192GCM",
            Self::A256Gcm => "A256GCM",
            Self::A128CbcHs256 => "A128CBC-HS256",
            Self::A192CbcHs384 => "A192CBC-HS384",
            Self::A256CbcHs512 => "A256CBC-HS512",
        }
    }

    /// Content encryption key length in bytes
    pub fn key_length(self) -> usize {
        match self {
            Self::A128Gcm => 16,
            Self::A192Gcm => 24,
            Self::A256Gcm | Self::A128CbcHs256 => 32,
            Self::A192CbcHs384 => 48,
            Self::A256CbcHs512 => 64,
        }
    }

    /// Initialization vector length in bytes
    pub fn iv_length(self) -> usize {
        if self.is_gcm() { 12 } else { 16 }
    }

    /// Authentication tag length in bytes
    pub fn tag_length(self) -> usize {
        match self {
            Self::A128Gcm | Self::A192Gcm | Self::A256Gcm => 16,
            Self::A128CbcHs256 => 16,
            Self::A192CbcHs384 => 24,
            Self::A256CbcHs512 => 32,
        }
    }

    pub fn is_gcm(self) -> bool {
        matches!(self, Self::A128Gcm | Self::A192Gcm | Self::A256Gcm)
    }
}

impl fmt::Display for EncryptionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EncryptionAlgorithm {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|enc| enc.as_str() == s)
            .ok_or_else(|| ConfigurationError::UnknownAlgorithm(s.to_string()))
    }
}

/// Elliptic curves supported for ECDSA and ECDH-ES
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EcCurve {
    P256,
    P384,
}

impl EcCurve {
    /// Curve name as used in the JWK `crv` member
    pub fn as_str(self) -> &'static str {
        match self {
            Self::P256 => "P-256",
            Self::P384 => "P-384",
        }
    }

    /// Length of one affine coordinate in bytes
    pub fn coordinate_length(self) -> usize {
        match self {
            Self::P256 => 32,
            Self::P384 => 48,
        }
    }

    pub fn key_size(self) -> usize {
        self.coordinate_length() * 8
    }
}

impl fmt::Display for EcCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EcCurve {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "P-256" => Ok(Self::P256),
            "P-384" => Ok(Self::P384),
            other => Err(ConfigurationError::InvalidKey(format!(
                "unsupported elliptic curve: {other}"
            ))),
        }
    }
}
