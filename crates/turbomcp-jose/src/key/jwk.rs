//! JSON Web Key (RFC 7517) documents
//!
//! A [`JsonWebKey`] is the wire representation. [`JsonWebSecurityKey`] is the same
//! document normalized into RSA, EC or shared-secret form, ready for the crypto layer.
//! The JWK's `use`, `key_ops` and `alg` members restrict what the normalized key may do.

use std::fmt;
use std::sync::Arc;

use base64::{
    Engine as _,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use rsa::BigUint;
use serde::{Deserialize, Serialize};
use sha1::{Digest as _, Sha1};
use tracing::warn;

use super::{KeyUsage, SecurityKey};
use crate::algorithm::{Algorithm, AlgorithmFamily, EcCurve};
use crate::error::ConfigurationError;
use crate::key::asymmetric::AsymmetricSecurityKey;
use crate::key::symmetric::SymmetricSecurityKey;

/// JWK document fields consumed by the engine
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKey {
    pub kty: String,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_ops: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x5t: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x5c: Option<Vec<String>>,

    // RSA
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dq: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qi: Option<String>,

    // EC
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,

    // oct
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<String>,
}

impl JsonWebKey {
    /// Parse a single JWK from JSON
    ///
    /// # Errors
    /// Returns [`ConfigurationError::InvalidKey`] for malformed JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        serde_json::from_str(json)
            .map_err(|e| ConfigurationError::InvalidKey(format!("invalid JWK JSON: {e}")))
    }

    /// Whether the members required for an RFC 7638 thumbprint are present
    pub fn can_compute_thumbprint(&self) -> bool {
        match self.kty.as_str() {
            "RSA" => self.n.is_some() && self.e.is_some(),
            "EC" => self.crv.is_some() && self.x.is_some() && self.y.is_some(),
            "oct" => self.k.is_some(),
            _ => false,
        }
    }

    /// Normalize into a usable security key
    ///
    /// # Errors
    /// Returns [`ConfigurationError`] if required members are missing, a member is not
    /// valid base64url, the key type or curve is unsupported, or the `alg` member names an
    /// unknown algorithm.
    pub fn to_security_key(&self) -> Result<SecurityKey, ConfigurationError> {
        Ok(SecurityKey::JsonWebKey(JsonWebSecurityKey::new(self.clone())?))
    }
}

impl fmt::Debug for JsonWebKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonWebKey")
            .field("kty", &self.kty)
            .field("use", &self.key_use)
            .field("alg", &self.alg)
            .field("kid", &self.kid)
            .field("crv", &self.crv)
            .field("has_private", &(self.d.is_some() || self.k.is_some()))
            .finish_non_exhaustive()
    }
}

/// A JWK normalized into RSA, EC or shared-secret form
#[derive(Debug, Clone)]
pub struct JsonWebSecurityKey {
    jwk: JsonWebKey,
    resolved: ResolvedKey,
    algorithm: Option<Algorithm>,
    x5t: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) enum ResolvedKey {
    Symmetric(SymmetricSecurityKey),
    Asymmetric(AsymmetricSecurityKey),
}

impl JsonWebSecurityKey {
    /// # Errors
    /// See [`JsonWebKey::to_security_key`].
    pub fn new(jwk: JsonWebKey) -> Result<Self, ConfigurationError> {
        let algorithm = jwk.alg.as_deref().map(str::parse::<Algorithm>).transpose()?;

        let resolved = match jwk.kty.as_str() {
            "oct" => {
                let k = decode_member(&jwk.k, "k")?;
                ResolvedKey::Symmetric(SymmetricSecurityKey::new(k)?)
            }
            "RSA" => ResolvedKey::Asymmetric(resolve_rsa(&jwk)?),
            "EC" => ResolvedKey::Asymmetric(resolve_ec(&jwk)?),
            other => {
                return Err(ConfigurationError::InvalidKey(format!(
                    "unsupported JWK key type: {other}"
                )));
            }
        };

        let x5t = match (&jwk.x5t, &jwk.x5c) {
            (Some(x5t), _) => Some(x5t.clone()),
            (None, Some(chain)) => chain.first().map(|leaf| certificate_thumbprint(leaf)).transpose()?,
            (None, None) => None,
        };

        Ok(Self {
            jwk,
            resolved,
            algorithm,
            x5t,
        })
    }

    pub fn jwk(&self) -> &JsonWebKey {
        &self.jwk
    }

    pub fn key_id(&self) -> Option<&str> {
        self.jwk.kid.as_deref()
    }

    /// `x5t` member, or SHA-1 of the first `x5c` certificate
    pub fn x5t(&self) -> Option<&str> {
        self.x5t.as_deref()
    }

    /// Algorithm the JWK is bound to via its `alg` member
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    pub(crate) fn resolved(&self) -> &ResolvedKey {
        &self.resolved
    }

    /// Apply the `alg`, `use` and `key_ops` restrictions of the document
    pub(crate) fn permits(&self, algorithm: Algorithm, usage: KeyUsage) -> bool {
        if self.algorithm.is_some_and(|bound| bound != algorithm) {
            return false;
        }

        let signing_usage = matches!(usage, KeyUsage::Sign | KeyUsage::Verify);
        match self.jwk.key_use.as_deref() {
            Some("sig") if !signing_usage => return false,
            Some("enc") if signing_usage => return false,
            _ => {}
        }

        match &self.jwk.key_ops {
            None => true,
            Some(ops) => {
                let allowed = |op: &str| ops.iter().any(|o| o == op);
                if algorithm.family() == AlgorithmFamily::EcdhEs {
                    allowed("deriveKey") || allowed("deriveBits")
                } else {
                    allowed(usage.key_op())
                }
            }
        }
    }
}

fn decode_member(value: &Option<String>, name: &str) -> Result<Vec<u8>, ConfigurationError> {
    let encoded = value
        .as_deref()
        .ok_or_else(|| ConfigurationError::InvalidKey(format!("JWK is missing '{name}'")))?;
    URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| ConfigurationError::InvalidKey(format!("JWK member '{name}': {e}")))
}

fn resolve_rsa(jwk: &JsonWebKey) -> Result<AsymmetricSecurityKey, ConfigurationError> {
    let n = decode_member(&jwk.n, "n")?;
    let e = decode_member(&jwk.e, "e")?;

    let key = if jwk.d.is_some() {
        let d = decode_member(&jwk.d, "d")?;
        let primes = match (&jwk.p, &jwk.q) {
            (Some(_), Some(_)) => vec![
                BigUint::from_bytes_be(&decode_member(&jwk.p, "p")?),
                BigUint::from_bytes_be(&decode_member(&jwk.q, "q")?),
            ],
            _ => Vec::new(),
        };
        let private = rsa::RsaPrivateKey::from_components(
            BigUint::from_bytes_be(&n),
            BigUint::from_bytes_be(&e),
            BigUint::from_bytes_be(&d),
            primes,
        )
        .map_err(|e| ConfigurationError::InvalidKey(format!("invalid RSA private key: {e}")))?;
        AsymmetricSecurityKey::from_rsa_private_key(&private)?
    } else {
        AsymmetricSecurityKey::from_rsa_components(&n, &e)?
    };

    Ok(match &jwk.kid {
        Some(kid) => key.with_key_id(kid.clone()),
        None => key,
    })
}

fn resolve_ec(jwk: &JsonWebKey) -> Result<AsymmetricSecurityKey, ConfigurationError> {
    let curve: EcCurve = jwk
        .crv
        .as_deref()
        .ok_or_else(|| ConfigurationError::InvalidKey("JWK is missing 'crv'".to_string()))?
        .parse()?;
    let x = decode_member(&jwk.x, "x")?;
    let y = decode_member(&jwk.y, "y")?;
    let public = AsymmetricSecurityKey::from_ec_coordinates(curve, &x, &y)?;

    let key = if jwk.d.is_some() {
        let d = zeroize::Zeroizing::new(decode_member(&jwk.d, "d")?);
        let private = match curve {
            EcCurve::P256 => p256::SecretKey::from_slice(&d)
                .map_err(|_| ConfigurationError::InvalidKey("invalid P-256 scalar".to_string()))
                .and_then(|secret| AsymmetricSecurityKey::from_p256_secret(&secret))?,
            EcCurve::P384 => p384::SecretKey::from_slice(&d)
                .map_err(|_| ConfigurationError::InvalidKey("invalid P-384 scalar".to_string()))
                .and_then(|secret| AsymmetricSecurityKey::from_p384_secret(&secret))?,
        };
        if private.thumbprint() != public.thumbprint() {
            return Err(ConfigurationError::InvalidKey(
                "EC private scalar does not match the public coordinates".to_string(),
            ));
        }
        private
    } else {
        public
    };

    Ok(match &jwk.kid {
        Some(kid) => key.with_key_id(kid.clone()),
        None => key,
    })
}

/// base64url(SHA-1(DER)) of a base64 (standard alphabet) certificate from `x5c`
fn certificate_thumbprint(certificate: &str) -> Result<String, ConfigurationError> {
    let der = STANDARD
        .decode(certificate)
        .map_err(|e| ConfigurationError::InvalidKey(format!("invalid x5c certificate: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(Sha1::digest(&der)))
}

/// A JWK Set document (`{"keys": [...]}`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JsonWebKeySet {
    pub keys: Vec<JsonWebKey>,
}

impl JsonWebKeySet {
    /// # Errors
    /// Returns [`ConfigurationError::InvalidKey`] for malformed JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        serde_json::from_str(json)
            .map_err(|e| ConfigurationError::InvalidKey(format!("invalid JWK Set JSON: {e}")))
    }

    /// Normalize every key in the set, skipping keys that cannot be used
    pub fn security_keys(&self) -> Vec<Arc<SecurityKey>> {
        self.keys
            .iter()
            .filter_map(|jwk| match jwk.to_security_key() {
                Ok(key) => Some(Arc::new(key)),
                Err(e) => {
                    warn!(kid = ?jwk.kid, kty = %jwk.kty, error = %e, "Skipping unusable JWK");
                    None
                }
            })
            .collect()
    }
}
