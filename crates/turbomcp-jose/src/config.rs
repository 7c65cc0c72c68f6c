//! Declarative validation configuration
//!
//! [`ValidationConfig`] is the serializable subset of [`ValidationParameters`]: trust
//! values, step toggles, limits and keys as JWK JSON. Delegates and resolvers cannot be
//! expressed here and are attached to the resulting parameters with the `with_*`
//! builders.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::algorithm::Algorithm;
use crate::error::ConfigurationError;
use crate::key::{JsonWebKey, SecurityKey};
use crate::token::DEFAULT_MAXIMUM_TOKEN_SIZE;
use crate::validation::{DEFAULT_CLOCK_SKEW, DEFAULT_NESTED_TOKEN_DEPTH, ValidationParameters};

/// Token validation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Accepted `iss` values
    pub valid_issuers: Vec<String>,
    /// Accepted `aud` values
    pub valid_audiences: Vec<String>,
    /// Accepted `alg` names; unset accepts every supported algorithm except `none`
    pub valid_algorithms: Option<Vec<String>>,
    /// Clock skew tolerance in seconds
    pub clock_skew_seconds: u64,

    pub validate_lifetime: bool,
    pub validate_issuer: bool,
    pub validate_audience: bool,
    pub validate_signature: bool,
    pub validate_token_replay: bool,
    pub require_signed_tokens: bool,
    pub require_expiration_time: bool,
    pub require_audience: bool,
    pub require_token_id: bool,

    /// Levels of nesting allowed below the outer token
    pub nested_token_depth: usize,
    /// Upper bound on the encoded token, in bytes
    pub maximum_token_size: usize,

    /// Signature verification keys
    pub signing_keys: Vec<JsonWebKey>,
    /// JWE decryption keys
    pub decryption_keys: Vec<JsonWebKey>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            valid_issuers: Vec::new(),
            valid_audiences: Vec::new(),
            valid_algorithms: None,
            clock_skew_seconds: DEFAULT_CLOCK_SKEW.as_secs(),
            validate_lifetime: true,
            validate_issuer: true,
            validate_audience: true,
            validate_signature: true,
            validate_token_replay: true,
            require_signed_tokens: true,
            require_expiration_time: true,
            require_audience: true,
            require_token_id: false,
            nested_token_depth: DEFAULT_NESTED_TOKEN_DEPTH,
            maximum_token_size: DEFAULT_MAXIMUM_TOKEN_SIZE,
            signing_keys: Vec::new(),
            decryption_keys: Vec::new(),
        }
    }
}

impl ValidationConfig {
    /// Parse from a JSON document
    ///
    /// # Errors
    /// Returns [`ConfigurationError::InvalidConfiguration`] if the JSON does not match.
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        serde_json::from_str(json)
            .map_err(|e| ConfigurationError::InvalidConfiguration(format!("invalid validation config: {e}")))
    }

    /// Build [`ValidationParameters`]
    ///
    /// # Errors
    /// Returns [`ConfigurationError`] for unknown algorithm names, unusable JWKs, or a
    /// zero maximum token size.
    pub fn into_parameters(self) -> Result<ValidationParameters, ConfigurationError> {
        if self.maximum_token_size == 0 {
            return Err(ConfigurationError::InvalidConfiguration(
                "maximum_token_size must be greater than zero".to_string(),
            ));
        }

        let valid_algorithms = self
            .valid_algorithms
            .map(|names| {
                names
                    .iter()
                    .map(|name| name.parse::<Algorithm>())
                    .collect::<Result<HashSet<_>, _>>()
            })
            .transpose()?;

        let signing_keys = to_security_keys(&self.signing_keys)?;
        let decryption_keys = to_security_keys(&self.decryption_keys)?;
        debug!(
            signing_keys = signing_keys.len(),
            decryption_keys = decryption_keys.len(),
            issuers = self.valid_issuers.len(),
            audiences = self.valid_audiences.len(),
            "Built validation parameters from configuration"
        );

        Ok(ValidationParameters {
            valid_issuers: self.valid_issuers,
            valid_audiences: self.valid_audiences,
            issuer_signing_keys: signing_keys,
            token_decryption_keys: decryption_keys,
            valid_algorithms,
            clock_skew: Duration::from_secs(self.clock_skew_seconds),
            validate_lifetime: self.validate_lifetime,
            validate_issuer: self.validate_issuer,
            validate_audience: self.validate_audience,
            validate_signature: self.validate_signature,
            validate_token_replay: self.validate_token_replay,
            require_signed_tokens: self.require_signed_tokens,
            require_expiration_time: self.require_expiration_time,
            require_audience: self.require_audience,
            require_token_id: self.require_token_id,
            nested_token_depth: self.nested_token_depth,
            maximum_token_size: self.maximum_token_size,
            ..ValidationParameters::default()
        })
    }
}

fn to_security_keys(jwks: &[JsonWebKey]) -> Result<Vec<Arc<SecurityKey>>, ConfigurationError> {
    jwks.iter()
        .map(|jwk| jwk.to_security_key().map(Arc::new))
        .collect()
}
