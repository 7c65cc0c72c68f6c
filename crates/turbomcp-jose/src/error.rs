//! Error types for token validation
//!
//! Two channels are kept strictly apart:
//!
//! - [`ConfigurationError`] signals misuse of the engine (no keys supplied, a key that
//!   can never work with the requested algorithm). It is returned as `Err` and callers
//!   should treat it as fatal.
//! - [`TokenValidationError`] describes why a token was rejected during normal
//!   operation. It is carried inside a [`TokenValidationResult`](crate::TokenValidationResult)
//!   and never returned as `Err` from validation.

use std::fmt;

use thiserror::Error;

/// Errors caused by the caller's configuration rather than by the token
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("No issuer signing keys were supplied")]
    NoSigningKeys,

    #[error("No token decryption keys were supplied")]
    NoDecryptionKeys,

    #[error("Algorithm '{algorithm}' is not supported for {key_type} keys")]
    UnsupportedAlgorithm { algorithm: String, key_type: String },

    #[error("Unknown algorithm identifier: {0}")]
    UnknownAlgorithm(String),

    #[error("Key size {actual_bits} bits is below the {minimum_bits}-bit minimum for '{algorithm}'")]
    KeyTooShort {
        algorithm: String,
        minimum_bits: usize,
        actual_bits: usize,
    },

    #[error("Algorithm '{algorithm}' requires a private key")]
    MissingPrivateKey { algorithm: String },

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Invalid validation configuration: {0}")]
    InvalidConfiguration(String),
}

impl ConfigurationError {
    /// Get error category for metrics and logging
    pub fn category(&self) -> &'static str {
        match self {
            ConfigurationError::NoSigningKeys => "no_signing_keys",
            ConfigurationError::NoDecryptionKeys => "no_decryption_keys",
            ConfigurationError::UnsupportedAlgorithm { .. } => "unsupported_algorithm",
            ConfigurationError::UnknownAlgorithm(_) => "unknown_algorithm",
            ConfigurationError::KeyTooShort { .. } => "key_too_short",
            ConfigurationError::MissingPrivateKey { .. } => "missing_private_key",
            ConfigurationError::InvalidKey(_) => "invalid_key",
            ConfigurationError::InvalidConfiguration(_) => "invalid_configuration",
        }
    }
}

/// Which claim check rejected the token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClaimKind {
    Lifetime,
    Issuer,
    Audience,
    SigningKey,
    Replay,
}

/// Coarse classification of a [`TokenValidationError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationErrorKind {
    MalformedToken,
    UnsupportedAlgorithm,
    SignatureRequired,
    SignatureInvalid,
    DecryptionFailed,
    NestedDepthExceeded,
    ClaimInvalid(ClaimKind),
}

/// Why a single candidate key did not validate or decrypt the token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAttemptFailure {
    /// The token algorithm is not accepted, or the key is bound to another algorithm
    AlgorithmNotAccepted,
    /// A verify provider was built but the signature did not match
    SignatureMismatch,
    /// Key unwrap, key agreement or authenticated decryption failed
    DecryptionMismatch,
    /// No provider could be built for this key and algorithm
    ProviderUnavailable(ConfigurationError),
}

impl fmt::Display for KeyAttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAttemptFailure::AlgorithmNotAccepted => write!(f, "algorithm not accepted"),
            KeyAttemptFailure::SignatureMismatch => write!(f, "signature mismatch"),
            KeyAttemptFailure::DecryptionMismatch => write!(f, "decryption failed"),
            KeyAttemptFailure::ProviderUnavailable(e) => write!(f, "provider unavailable: {e}"),
        }
    }
}

/// Diagnostic record for one candidate key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAttempt {
    /// Position of the key in the candidate list (configured keys first, resolved keys after)
    pub index: usize,
    /// The key's `kid`, if it has one
    pub key_id: Option<String>,
    /// Why this key was not accepted
    pub reason: KeyAttemptFailure,
}

impl fmt::Display for KeyAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key_id {
            Some(kid) => write!(f, "key #{} (kid '{}'): {}", self.index, kid, self.reason),
            None => write!(f, "key #{}: {}", self.index, self.reason),
        }
    }
}

/// Expected token rejections
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Algorithm not accepted: {0}")]
    InvalidAlgorithm(String),

    #[error("Token is unsigned but signed tokens are required")]
    SignatureRequired,

    #[error("Signature validation failed for all {} candidate key(s)", .attempts.len())]
    SignatureInvalid { attempts: Vec<KeyAttempt> },

    #[error("Token decryption failed")]
    DecryptionFailed { attempts: Vec<KeyAttempt> },

    #[error("Nested token depth exceeded (limit {limit})")]
    NestedDepthExceeded { limit: usize },

    #[error("Token expired at {expires_at} (now {now})")]
    Expired { expires_at: i64, now: i64 },

    #[error("Token not valid before {not_before} (now {now})")]
    NotYetValid { not_before: i64, now: i64 },

    #[error("Token has no expiration time")]
    MissingExpiration,

    #[error("Invalid token lifetime: {0}")]
    InvalidLifetime(String),

    #[error("Invalid issuer: {0}")]
    InvalidIssuer(String),

    #[error("Invalid audience: {0}")]
    InvalidAudience(String),

    #[error("Signing key rejected: {0}")]
    InvalidSigningKey(String),

    #[error("Token replay detected for jti '{token_id}'")]
    Replayed { token_id: String },

    #[error("Token has no jti but replay detection requires one")]
    MissingTokenId,
}

impl TokenValidationError {
    /// Classify the error into the engine's error taxonomy
    pub fn kind(&self) -> ValidationErrorKind {
        match self {
            TokenValidationError::Malformed(_) => ValidationErrorKind::MalformedToken,
            TokenValidationError::UnsupportedAlgorithm(_)
            | TokenValidationError::InvalidAlgorithm(_) => ValidationErrorKind::UnsupportedAlgorithm,
            TokenValidationError::SignatureRequired => ValidationErrorKind::SignatureRequired,
            TokenValidationError::SignatureInvalid { .. } => ValidationErrorKind::SignatureInvalid,
            TokenValidationError::DecryptionFailed { .. } => ValidationErrorKind::DecryptionFailed,
            TokenValidationError::NestedDepthExceeded { .. } => {
                ValidationErrorKind::NestedDepthExceeded
            }
            TokenValidationError::Expired { .. }
            | TokenValidationError::NotYetValid { .. }
            | TokenValidationError::MissingExpiration
            | TokenValidationError::InvalidLifetime(_) => {
                ValidationErrorKind::ClaimInvalid(ClaimKind::Lifetime)
            }
            TokenValidationError::InvalidIssuer(_) => {
                ValidationErrorKind::ClaimInvalid(ClaimKind::Issuer)
            }
            TokenValidationError::InvalidAudience(_) => {
                ValidationErrorKind::ClaimInvalid(ClaimKind::Audience)
            }
            TokenValidationError::InvalidSigningKey(_) => {
                ValidationErrorKind::ClaimInvalid(ClaimKind::SigningKey)
            }
            TokenValidationError::Replayed { .. } | TokenValidationError::MissingTokenId => {
                ValidationErrorKind::ClaimInvalid(ClaimKind::Replay)
            }
        }
    }

    /// Get error category for metrics and logging
    pub fn category(&self) -> &'static str {
        match self.kind() {
            ValidationErrorKind::MalformedToken => "malformed_token",
            ValidationErrorKind::UnsupportedAlgorithm => "unsupported_algorithm",
            ValidationErrorKind::SignatureRequired => "signature_required",
            ValidationErrorKind::SignatureInvalid => "signature_invalid",
            ValidationErrorKind::DecryptionFailed => "decryption_failed",
            ValidationErrorKind::NestedDepthExceeded => "nested_depth_exceeded",
            ValidationErrorKind::ClaimInvalid(ClaimKind::Lifetime) => "invalid_lifetime",
            ValidationErrorKind::ClaimInvalid(ClaimKind::Issuer) => "invalid_issuer",
            ValidationErrorKind::ClaimInvalid(ClaimKind::Audience) => "invalid_audience",
            ValidationErrorKind::ClaimInvalid(ClaimKind::SigningKey) => "invalid_signing_key",
            ValidationErrorKind::ClaimInvalid(ClaimKind::Replay) => "token_replay",
        }
    }

    /// Per-candidate diagnostics for signature and decryption failures
    pub fn key_attempts(&self) -> &[KeyAttempt] {
        match self {
            TokenValidationError::SignatureInvalid { attempts }
            | TokenValidationError::DecryptionFailed { attempts } => attempts,
            _ => &[],
        }
    }

    /// True when at least one candidate key reached the cryptographic check and failed it.
    ///
    /// Separates "keys configured but none verify" from "no usable key configured".
    pub fn had_cryptographic_mismatch(&self) -> bool {
        self.key_attempts().iter().any(|a| {
            matches!(
                a.reason,
                KeyAttemptFailure::SignatureMismatch | KeyAttemptFailure::DecryptionMismatch
            )
        })
    }
}

/// Internal failure channel used while a token moves through the engine.
///
/// `?` lifts both error kinds; the handler splits them again at the public boundary.
#[derive(Debug)]
pub(crate) enum Failure {
    Invalid(TokenValidationError),
    Fatal(ConfigurationError),
}

impl From<TokenValidationError> for Failure {
    fn from(error: TokenValidationError) -> Self {
        Failure::Invalid(error)
    }
}

impl From<ConfigurationError> for Failure {
    fn from(error: ConfigurationError) -> Self {
        Failure::Fatal(error)
    }
}
