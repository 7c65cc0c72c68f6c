//! Token handler: the single entry point for validation
//!
//! Drives a token through parse → (decrypt → nested) → signature → claims. The crypto
//! provider cache is owned by the handler, so one handler should be shared across
//! requests (it is cheap to clone) and tests can use an isolated one.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, error, warn};

use crate::algorithm::Algorithm;
use crate::crypto::CryptoProviderFactory;
use crate::error::{ConfigurationError, Failure, TokenValidationError};
use crate::key::SecurityKey;
use crate::result::{TokenValidationResult, ValidatedToken};
use crate::token::{self, Claims, DEFAULT_MAXIMUM_TOKEN_SIZE, JsonWebToken};
use crate::validation::ValidationParameters;
use crate::validation::decryption::decrypt_token;
use crate::validation::pipeline::validate_claims;
use crate::validation::signature::validate_signature;

/// Validates compact JWS and JWE tokens
///
/// # Example
///
/// ```rust
/// use turbomcp_jose::{JsonWebTokenHandler, SymmetricSecurityKey, ValidationParameters};
///
/// let handler = JsonWebTokenHandler::new();
/// let params = ValidationParameters::new()
///     .with_valid_issuer("https://issuer.example")
///     .with_valid_audience("https://api.example")
///     .with_signing_key(SymmetricSecurityKey::new(vec![0x42; 32])?);
///
/// let result = handler.validate_token("not.a.token", &params)?;
/// assert!(!result.is_valid());
/// # Ok::<(), turbomcp_jose::ConfigurationError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct JsonWebTokenHandler {
    providers: Arc<CryptoProviderFactory>,
}

/// One fully resolved layer of a token
struct Resolved {
    token: JsonWebToken,
    claims: Claims,
    algorithm: Option<Algorithm>,
    signing_key: Option<Arc<SecurityKey>>,
    decryption_key: Option<Arc<SecurityKey>>,
}

impl JsonWebTokenHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share a provider cache between handlers
    pub fn with_provider_factory(providers: Arc<CryptoProviderFactory>) -> Self {
        Self { providers }
    }

    pub fn providers(&self) -> &Arc<CryptoProviderFactory> {
        &self.providers
    }

    /// Syntactic check only; see [`token::can_read_token`]
    pub fn can_read_token(&self, token: &str) -> bool {
        token::can_read_token(token, DEFAULT_MAXIMUM_TOKEN_SIZE)
    }

    /// Parse a token without validating it
    ///
    /// # Errors
    /// Returns [`TokenValidationError::Malformed`] if the token does not parse.
    pub fn read_token(&self, token: &str) -> Result<JsonWebToken, TokenValidationError> {
        token::read_token(token)
    }

    /// Validate a token against `params` at the current time
    ///
    /// # Errors
    /// Returns [`ConfigurationError`] only for misconfiguration (no keys, a trust check
    /// enabled without trusted values). Token rejections are returned as
    /// [`TokenValidationResult::Invalid`].
    pub fn validate_token(
        &self,
        token: &str,
        params: &ValidationParameters,
    ) -> Result<TokenValidationResult, ConfigurationError> {
        self.validate_token_at(token, params, unix_now())
    }

    /// Validate a token as of `now` (seconds since the epoch)
    ///
    /// # Errors
    /// See [`JsonWebTokenHandler::validate_token`].
    pub fn validate_token_at(
        &self,
        token: &str,
        params: &ValidationParameters,
        now: i64,
    ) -> Result<TokenValidationResult, ConfigurationError> {
        match self.validate(token, params, now) {
            Ok(validated) => Ok(TokenValidationResult::Valid(Box::new(validated))),
            Err(Failure::Invalid(e)) => {
                warn!(category = e.category(), error = %e, "Token validation failed");
                Ok(TokenValidationResult::Invalid(e))
            }
            Err(Failure::Fatal(e)) => {
                error!(category = e.category(), error = %e, "Token validation misconfigured");
                Err(e)
            }
        }
    }

    fn validate(
        &self,
        token: &str,
        params: &ValidationParameters,
        now: i64,
    ) -> Result<ValidatedToken, Failure> {
        let resolved = self.resolve(token, params, 0)?;
        validate_claims(
            &resolved.claims,
            resolved.algorithm,
            resolved.signing_key.as_deref(),
            now,
            params,
        )?;

        debug!(
            encrypted = resolved.token.is_encrypted(),
            algorithm = ?resolved.algorithm,
            kid = ?resolved.signing_key.as_ref().and_then(|key| key.key_id()),
            "Token validated"
        );
        Ok(ValidatedToken {
            token: resolved.token,
            claims: resolved.claims,
            algorithm: resolved.algorithm,
            signing_key: resolved.signing_key,
            decryption_key: resolved.decryption_key,
        })
    }

    /// Parse one layer and verify or decrypt it. `depth` counts layers above this one.
    fn resolve(
        &self,
        encoded: &str,
        params: &ValidationParameters,
        depth: usize,
    ) -> Result<Resolved, Failure> {
        let token = JsonWebToken::parse_with_limit(encoded, params.maximum_token_size)?;

        if !token.is_encrypted() {
            let signing_key = validate_signature(&token, params, &self.providers)?;
            let algorithm = token.header().algorithm()?;
            let claims = token
                .claims()
                .cloned()
                .ok_or_else(|| TokenValidationError::Malformed("token has no payload".to_string()))?;
            return Ok(Resolved {
                token,
                claims,
                algorithm: Some(algorithm),
                signing_key,
                decryption_key: None,
            });
        }

        let decryption = decrypt_token(&token, params, &self.providers)?;
        let nested = std::str::from_utf8(&decryption.plaintext)
            .ok()
            .map(str::trim)
            .filter(|text| {
                token.header().announces_nested_jwt()
                    || token::can_read_token(text, params.maximum_token_size)
            });

        if let Some(inner) = nested {
            if depth + 1 > params.nested_token_depth {
                return Err(TokenValidationError::NestedDepthExceeded {
                    limit: params.nested_token_depth,
                }
                .into());
            }
            let inner = self.resolve(inner, params, depth + 1)?;
            return Ok(Resolved {
                token: token.with_inner_token(inner.token),
                claims: inner.claims,
                algorithm: inner.algorithm,
                signing_key: inner.signing_key,
                decryption_key: Some(decryption.key),
            });
        }

        let claims = Claims::from_json(&decryption.plaintext)?;
        if params.require_signed_tokens {
            return Err(TokenValidationError::SignatureRequired.into());
        }
        Ok(Resolved {
            token: token.with_decrypted_claims(claims.clone()),
            claims,
            algorithm: None,
            signing_key: None,
            decryption_key: Some(decryption.key),
        })
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationErrorKind;
    use crate::key::SymmetricSecurityKey;
    use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};

    fn params() -> ValidationParameters {
        ValidationParameters::new()
            .with_valid_issuer("https://issuer.example")
            .with_valid_audience("api")
            .with_signing_key(SymmetricSecurityKey::new(vec![0x42; 32]).unwrap())
    }

    fn unsecured(payload: &str) -> String {
        format!(
            "{}.{}.",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#),
            URL_SAFE_NO_PAD.encode(payload)
        )
    }

    #[test]
    fn test_malformed_token_never_reaches_providers() {
        let handler = JsonWebTokenHandler::new();
        for token in ["a.b.c.d", "!!!.e30.", "", "e30"] {
            let result = handler.validate_token(token, &params()).unwrap();
            assert_eq!(
                result.error().map(TokenValidationError::kind),
                Some(ValidationErrorKind::MalformedToken),
                "{token}"
            );
        }
        assert_eq!(handler.providers().cache_len(), 0);
    }

    #[test]
    fn test_unsecured_token_rejected_by_default() {
        let handler = JsonWebTokenHandler::new();
        let token = unsecured(r#"{"iss":"https://issuer.example","aud":"api","exp":4000000000}"#);

        let result = handler.validate_token(&token, &params()).unwrap();
        assert_eq!(result.error(), Some(&TokenValidationError::SignatureRequired));

        let relaxed = ValidationParameters {
            require_signed_tokens: false,
            ..params()
        };
        let result = handler.validate_token(&token, &relaxed).unwrap();
        assert!(result.is_valid());
        assert!(result.validated().is_some_and(|v| v.signing_key.is_none()));
    }

    #[test]
    fn test_missing_keys_is_configuration_error() {
        let handler = JsonWebTokenHandler::new();
        let token = format!(
            "{}.e30.c2ln",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256"}"#)
        );
        let no_keys = ValidationParameters::new().with_valid_issuer("i").with_valid_audience("a");
        assert_eq!(
            handler.validate_token(&token, &no_keys).unwrap_err(),
            ConfigurationError::NoSigningKeys
        );
    }

    #[test]
    fn test_can_read_token() {
        let handler = JsonWebTokenHandler::new();
        assert!(handler.can_read_token("eyJhbGciOiJub25lIn0.e30."));
        assert!(!handler.can_read_token("eyJhbGciOiJub25lIn0.e30"));
        assert!(handler.read_token("a.b.c.d").is_err());
    }
}
