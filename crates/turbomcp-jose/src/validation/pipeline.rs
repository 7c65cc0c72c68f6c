//! Claims validation pipeline
//!
//! Runs after the signature (and, for JWE, decryption) succeeded. Steps run in a fixed
//! order and the first failing step ends validation:
//!
//! 1. algorithm
//! 2. lifetime (`nbf`, `iat`, `exp` with clock skew)
//! 3. issuer
//! 4. audience
//! 5. signing key policy hook
//! 6. replay
//!
//! Each step can be switched off through its `validate_*` flag or replaced by a delegate
//! in [`ValidationParameters`].

use tracing::{debug, warn};

use super::parameters::ValidationParameters;
use crate::algorithm::Algorithm;
use crate::error::{ConfigurationError, Failure, TokenValidationError};
use crate::key::SecurityKey;
use crate::token::Claims;

/// How long a `jti` without `exp` stays in the replay cache, in seconds
pub const DEFAULT_REPLAY_WINDOW_SECS: i64 = 300;

/// Run every enabled claim check against the innermost claim set
pub(crate) fn validate_claims(
    claims: &Claims,
    algorithm: Option<Algorithm>,
    signing_key: Option<&SecurityKey>,
    now: i64,
    params: &ValidationParameters,
) -> Result<(), Failure> {
    validate_algorithm(algorithm, params)?;
    validate_lifetime(claims, now, params)?;
    validate_issuer(claims, params)?;
    validate_audience(claims, params)?;
    validate_signing_key(signing_key, claims, params)?;
    validate_replay(claims, now, params)?;

    debug!(
        iss = ?claims.issuer(),
        sub = ?claims.subject(),
        "Token claims validated"
    );
    Ok(())
}

fn validate_algorithm(
    algorithm: Option<Algorithm>,
    params: &ValidationParameters,
) -> Result<(), TokenValidationError> {
    if !params.validate_algorithm {
        return Ok(());
    }
    let Some(algorithm) = algorithm else {
        return Ok(());
    };

    if let Some(validator) = &params.algorithm_validator {
        return validator(algorithm)
            .map_err(|reason| TokenValidationError::InvalidAlgorithm(format!("{algorithm}: {reason}")));
    }
    if params.is_algorithm_accepted(algorithm) {
        Ok(())
    } else {
        Err(TokenValidationError::InvalidAlgorithm(algorithm.to_string()))
    }
}

fn validate_lifetime(
    claims: &Claims,
    now: i64,
    params: &ValidationParameters,
) -> Result<(), TokenValidationError> {
    if !params.validate_lifetime {
        return Ok(());
    }
    let not_before = claims.not_before()?;
    let expires_at = claims.expiration()?;

    if let Some(validator) = &params.lifetime_validator {
        return validator(not_before, expires_at, claims).map_err(TokenValidationError::InvalidLifetime);
    }

    if let (Some(nbf), Some(exp)) = (not_before, expires_at)
        && exp < nbf
    {
        return Err(TokenValidationError::InvalidLifetime(format!(
            "exp {exp} is before nbf {nbf}"
        )));
    }

    let skew = params.clock_skew_secs();
    match expires_at {
        None if params.require_expiration_time => return Err(TokenValidationError::MissingExpiration),
        Some(exp) if now > exp.saturating_add(skew) => {
            return Err(TokenValidationError::Expired {
                expires_at: exp,
                now,
            });
        }
        _ => {}
    }

    let latest_start = now.saturating_add(skew);
    if let Some(nbf) = not_before
        && nbf > latest_start
    {
        return Err(TokenValidationError::NotYetValid {
            not_before: nbf,
            now,
        });
    }
    if let Some(iat) = claims.issued_at()?
        && iat > latest_start
    {
        return Err(TokenValidationError::NotYetValid {
            not_before: iat,
            now,
        });
    }
    Ok(())
}

fn validate_issuer(claims: &Claims, params: &ValidationParameters) -> Result<(), Failure> {
    if !params.validate_issuer {
        return Ok(());
    }
    let issuer = claims.issuer();

    if let Some(validator) = &params.issuer_validator {
        return validator(issuer, claims).map_err(|reason| TokenValidationError::InvalidIssuer(reason).into());
    }
    if params.valid_issuers.is_empty() {
        return Err(ConfigurationError::InvalidConfiguration(
            "issuer validation is enabled but no valid issuers are configured".to_string(),
        )
        .into());
    }

    match issuer {
        Some(issuer) if params.valid_issuers.iter().any(|valid| valid == issuer) => Ok(()),
        Some(issuer) => {
            Err(TokenValidationError::InvalidIssuer(format!("'{issuer}' is not a valid issuer")).into())
        }
        None => Err(TokenValidationError::InvalidIssuer("token has no 'iss'".to_string()).into()),
    }
}

fn validate_audience(claims: &Claims, params: &ValidationParameters) -> Result<(), Failure> {
    if !params.validate_audience {
        return Ok(());
    }
    let audiences = claims.audiences();

    if let Some(validator) = &params.audience_validator {
        return validator(&audiences, claims)
            .map_err(|reason| TokenValidationError::InvalidAudience(reason).into());
    }
    if params.valid_audiences.is_empty() {
        return Err(ConfigurationError::InvalidConfiguration(
            "audience validation is enabled but no valid audiences are configured".to_string(),
        )
        .into());
    }

    if audiences.is_empty() {
        if params.require_audience {
            return Err(TokenValidationError::InvalidAudience("token has no 'aud'".to_string()).into());
        }
        return Ok(());
    }
    // exact, case-sensitive match
    if audiences
        .iter()
        .any(|aud| params.valid_audiences.iter().any(|valid| valid == aud))
    {
        Ok(())
    } else {
        Err(TokenValidationError::InvalidAudience(format!(
            "none of {audiences:?} is a valid audience"
        ))
        .into())
    }
}

fn validate_signing_key(
    signing_key: Option<&SecurityKey>,
    claims: &Claims,
    params: &ValidationParameters,
) -> Result<(), TokenValidationError> {
    if !params.validate_issuer_signing_key {
        return Ok(());
    }
    match (&params.issuer_signing_key_validator, signing_key) {
        (Some(validator), Some(key)) => {
            validator(key, claims).map_err(TokenValidationError::InvalidSigningKey)
        }
        _ => Ok(()),
    }
}

fn validate_replay(
    claims: &Claims,
    now: i64,
    params: &ValidationParameters,
) -> Result<(), TokenValidationError> {
    if !params.validate_token_replay {
        return Ok(());
    }
    let token_id = claims.token_id();
    let expires_at = claims.expiration()?;

    if let Some(validator) = &params.token_replay_validator {
        return validator(token_id, expires_at, claims).map_err(|reason| {
            warn!(jti = ?token_id, reason = %reason, "Replay validator rejected token");
            TokenValidationError::Replayed {
                token_id: token_id.unwrap_or_default().to_string(),
            }
        });
    }

    let Some(token_id) = token_id else {
        if params.require_token_id {
            return Err(TokenValidationError::MissingTokenId);
        }
        return Ok(());
    };
    let Some(cache) = &params.token_replay_cache else {
        return Ok(());
    };

    let window_end = expires_at.map_or(now.saturating_add(DEFAULT_REPLAY_WINDOW_SECS), |exp| {
        exp.saturating_add(params.clock_skew_secs())
    });
    if cache.try_add(token_id, window_end, now) {
        Ok(())
    } else {
        Err(TokenValidationError::Replayed {
            token_id: token_id.to_string(),
        })
    }
}
