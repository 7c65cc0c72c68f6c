//! Signature validation over a set of candidate keys
//!
//! A key whose `kid` (or `x5t`) uniquely matches the token header is tried first, then
//! every remaining key in configuration order, then keys supplied by the signing key
//! resolver. The first key that verifies wins. When none does, the error lists why
//! each candidate failed.

use std::sync::Arc;

use tracing::{debug, warn};

use super::parameters::{KeyResolver, ValidationParameters};
use crate::algorithm::Algorithm;
use crate::crypto::CryptoProviderFactory;
use crate::error::{
    ConfigurationError, Failure, KeyAttempt, KeyAttemptFailure, TokenValidationError,
};
use crate::key::{KeyUsage, SecurityKey};
use crate::token::{JsonWebToken, JwtHeader};

/// Candidate keys in search order, paired with their position in the full candidate list
pub(crate) fn ordered_candidates(
    configured: &[Arc<SecurityKey>],
    resolver: Option<&KeyResolver>,
    header: &JwtHeader,
) -> Vec<(usize, Arc<SecurityKey>)> {
    let mut candidates: Vec<(usize, Arc<SecurityKey>)> = configured
        .iter()
        .cloned()
        .chain(resolver.map(|resolve| resolve(header)).unwrap_or_default())
        .enumerate()
        .collect();

    let matches_header = |key: &SecurityKey| {
        header.kid.as_deref().is_some_and(|kid| key.key_id() == Some(kid))
            || header.x5t.as_deref().is_some_and(|x5t| key.x5t() == Some(x5t))
    };
    let matching: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, (_, key))| matches_header(key))
        .map(|(position, _)| position)
        .collect();

    if let [only] = matching.as_slice() {
        let preferred = candidates.remove(*only);
        candidates.insert(0, preferred);
    }
    candidates
}

/// Verify a JWS and return the key that verified it.
///
/// `Ok(None)` means the token was accepted without a key: an unsecured token allowed
/// by configuration, or signature validation turned off.
pub(crate) fn validate_signature(
    token: &JsonWebToken,
    params: &ValidationParameters,
    providers: &CryptoProviderFactory,
) -> Result<Option<Arc<SecurityKey>>, Failure> {
    let header = token.header();
    let algorithm = header.algorithm()?;

    if algorithm == Algorithm::None {
        if params.require_signed_tokens {
            return Err(TokenValidationError::SignatureRequired.into());
        }
        if !params.is_algorithm_accepted(algorithm) {
            return Err(TokenValidationError::InvalidAlgorithm(algorithm.to_string()).into());
        }
        if !token.signature().is_empty() {
            return Err(TokenValidationError::Malformed(
                "unsecured token carries a signature".to_string(),
            )
            .into());
        }
        return Ok(None);
    }
    if !algorithm.is_signing() {
        return Err(TokenValidationError::UnsupportedAlgorithm(algorithm.to_string()).into());
    }

    if let Some(validator) = &params.signature_validator {
        return validator(token).map_err(|reason| {
            warn!(algorithm = %algorithm, reason = %reason, "Custom signature validator rejected token");
            TokenValidationError::SignatureInvalid {
                attempts: Vec::new(),
            }
            .into()
        });
    }

    if !params.validate_signature {
        debug!(algorithm = %algorithm, "Signature validation disabled; accepting token unverified");
        return Ok(None);
    }

    if params.issuer_signing_keys.is_empty() && params.issuer_signing_key_resolver.is_none() {
        return Err(ConfigurationError::NoSigningKeys.into());
    }

    let candidates = ordered_candidates(
        &params.issuer_signing_keys,
        params.issuer_signing_key_resolver.as_ref(),
        header,
    );

    let mut attempts = Vec::with_capacity(candidates.len());
    for (index, key) in candidates {
        let reason = match try_key(token, algorithm, &key, params, providers) {
            Ok(()) => {
                debug!(index, kid = ?key.key_id(), algorithm = %algorithm, "Signature verified");
                return Ok(Some(key));
            }
            Err(reason) => reason,
        };
        debug!(index, kid = ?key.key_id(), reason = %reason, "Candidate key did not verify signature");
        attempts.push(KeyAttempt {
            index,
            key_id: key.key_id().map(str::to_string),
            reason,
        });
    }

    warn!(
        algorithm = %algorithm,
        kid = ?header.kid,
        candidates = attempts.len(),
        "Signature validation failed for every candidate key"
    );
    Err(TokenValidationError::SignatureInvalid { attempts }.into())
}

fn try_key(
    token: &JsonWebToken,
    algorithm: Algorithm,
    key: &SecurityKey,
    params: &ValidationParameters,
    providers: &CryptoProviderFactory,
) -> Result<(), KeyAttemptFailure> {
    if !params.is_algorithm_accepted(algorithm)
        || key.algorithm().is_some_and(|bound| bound != algorithm)
    {
        return Err(KeyAttemptFailure::AlgorithmNotAccepted);
    }

    let provider = providers
        .signature_provider(key, algorithm, KeyUsage::Verify)
        .map_err(KeyAttemptFailure::ProviderUnavailable)?;

    if provider.verify(token.signing_input(), token.signature_segment()) {
        Ok(())
    } else {
        Err(KeyAttemptFailure::SignatureMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::SymmetricSecurityKey;

    fn key(byte: u8, kid: Option<&str>) -> Arc<SecurityKey> {
        let key = SymmetricSecurityKey::new(vec![byte; 32]).unwrap();
        let key = match kid {
            Some(kid) => key.with_key_id(kid),
            None => key,
        };
        Arc::new(key.into())
    }

    fn header(kid: Option<&str>) -> JwtHeader {
        let json = match kid {
            Some(kid) => format!(r#"{{"alg":"HS256","kid":"{kid}"}}"#),
            None => r#"{"alg":"HS256"}"#.to_string(),
        };
        let token = format!(
            "{}.e30.",
            base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, json)
        );
        JsonWebToken::parse(&token).unwrap().header().clone()
    }

    fn kids(candidates: &[(usize, Arc<SecurityKey>)]) -> Vec<Option<&str>> {
        candidates.iter().map(|(_, key)| key.key_id()).collect()
    }

    #[test]
    fn test_unique_kid_match_goes_first() {
        let keys = vec![key(1, Some("a")), key(2, Some("b")), key(3, Some("c"))];
        let ordered = ordered_candidates(&keys, None, &header(Some("c")));

        assert_eq!(kids(&ordered), vec![Some("c"), Some("a"), Some("b")]);
        assert_eq!(ordered[0].0, 2);
    }

    #[test]
    fn test_ambiguous_or_missing_kid_keeps_order() {
        let keys = vec![key(1, Some("a")), key(2, Some("dup")), key(3, Some("dup"))];
        let ordered = ordered_candidates(&keys, None, &header(Some("dup")));
        assert_eq!(kids(&ordered), vec![Some("a"), Some("dup"), Some("dup")]);

        let ordered = ordered_candidates(&keys, None, &header(None));
        assert_eq!(ordered.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_resolver_keys_follow_configured_keys() {
        let keys = vec![key(1, Some("configured"))];
        let resolver: KeyResolver = Arc::new(|_: &JwtHeader| vec![key(9, Some("resolved"))]);
        let ordered = ordered_candidates(&keys, Some(&resolver), &header(Some("resolved")));

        assert_eq!(kids(&ordered), vec![Some("resolved"), Some("configured")]);
        assert_eq!(ordered[0].0, 1);
    }
}
