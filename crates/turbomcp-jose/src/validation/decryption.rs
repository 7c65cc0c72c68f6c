//! JWE decryption: content-encryption-key resolution and authenticated decryption
//!
//! Candidate keys are searched in the same order as for signatures. Any failure after a
//! provider was built (unwrap, agreement or tag verification) is recorded as a single
//! `DecryptionMismatch`, so callers cannot tell a wrong key from a forged tag.

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::parameters::ValidationParameters;
use super::signature::ordered_candidates;
use crate::algorithm::{Algorithm, AlgorithmFamily, EncryptionAlgorithm};
use crate::crypto::key_wrap::aes_unwrap;
use crate::crypto::{AgreementContext, CryptoProviderFactory, EphemeralPublicKey};
use crate::error::{
    ConfigurationError, Failure, KeyAttempt, KeyAttemptFailure, TokenValidationError,
};
use crate::key::{KeyUsage, SecurityKey};
use crate::token::{JsonWebToken, JweParts};

/// Successful decryption: the plaintext and the key that unlocked it
pub(crate) struct Decryption {
    pub plaintext: Vec<u8>,
    pub key: Arc<SecurityKey>,
}

/// Token-level inputs shared by every candidate key
struct JweContext<'a> {
    algorithm: Algorithm,
    encryption: EncryptionAlgorithm,
    parts: JweParts<'a>,
    epk: Option<EphemeralPublicKey>,
    apu: Vec<u8>,
    apv: Vec<u8>,
}

pub(crate) fn decrypt_token(
    token: &JsonWebToken,
    params: &ValidationParameters,
    providers: &CryptoProviderFactory,
) -> Result<Decryption, Failure> {
    let header = token.header();
    let algorithm = header.algorithm()?;
    if !algorithm.is_key_management() {
        return Err(TokenValidationError::UnsupportedAlgorithm(algorithm.to_string()).into());
    }
    let encryption = header.encryption_algorithm()?;
    if let Some(zip) = &header.zip {
        return Err(TokenValidationError::UnsupportedAlgorithm(format!("zip={zip}")).into());
    }
    let parts = token
        .jwe_parts()
        .ok_or_else(|| TokenValidationError::Malformed("token is not a JWE".to_string()))?;

    let epk = if algorithm.family() == AlgorithmFamily::EcdhEs {
        let value = header.epk.as_ref().ok_or_else(|| {
            TokenValidationError::Malformed("ECDH-ES token has no 'epk'".to_string())
        })?;
        Some(EphemeralPublicKey::from_header(value).map_err(|_| {
            TokenValidationError::Malformed("'epk' is not a valid EC public key".to_string())
        })?)
    } else {
        None
    };
    let context = JweContext {
        algorithm,
        encryption,
        parts,
        epk,
        apu: decode_party_info(header.apu.as_deref(), "apu")?,
        apv: decode_party_info(header.apv.as_deref(), "apv")?,
    };

    if params.token_decryption_keys.is_empty() && params.token_decryption_key_resolver.is_none() {
        return Err(ConfigurationError::NoDecryptionKeys.into());
    }

    let candidates = ordered_candidates(
        &params.token_decryption_keys,
        params.token_decryption_key_resolver.as_ref(),
        header,
    );

    let mut attempts = Vec::with_capacity(candidates.len());
    for (index, key) in candidates {
        match try_key(&context, &key, params, providers) {
            Ok(plaintext) => {
                debug!(index, kid = ?key.key_id(), algorithm = %algorithm, enc = %encryption, "Token decrypted");
                return Ok(Decryption { plaintext, key });
            }
            Err(reason) => {
                debug!(index, kid = ?key.key_id(), reason = %reason, "Candidate key did not decrypt token");
                attempts.push(KeyAttempt {
                    index,
                    key_id: key.key_id().map(str::to_string),
                    reason,
                });
            }
        }
    }

    warn!(
        algorithm = %algorithm,
        enc = %encryption,
        candidates = attempts.len(),
        "Token decryption failed for every candidate key"
    );
    Err(TokenValidationError::DecryptionFailed { attempts }.into())
}

fn decode_party_info(value: Option<&str>, name: &str) -> Result<Vec<u8>, TokenValidationError> {
    value.map_or(Ok(Vec::new()), |encoded| {
        URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| TokenValidationError::Malformed(format!("'{name}' is not base64url")))
    })
}

fn try_key(
    jwe: &JweContext<'_>,
    key: &SecurityKey,
    params: &ValidationParameters,
    providers: &CryptoProviderFactory,
) -> Result<Vec<u8>, KeyAttemptFailure> {
    let algorithm = jwe.algorithm;
    if !params.is_algorithm_accepted(algorithm)
        || key.algorithm().is_some_and(|bound| bound != algorithm)
    {
        return Err(KeyAttemptFailure::AlgorithmNotAccepted);
    }
    let parts = &jwe.parts;

    if algorithm == Algorithm::Dir {
        if !parts.encrypted_key.is_empty() {
            return Err(KeyAttemptFailure::DecryptionMismatch);
        }
        let provider = providers
            .encryption_provider(key, jwe.encryption, KeyUsage::Decrypt)
            .map_err(KeyAttemptFailure::ProviderUnavailable)?;
        return provider
            .decrypt(parts.iv, parts.ciphertext, parts.tag, parts.aad)
            .map_err(|_| KeyAttemptFailure::DecryptionMismatch);
    }

    let cek = resolve_cek(jwe, key, providers)?;
    let provider = providers
        .content_encryption_provider(&cek, jwe.encryption)
        .map_err(|_| KeyAttemptFailure::DecryptionMismatch)?;
    provider
        .decrypt(parts.iv, parts.ciphertext, parts.tag, parts.aad)
        .map_err(|_| KeyAttemptFailure::DecryptionMismatch)
}

fn resolve_cek(
    jwe: &JweContext<'_>,
    key: &SecurityKey,
    providers: &CryptoProviderFactory,
) -> Result<Zeroizing<Vec<u8>>, KeyAttemptFailure> {
    let algorithm = jwe.algorithm;
    let encrypted_key = jwe.parts.encrypted_key;

    match algorithm.family() {
        AlgorithmFamily::AesKeyWrap | AlgorithmFamily::RsaKeyWrap => providers
            .key_wrap_provider(key, algorithm, KeyUsage::UnwrapKey)
            .map_err(KeyAttemptFailure::ProviderUnavailable)?
            .unwrap_key(encrypted_key)
            .map_err(|_| KeyAttemptFailure::DecryptionMismatch),
        AlgorithmFamily::EcdhEs => {
            let provider = providers
                .key_agreement_provider(key, algorithm, KeyUsage::UnwrapKey)
                .map_err(KeyAttemptFailure::ProviderUnavailable)?;
            let epk = jwe.epk.as_ref().ok_or(KeyAttemptFailure::DecryptionMismatch)?;
            let agreed = provider
                .derive_for_recipient(
                    epk,
                    &AgreementContext {
                        algorithm,
                        encryption: jwe.encryption,
                        apu: &jwe.apu,
                        apv: &jwe.apv,
                    },
                )
                .map_err(|_| KeyAttemptFailure::DecryptionMismatch)?;

            if algorithm == Algorithm::EcdhEs {
                if !encrypted_key.is_empty() {
                    return Err(KeyAttemptFailure::DecryptionMismatch);
                }
                Ok(agreed)
            } else {
                aes_unwrap(&agreed, encrypted_key).map_err(|_| KeyAttemptFailure::DecryptionMismatch)
            }
        }
        _ => Err(KeyAttemptFailure::ProviderUnavailable(
            ConfigurationError::UnsupportedAlgorithm {
                algorithm: algorithm.to_string(),
                key_type: key.key_type().to_string(),
            },
        )),
    }
}
