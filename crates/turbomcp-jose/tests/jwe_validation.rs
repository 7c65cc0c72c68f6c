//! Encrypted token (JWE) validation and nesting

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;

use common::*;
use turbomcp_jose::{
    Algorithm, ConfigurationError, EcCurve, EncryptionAlgorithm, JsonWebTokenHandler,
    KeyAttemptFailure, TokenValidationError, ValidationErrorKind, ValidationParameters,
};

fn signed_inner() -> (String, serde_json::Value, Arc<turbomcp_jose::SecurityKey>) {
    let signer = hmac_key(0x51, Some("signer"));
    let claims = standard_claims();
    let token = sign_token(&claims, &signer, Algorithm::HS256, Some("signer"));
    (token, claims, signer)
}

#[test]
fn test_signed_then_encrypted_round_trip() {
    let cases = [
        (aes_key(32, 1), Algorithm::Dir, EncryptionAlgorithm::A256Gcm),
        (aes_key(32, 2), Algorithm::Dir, EncryptionAlgorithm::A128CbcHs256),
        (aes_key(16, 3), Algorithm::A128KW, EncryptionAlgorithm::A128CbcHs256),
        (aes_key(24, 4), Algorithm::A192KW, EncryptionAlgorithm::A192Gcm),
        (aes_key(32, 5), Algorithm::A256KW, EncryptionAlgorithm::A256CbcHs512),
        (rsa_key(0), Algorithm::RsaOaep, EncryptionAlgorithm::A256Gcm),
        (rsa_key(1), Algorithm::RsaOaep256, EncryptionAlgorithm::A192CbcHs384),
        (ec_key(EcCurve::P256), Algorithm::EcdhEs, EncryptionAlgorithm::A128Gcm),
        (ec_key(EcCurve::P384), Algorithm::EcdhEsA128KW, EncryptionAlgorithm::A256Gcm),
        (ec_key(EcCurve::P256), Algorithm::EcdhEsA256KW, EncryptionAlgorithm::A128CbcHs256),
    ];
    let handler = JsonWebTokenHandler::new();

    for (decryption_key, algorithm, encryption) in cases {
        let (inner, claims, signer) = signed_inner();
        let token = encrypt_token(inner.as_bytes(), &decryption_key, algorithm, encryption, true);

        let params = default_params()
            .with_signing_key(Arc::clone(&signer))
            .with_decryption_key(Arc::clone(&decryption_key));
        let result = handler.validate_token(&token, &params).unwrap();
        let validated = result
            .validated()
            .unwrap_or_else(|| panic!("{algorithm}/{encryption}: {:?}", result.error()));

        assert!(validated.token.is_encrypted());
        let inner_token = validated.inner_token().expect("inner token");
        assert_eq!(inner_token.encoded(), inner);
        assert_eq!(inner_token.claims().unwrap().as_map(), claims.as_object().unwrap());
        // outer token exposes the inner claims
        assert_eq!(validated.token.claims(), inner_token.claims());
        assert_eq!(validated.algorithm, Some(Algorithm::HS256));
        assert!(Arc::ptr_eq(validated.signing_key.as_ref().unwrap(), &signer));
        assert!(Arc::ptr_eq(validated.decryption_key.as_ref().unwrap(), &decryption_key));
    }
}

#[test]
fn test_nested_token_detected_without_cty() {
    let (inner, claims, signer) = signed_inner();
    let key = aes_key(16, 9);
    let token = encrypt_token(inner.as_bytes(), &key, Algorithm::A128KW, EncryptionAlgorithm::A128Gcm, false);

    let params = default_params().with_signing_key(signer).with_decryption_key(key);
    let result = JsonWebTokenHandler::new().validate_token(&token, &params).unwrap();
    assert_eq!(result.claims().unwrap().as_map(), claims.as_object().unwrap());
}

#[test]
fn test_nested_depth_limit() {
    let (inner, _, signer) = signed_inner();
    let key = aes_key(32, 7);
    let once = encrypt_token(inner.as_bytes(), &key, Algorithm::Dir, EncryptionAlgorithm::A256Gcm, true);
    let twice = encrypt_token(once.as_bytes(), &key, Algorithm::Dir, EncryptionAlgorithm::A256Gcm, true);
    let handler = JsonWebTokenHandler::new();

    let params = default_params().with_signing_key(signer).with_decryption_key(key);
    assert!(handler.validate_token(&once, &params).unwrap().is_valid());
    assert_eq!(
        handler.validate_token(&twice, &params).unwrap().error(),
        Some(&TokenValidationError::NestedDepthExceeded { limit: 1 })
    );

    let deeper = params.clone().with_nested_token_depth(2);
    let result = handler.validate_token(&twice, &deeper).unwrap();
    assert!(result.is_valid());
    let middle = result.validated().and_then(|v| v.inner_token()).unwrap();
    assert!(middle.is_encrypted());
    assert!(middle.inner_token().is_some_and(|jws| !jws.is_encrypted()));

    let none = params.with_nested_token_depth(0);
    assert_eq!(
        handler.validate_token(&once, &none).unwrap().error().map(TokenValidationError::kind),
        Some(ValidationErrorKind::NestedDepthExceeded)
    );
}

#[test]
fn test_decryption_key_search() {
    let (inner, _, signer) = signed_inner();
    let right = aes_key(16, 0x10);
    let token = encrypt_token(inner.as_bytes(), &right, Algorithm::A128KW, EncryptionAlgorithm::A128Gcm, true);
    let handler = JsonWebTokenHandler::new();

    let params = default_params()
        .with_signing_key(Arc::clone(&signer))
        .with_decryption_key(aes_key(16, 0x11))
        .with_decryption_key(aes_key(32, 0x12))
        .with_decryption_key(Arc::clone(&right));
    let result = handler.validate_token(&token, &params).unwrap();
    assert!(Arc::ptr_eq(
        result.validated().and_then(|v| v.decryption_key.as_ref()).unwrap(),
        &right
    ));

    let wrong_only = default_params()
        .with_signing_key(signer)
        .with_decryption_key(aes_key(16, 0x11))
        .with_decryption_key(aes_key(32, 0x12));
    let result = handler.validate_token(&token, &wrong_only).unwrap();
    let error = result.error().unwrap();
    assert_eq!(error.kind(), ValidationErrorKind::DecryptionFailed);
    assert_eq!(error.key_attempts()[0].reason, KeyAttemptFailure::DecryptionMismatch);
    // 256-bit key cannot serve A128KW
    assert!(matches!(
        error.key_attempts()[1].reason,
        KeyAttemptFailure::ProviderUnavailable(ConfigurationError::InvalidKey(_))
    ));
}

#[test]
fn test_tampered_ciphertext_and_tag() {
    let (inner, _, signer) = signed_inner();
    let key = aes_key(32, 0x21);
    let params = default_params().with_signing_key(signer).with_decryption_key(Arc::clone(&key));
    let handler = JsonWebTokenHandler::new();

    for encryption in [EncryptionAlgorithm::A256Gcm, EncryptionAlgorithm::A128CbcHs256] {
        let token = encrypt_token(inner.as_bytes(), &key, Algorithm::Dir, encryption, true);
        let segments: Vec<&str> = token.split('.').collect();

        for target in [3, 4] {
            let mut bytes = base64::Engine::decode(
                &base64::engine::general_purpose::URL_SAFE_NO_PAD,
                segments[target],
            )
            .unwrap();
            bytes[0] ^= 0x01;
            let mut tampered: Vec<String> = segments.iter().map(|s| s.to_string()).collect();
            tampered[target] = b64(&bytes);

            let result = handler.validate_token(&tampered.join("."), &params).unwrap();
            let error = result.error().unwrap();
            assert_eq!(error.kind(), ValidationErrorKind::DecryptionFailed, "{encryption} segment {target}");
            assert_eq!(error.key_attempts()[0].reason, KeyAttemptFailure::DecryptionMismatch);
        }
    }
}

#[test]
fn test_encrypted_claims_without_signature() {
    let claims = standard_claims();
    let key = aes_key(32, 0x31);
    let token = encrypt_token(claims.to_string().as_bytes(), &key, Algorithm::Dir, EncryptionAlgorithm::A256Gcm, false);
    let handler = JsonWebTokenHandler::new();

    let params = default_params().with_decryption_key(key);
    assert_eq!(
        handler.validate_token(&token, &params).unwrap().error(),
        Some(&TokenValidationError::SignatureRequired)
    );

    let relaxed = ValidationParameters {
        require_signed_tokens: false,
        ..params
    };
    let result = handler.validate_token(&token, &relaxed).unwrap();
    let validated = result.validated().unwrap();
    assert_eq!(validated.claims.as_map(), claims.as_object().unwrap());
    assert_eq!(validated.algorithm, None);
    assert!(validated.signing_key.is_none());
    assert!(validated.inner_token().is_none());
}

#[test]
fn test_unsupported_jwe_headers() {
    let handler = JsonWebTokenHandler::new();
    let params = default_params().with_decryption_key(aes_key(32, 1));
    let body = format!("..{}.{}.{}", b64([0u8; 12]), b64([0u8; 8]), b64([0u8; 16]));

    let zip = format!("{}{body}", b64(r#"{"alg":"dir","enc":"A256GCM","zip":"DEF"}"#));
    assert_eq!(
        handler.validate_token(&zip, &params).unwrap().error().map(TokenValidationError::kind),
        Some(ValidationErrorKind::UnsupportedAlgorithm)
    );

    let unknown_enc = format!("{}{body}", b64(r#"{"alg":"dir","enc":"A512GCM"}"#));
    assert_eq!(
        handler.validate_token(&unknown_enc, &params).unwrap().error().map(TokenValidationError::kind),
        Some(ValidationErrorKind::UnsupportedAlgorithm)
    );

    let signing_alg = format!("{}{body}", b64(r#"{"alg":"HS256","enc":"A256GCM"}"#));
    assert_eq!(
        handler.validate_token(&signing_alg, &params).unwrap().error().map(TokenValidationError::kind),
        Some(ValidationErrorKind::UnsupportedAlgorithm)
    );

    let bad_epk = format!("{}{body}", b64(r#"{"alg":"ECDH-ES","enc":"A256GCM","epk":{"kty":"EC"}}"#));
    assert_eq!(
        handler.validate_token(&bad_epk, &params).unwrap().error().map(TokenValidationError::kind),
        Some(ValidationErrorKind::MalformedToken)
    );
}

#[test]
fn test_key_management_algorithm_allow_list() {
    let (inner, _, signer) = signed_inner();
    let key = aes_key(16, 0x41);
    let token = encrypt_token(inner.as_bytes(), &key, Algorithm::A128KW, EncryptionAlgorithm::A128Gcm, true);

    let params = default_params()
        .with_signing_key(signer)
        .with_decryption_key(key)
        .with_valid_algorithms([Algorithm::HS256, Algorithm::Dir]);
    let result = JsonWebTokenHandler::new().validate_token(&token, &params).unwrap();
    assert_eq!(
        result.error().unwrap().key_attempts()[0].reason,
        KeyAttemptFailure::AlgorithmNotAccepted
    );
}

#[test]
fn test_missing_decryption_keys_is_configuration_error() {
    let (inner, _, signer) = signed_inner();
    let token = encrypt_token(inner.as_bytes(), &aes_key(32, 1), Algorithm::Dir, EncryptionAlgorithm::A256Gcm, true);

    let params = default_params().with_signing_key(signer);
    assert_eq!(
        JsonWebTokenHandler::new().validate_token(&token, &params).unwrap_err(),
        ConfigurationError::NoDecryptionKeys
    );
}

#[test]
fn test_public_only_key_cannot_decrypt() {
    let (inner, _, signer) = signed_inner();
    let private = ec_key(EcCurve::P256);
    let token = encrypt_token(inner.as_bytes(), &private, Algorithm::EcdhEs, EncryptionAlgorithm::A256Gcm, true);

    let turbomcp_jose::SecurityKey::Asymmetric(asymmetric) = private.as_ref() else {
        panic!("EC key expected");
    };
    let turbomcp_jose::PublicKeyMaterial::Ec { curve, x, y } = asymmetric.public_key() else {
        panic!("EC public key expected");
    };
    let public_only = turbomcp_jose::AsymmetricSecurityKey::from_ec_coordinates(*curve, x, y).unwrap();

    let params = default_params().with_signing_key(signer).with_decryption_key(public_only);
    let result = JsonWebTokenHandler::new().validate_token(&token, &params).unwrap();
    assert!(matches!(
        result.error().unwrap().key_attempts()[0].reason,
        KeyAttemptFailure::ProviderUnavailable(_)
    ));
}
