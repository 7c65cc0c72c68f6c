//! Common test utilities for integration tests
//!
//! Token builders here use the crate's own providers (signing, key wrap, key agreement,
//! content encryption), so every token is produced the way a real issuer would.

#![allow(dead_code)]

use std::sync::{Arc, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rsa::RsaPrivateKey;
use serde_json::{Value, json};

use turbomcp_jose::crypto::AgreementContext;
use turbomcp_jose::crypto::key_wrap::aes_wrap;
use turbomcp_jose::{
    Algorithm, AlgorithmFamily, AsymmetricSecurityKey, CryptoProviderFactory, EcCurve,
    EncryptionAlgorithm, KeyUsage, SecurityKey, SymmetricSecurityKey, ValidationParameters,
};

pub const ISSUER: &str = "https://issuer.example.com";
pub const AUDIENCE: &str = "https://api.example.com";

/// Route engine logs to the test output; `RUST_LOG=turbomcp_jose=debug` shows key attempts
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Current Unix timestamp in seconds
pub fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs() as i64
}

pub fn b64(data: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Claims accepted by [`default_params`], valid for the next hour
pub fn standard_claims() -> Value {
    let now = current_timestamp();
    json!({
        "iss": ISSUER,
        "aud": AUDIENCE,
        "sub": "user-123",
        "iat": now,
        "exp": now + 3600,
    })
}

/// Issuer and audience set, no keys
pub fn default_params() -> ValidationParameters {
    ValidationParameters::new()
        .with_valid_issuer(ISSUER)
        .with_valid_audience(AUDIENCE)
}

pub fn hmac_key(byte: u8, kid: Option<&str>) -> Arc<SecurityKey> {
    let key = SymmetricSecurityKey::new(vec![byte; 32]).expect("non-empty key");
    let key = match kid {
        Some(kid) => key.with_key_id(kid),
        None => key,
    };
    Arc::new(key.into())
}

pub fn aes_key(length: usize, byte: u8) -> Arc<SecurityKey> {
    Arc::new(
        SymmetricSecurityKey::new(vec![byte; length])
            .expect("non-empty key")
            .into(),
    )
}

/// RSA key generation is slow; tests share a small pool of 2048-bit keys
pub fn rsa_key(index: usize) -> Arc<SecurityKey> {
    static KEYS: OnceLock<Vec<RsaPrivateKey>> = OnceLock::new();
    let keys = KEYS.get_or_init(|| {
        let mut rng = rand::thread_rng();
        (0..2)
            .map(|_| RsaPrivateKey::new(&mut rng, 2048).expect("RSA key generation"))
            .collect()
    });
    let key = AsymmetricSecurityKey::from_rsa_private_key(&keys[index]).expect("valid RSA key");
    Arc::new(key.into())
}

pub fn ec_key(curve: EcCurve) -> Arc<SecurityKey> {
    let mut rng = rand::rngs::OsRng;
    let key = match curve {
        EcCurve::P256 => AsymmetricSecurityKey::from_p256_secret(&p256::SecretKey::random(&mut rng)),
        EcCurve::P384 => AsymmetricSecurityKey::from_p384_secret(&p384::SecretKey::random(&mut rng)),
    }
    .expect("valid EC key");
    Arc::new(key.into())
}

/// Sign `claims` as a compact JWS
pub fn sign_token(claims: &Value, key: &SecurityKey, algorithm: Algorithm, kid: Option<&str>) -> String {
    let mut header = json!({"alg": algorithm.as_str(), "typ": "JWT"});
    if let Some(kid) = kid {
        header["kid"] = json!(kid);
    }
    sign_with_header(&header, claims, key, algorithm)
}

pub fn sign_with_header(header: &Value, claims: &Value, key: &SecurityKey, algorithm: Algorithm) -> String {
    let signing_input = format!("{}.{}", b64(header.to_string()), b64(claims.to_string()));
    let signature = CryptoProviderFactory::new()
        .signature_provider(key, algorithm, KeyUsage::Sign)
        .expect("signing provider")
        .sign(signing_input.as_bytes())
        .expect("signature");
    format!("{signing_input}.{signature}")
}

/// Encrypt `plaintext` as a compact JWE for `key`.
///
/// `cty` is set to `JWT` when `nested` is true.
pub fn encrypt_token(
    plaintext: &[u8],
    key: &SecurityKey,
    algorithm: Algorithm,
    encryption: EncryptionAlgorithm,
    nested: bool,
) -> String {
    let factory = CryptoProviderFactory::new();
    let mut header = json!({"alg": algorithm.as_str(), "enc": encryption.as_str()});
    if nested {
        header["cty"] = json!("JWT");
    }

    let (cek, encrypted_key): (Vec<u8>, Vec<u8>) = match algorithm.family() {
        AlgorithmFamily::Direct => match key {
            SecurityKey::Symmetric(secret) => (secret.key_bytes().to_vec(), Vec::new()),
            _ => panic!("dir needs a symmetric key"),
        },
        AlgorithmFamily::AesKeyWrap | AlgorithmFamily::RsaKeyWrap => {
            let cek = random_bytes(encryption.key_length());
            let wrapped = factory
                .key_wrap_provider(key, algorithm, KeyUsage::WrapKey)
                .expect("key wrap provider")
                .wrap_key(&cek)
                .expect("wrap CEK");
            (cek, wrapped)
        }
        AlgorithmFamily::EcdhEs => {
            let (agreed, epk) = factory
                .key_agreement_provider(key, algorithm, KeyUsage::WrapKey)
                .expect("key agreement provider")
                .derive_for_sender(&AgreementContext {
                    algorithm,
                    encryption,
                    apu: b"",
                    apv: b"",
                })
                .expect("key agreement");
            header["epk"] = epk.to_header();
            if algorithm == Algorithm::EcdhEs {
                (agreed.to_vec(), Vec::new())
            } else {
                let cek = random_bytes(encryption.key_length());
                let wrapped = aes_wrap(&agreed, &cek).expect("wrap CEK");
                (cek, wrapped)
            }
        }
        family => panic!("{family:?} is not a key management family"),
    };

    let protected = b64(header.to_string());
    let content = factory
        .content_encryption_provider(&cek, encryption)
        .expect("content encryption provider")
        .encrypt(plaintext, protected.as_bytes())
        .expect("encrypt");

    format!(
        "{protected}.{}.{}.{}.{}",
        b64(encrypted_key),
        b64(content.iv),
        b64(content.ciphertext),
        b64(content.tag)
    )
}

pub fn random_bytes(length: usize) -> Vec<u8> {
    (0..length).map(|_| rand::random::<u8>()).collect()
}

/// Flip one bit in the decoded signature segment of a JWS
pub fn tamper_signature(token: &str, byte: usize, bit: u8) -> String {
    let (signing_input, signature) = token.rsplit_once('.').expect("three segments");
    let mut signature = URL_SAFE_NO_PAD.decode(signature).expect("base64url signature");
    let index = byte % signature.len();
    signature[index] ^= 1 << (bit % 8);
    format!("{signing_input}.{}", b64(signature))
}
