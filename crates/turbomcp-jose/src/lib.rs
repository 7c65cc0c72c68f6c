//! # TurboMCP JOSE - Token Validation and Key Resolution
//!
//! Validates compact JWS (RFC 7515) and JWE (RFC 7516) tokens against a configured set
//! of trusted keys, issuers and audiences. The engine is synchronous and performs no
//! I/O: key sets (e.g. a fetched JWKS) are handed to it ready to use.
//!
//! ## Core Features
//!
//! - ✅ **JWS** - HS256/384/512, RS256/384/512, PS256/384/512, ES256, ES384
//! - ✅ **JWE** - `dir`, RSA-OAEP(-256), AES key wrap, ECDH-ES (+A*KW) with AES-GCM
//!   and AES-CBC-HMAC content encryption
//! - ✅ **Candidate key search** - `kid`/`x5t` match first, then every configured key,
//!   with per-key failure diagnostics
//! - ✅ **Nested tokens** - signed-then-encrypted tokens with a bounded depth
//! - ✅ **Claims pipeline** - algorithm, lifetime, issuer, audience, signing-key policy
//!   and replay checks, each replaceable by a custom delegate
//! - ✅ **Provider cache** - concurrent, per-handler cache of crypto providers
//!
//! ## Error Model
//!
//! Expected rejections (expired, wrong audience, bad signature) come back as
//! [`TokenValidationResult::Invalid`]. Only misconfiguration is an `Err`
//! ([`ConfigurationError`]).
//!
//! ## Architecture
//!
//! - `algorithm` - JWA identifiers
//! - `key` - security key model (symmetric, RSA/EC, JWK)
//! - `crypto` - crypto providers and the provider cache
//! - `token` - compact serialization parser
//! - `validation` - signature search, decryption, claims pipeline, replay cache
//! - `handler` - [`JsonWebTokenHandler`], the validation entry point
//! - `config` - serde-loadable [`ValidationConfig`]
//!
//! ## Example
//!
//! ```rust
//! use turbomcp_jose::{
//!     Algorithm, CryptoProviderFactory, JsonWebTokenHandler, KeyUsage, SecurityKey,
//!     SymmetricSecurityKey, ValidationParameters,
//! };
//! use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
//!
//! let key: SecurityKey = SymmetricSecurityKey::new(vec![0x5a; 32])?.into();
//!
//! // Issue a token with the crate's own signing provider
//! let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
//! let payload = URL_SAFE_NO_PAD.encode(r#"{"iss":"https://issuer.example","aud":"api","exp":4102444800}"#);
//! let signing_input = format!("{header}.{payload}");
//! let signature = CryptoProviderFactory::new()
//!     .signature_provider(&key, Algorithm::HS256, KeyUsage::Sign)?
//!     .sign(signing_input.as_bytes())
//!     .expect("HMAC signing");
//! let token = format!("{signing_input}.{signature}");
//!
//! let params = ValidationParameters::new()
//!     .with_valid_issuer("https://issuer.example")
//!     .with_valid_audience("api")
//!     .with_signing_key(key);
//!
//! let result = JsonWebTokenHandler::new().validate_token(&token, &params)?;
//! assert!(result.is_valid());
//! # Ok::<(), turbomcp_jose::ConfigurationError>(())
//! ```

pub mod algorithm;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handler;
pub mod key;
pub mod result;
pub mod token;
pub mod validation;

pub use algorithm::{Algorithm, AlgorithmFamily, EcCurve, EncryptionAlgorithm};
pub use config::ValidationConfig;
pub use crypto::{
    AuthenticatedEncryptionProvider, CryptoError, CryptoProviderFactory, KeyAgreementProvider,
    KeyWrapProvider, SignatureProvider,
};
pub use error::{
    ClaimKind, ConfigurationError, KeyAttempt, KeyAttemptFailure, TokenValidationError,
    ValidationErrorKind,
};
pub use handler::JsonWebTokenHandler;
pub use key::{
    AsymmetricSecurityKey, JsonWebKey, JsonWebKeySet, JsonWebSecurityKey, KeyUsage,
    PrivateKeyExistence, PublicKeyMaterial, SecurityKey, SymmetricSecurityKey,
};
pub use result::{TokenValidationResult, ValidatedToken};
pub use token::{
    Claims, DEFAULT_MAXIMUM_TOKEN_SIZE, JsonWebToken, JwtHeader, can_read_token, read_token,
};
pub use validation::{
    DEFAULT_CLOCK_SKEW, DEFAULT_NESTED_TOKEN_DEPTH, InMemoryReplayCache, TokenReplayCache,
    ValidationParameters,
};
