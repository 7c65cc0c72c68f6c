//! Validation result types

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::algorithm::Algorithm;
use crate::error::TokenValidationError;
use crate::key::SecurityKey;
use crate::token::{Claims, JsonWebToken};

/// A token that passed every enabled validation step
#[derive(Debug, Clone)]
pub struct ValidatedToken {
    /// The outermost token as received. For a JWE this carries the decrypted inner
    /// token (see [`ValidatedToken::inner_token`]).
    pub token: JsonWebToken,
    /// Claims of the innermost validated layer
    pub claims: Claims,
    /// Signing algorithm of the innermost layer; `None` for unsigned payloads
    pub algorithm: Option<Algorithm>,
    /// Key that verified the signature, if one was used
    pub signing_key: Option<Arc<SecurityKey>>,
    /// Key that decrypted the outermost JWE, if the token was encrypted
    pub decryption_key: Option<Arc<SecurityKey>>,
}

impl ValidatedToken {
    /// The signed token inside an encrypted one
    pub fn inner_token(&self) -> Option<&JsonWebToken> {
        self.token.inner_token()
    }

    pub fn issuer(&self) -> Option<&str> {
        self.claims.issuer()
    }

    pub fn subject(&self) -> Option<&str> {
        self.claims.subject()
    }

    /// `iat` as a [`SystemTime`]; `None` when absent, unparseable or before the epoch
    pub fn issued_at(&self) -> Option<SystemTime> {
        to_system_time(self.claims.issued_at().ok().flatten())
    }

    /// `exp` as a [`SystemTime`]
    pub fn expires_at(&self) -> Option<SystemTime> {
        to_system_time(self.claims.expiration().ok().flatten())
    }
}

fn to_system_time(seconds: Option<i64>) -> Option<SystemTime> {
    let seconds = u64::try_from(seconds?).ok()?;
    UNIX_EPOCH.checked_add(Duration::from_secs(seconds))
}

/// Outcome of validating one token.
///
/// Expected rejections live in [`TokenValidationResult::Invalid`]; configuration errors
/// are returned separately as `Err` by the handler.
#[derive(Debug, Clone)]
pub enum TokenValidationResult {
    Valid(Box<ValidatedToken>),
    Invalid(TokenValidationError),
}

impl TokenValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, TokenValidationResult::Valid(_))
    }

    pub fn error(&self) -> Option<&TokenValidationError> {
        match self {
            TokenValidationResult::Valid(_) => None,
            TokenValidationResult::Invalid(error) => Some(error),
        }
    }

    pub fn validated(&self) -> Option<&ValidatedToken> {
        match self {
            TokenValidationResult::Valid(token) => Some(token),
            TokenValidationResult::Invalid(_) => None,
        }
    }

    /// Claims of a valid token
    pub fn claims(&self) -> Option<&Claims> {
        self.validated().map(|token| &token.claims)
    }

    /// Convert into a `Result` for `?`-style handling
    ///
    /// # Errors
    /// Returns the rejection reason when the token is invalid.
    pub fn into_result(self) -> Result<ValidatedToken, TokenValidationError> {
        match self {
            TokenValidationResult::Valid(token) => Ok(*token),
            TokenValidationResult::Invalid(error) => Err(error),
        }
    }
}

impl From<TokenValidationError> for TokenValidationResult {
    fn from(error: TokenValidationError) -> Self {
        TokenValidationResult::Invalid(error)
    }
}
