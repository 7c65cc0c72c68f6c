//! Validation parameters: trust configuration, step toggles and custom delegates

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::algorithm::Algorithm;
use crate::key::SecurityKey;
use crate::token::{Claims, DEFAULT_MAXIMUM_TOKEN_SIZE, JsonWebToken, JwtHeader};

use super::replay::TokenReplayCache;

/// Default clock skew tolerance (5 minutes)
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Default number of nesting levels allowed below the outer token
pub const DEFAULT_NESTED_TOKEN_DEPTH: usize = 1;

/// Replaces the built-in issuer check. Receives the `iss` claim.
pub type IssuerValidator = Arc<dyn Fn(Option<&str>, &Claims) -> Result<(), String> + Send + Sync>;

/// Replaces the built-in audience check. Receives the `aud` values.
pub type AudienceValidator = Arc<dyn Fn(&[&str], &Claims) -> Result<(), String> + Send + Sync>;

/// Replaces the built-in lifetime check. Receives `nbf` and `exp`.
pub type LifetimeValidator =
    Arc<dyn Fn(Option<i64>, Option<i64>, &Claims) -> Result<(), String> + Send + Sync>;

/// Replaces the built-in accepted-algorithm check
pub type AlgorithmValidator = Arc<dyn Fn(Algorithm) -> Result<(), String> + Send + Sync>;

/// Replaces candidate-key signature validation. Returns the key to report as the signing key.
pub type SignatureValidator =
    Arc<dyn Fn(&JsonWebToken) -> Result<Option<Arc<SecurityKey>>, String> + Send + Sync>;

/// Policy hook over the key that verified the signature
pub type SigningKeyValidator = Arc<dyn Fn(&SecurityKey, &Claims) -> Result<(), String> + Send + Sync>;

/// Replaces the built-in replay check. Receives `jti` and `exp`.
pub type TokenReplayValidator =
    Arc<dyn Fn(Option<&str>, Option<i64>, &Claims) -> Result<(), String> + Send + Sync>;

/// Supplies extra candidate keys for a token header, tried after the configured keys
pub type KeyResolver = Arc<dyn Fn(&JwtHeader) -> Vec<Arc<SecurityKey>> + Send + Sync>;

/// Everything the engine needs to decide whether a token is trusted
#[derive(Clone)]
pub struct ValidationParameters {
    pub valid_issuers: Vec<String>,
    pub valid_audiences: Vec<String>,
    pub issuer_signing_keys: Vec<Arc<SecurityKey>>,
    pub token_decryption_keys: Vec<Arc<SecurityKey>>,
    /// `None` accepts every supported algorithm except `none`
    pub valid_algorithms: Option<HashSet<Algorithm>>,
    pub clock_skew: Duration,

    pub validate_algorithm: bool,
    pub validate_lifetime: bool,
    pub validate_issuer: bool,
    pub validate_audience: bool,
    pub validate_signature: bool,
    pub validate_issuer_signing_key: bool,
    pub validate_token_replay: bool,

    pub require_signed_tokens: bool,
    pub require_expiration_time: bool,
    pub require_audience: bool,
    pub require_token_id: bool,

    /// Levels of nesting allowed below the outer token
    pub nested_token_depth: usize,
    pub maximum_token_size: usize,

    pub token_replay_cache: Option<Arc<dyn TokenReplayCache>>,

    pub issuer_validator: Option<IssuerValidator>,
    pub audience_validator: Option<AudienceValidator>,
    pub lifetime_validator: Option<LifetimeValidator>,
    pub algorithm_validator: Option<AlgorithmValidator>,
    pub signature_validator: Option<SignatureValidator>,
    pub issuer_signing_key_validator: Option<SigningKeyValidator>,
    pub token_replay_validator: Option<TokenReplayValidator>,

    pub issuer_signing_key_resolver: Option<KeyResolver>,
    pub token_decryption_key_resolver: Option<KeyResolver>,
}

impl Default for ValidationParameters {
    fn default() -> Self {
        Self {
            valid_issuers: Vec::new(),
            valid_audiences: Vec::new(),
            issuer_signing_keys: Vec::new(),
            token_decryption_keys: Vec::new(),
            valid_algorithms: None,
            clock_skew: DEFAULT_CLOCK_SKEW,
            validate_algorithm: true,
            validate_lifetime: true,
            validate_issuer: true,
            validate_audience: true,
            validate_signature: true,
            validate_issuer_signing_key: true,
            validate_token_replay: true,
            require_signed_tokens: true,
            require_expiration_time: true,
            require_audience: true,
            require_token_id: false,
            nested_token_depth: DEFAULT_NESTED_TOKEN_DEPTH,
            maximum_token_size: DEFAULT_MAXIMUM_TOKEN_SIZE,
            token_replay_cache: None,
            issuer_validator: None,
            audience_validator: None,
            lifetime_validator: None,
            algorithm_validator: None,
            signature_validator: None,
            issuer_signing_key_validator: None,
            token_replay_validator: None,
            issuer_signing_key_resolver: None,
            token_decryption_key_resolver: None,
        }
    }
}

impl ValidationParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_valid_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.valid_issuers.push(issuer.into());
        self
    }

    pub fn with_valid_audience(mut self, audience: impl Into<String>) -> Self {
        self.valid_audiences.push(audience.into());
        self
    }

    pub fn with_signing_key(mut self, key: impl Into<Arc<SecurityKey>>) -> Self {
        self.issuer_signing_keys.push(key.into());
        self
    }

    pub fn with_signing_keys(mut self, keys: impl IntoIterator<Item = Arc<SecurityKey>>) -> Self {
        self.issuer_signing_keys.extend(keys);
        self
    }

    pub fn with_decryption_key(mut self, key: impl Into<Arc<SecurityKey>>) -> Self {
        self.token_decryption_keys.push(key.into());
        self
    }

    /// Restrict accepted algorithms
    pub fn with_valid_algorithms(mut self, algorithms: impl IntoIterator<Item = Algorithm>) -> Self {
        self.valid_algorithms = Some(algorithms.into_iter().collect());
        self
    }

    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    pub fn with_nested_token_depth(mut self, depth: usize) -> Self {
        self.nested_token_depth = depth;
        self
    }

    pub fn with_maximum_token_size(mut self, bytes: usize) -> Self {
        self.maximum_token_size = bytes;
        self
    }

    pub fn with_replay_cache(mut self, cache: Arc<dyn TokenReplayCache>) -> Self {
        self.token_replay_cache = Some(cache);
        self
    }

    /// Turn off issuer and audience checks, e.g. for first-party tokens
    pub fn without_issuer_and_audience(mut self) -> Self {
        self.validate_issuer = false;
        self.validate_audience = false;
        self
    }

    pub fn with_issuer_validator(
        mut self,
        validator: impl Fn(Option<&str>, &Claims) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.issuer_validator = Some(Arc::new(validator));
        self
    }

    pub fn with_audience_validator(
        mut self,
        validator: impl Fn(&[&str], &Claims) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.audience_validator = Some(Arc::new(validator));
        self
    }

    pub fn with_lifetime_validator(
        mut self,
        validator: impl Fn(Option<i64>, Option<i64>, &Claims) -> Result<(), String>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.lifetime_validator = Some(Arc::new(validator));
        self
    }

    pub fn with_algorithm_validator(
        mut self,
        validator: impl Fn(Algorithm) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.algorithm_validator = Some(Arc::new(validator));
        self
    }

    pub fn with_signature_validator(
        mut self,
        validator: impl Fn(&JsonWebToken) -> Result<Option<Arc<SecurityKey>>, String>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.signature_validator = Some(Arc::new(validator));
        self
    }

    pub fn with_signing_key_validator(
        mut self,
        validator: impl Fn(&SecurityKey, &Claims) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.issuer_signing_key_validator = Some(Arc::new(validator));
        self
    }

    pub fn with_replay_validator(
        mut self,
        validator: impl Fn(Option<&str>, Option<i64>, &Claims) -> Result<(), String>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.token_replay_validator = Some(Arc::new(validator));
        self
    }

    pub fn with_signing_key_resolver(
        mut self,
        resolver: impl Fn(&JwtHeader) -> Vec<Arc<SecurityKey>> + Send + Sync + 'static,
    ) -> Self {
        self.issuer_signing_key_resolver = Some(Arc::new(resolver));
        self
    }

    pub fn with_decryption_key_resolver(
        mut self,
        resolver: impl Fn(&JwtHeader) -> Vec<Arc<SecurityKey>> + Send + Sync + 'static,
    ) -> Self {
        self.token_decryption_key_resolver = Some(Arc::new(resolver));
        self
    }

    /// Whether `algorithm` may be used at all.
    ///
    /// `none` is only accepted when signed tokens are not required, and then only if the
    /// explicit allow-list (when set) names it.
    pub fn is_algorithm_accepted(&self, algorithm: Algorithm) -> bool {
        if algorithm == Algorithm::None {
            return !self.require_signed_tokens
                && self
                    .valid_algorithms
                    .as_ref()
                    .is_none_or(|set| set.contains(&algorithm));
        }
        self.valid_algorithms
            .as_ref()
            .is_none_or(|set| set.contains(&algorithm))
    }

    /// Clock skew in whole seconds
    pub fn clock_skew_secs(&self) -> i64 {
        i64::try_from(self.clock_skew.as_secs()).unwrap_or(i64::MAX)
    }
}

impl fmt::Debug for ValidationParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationParameters")
            .field("valid_issuers", &self.valid_issuers)
            .field("valid_audiences", &self.valid_audiences)
            .field("issuer_signing_keys", &self.issuer_signing_keys.len())
            .field("token_decryption_keys", &self.token_decryption_keys.len())
            .field("valid_algorithms", &self.valid_algorithms)
            .field("clock_skew", &self.clock_skew)
            .field("require_signed_tokens", &self.require_signed_tokens)
            .field("nested_token_depth", &self.nested_token_depth)
            .field("token_replay_cache", &self.token_replay_cache.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = ValidationParameters::default();
        assert_eq!(params.clock_skew, Duration::from_secs(300));
        assert_eq!(params.nested_token_depth, 1);
        assert_eq!(params.maximum_token_size, 250_000);
        assert!(params.require_signed_tokens);
        assert!(params.require_expiration_time);
        assert!(params.validate_lifetime && params.validate_issuer && params.validate_audience);
        assert!(params.validate_token_replay);
    }

    #[test]
    fn test_algorithm_acceptance() {
        let params = ValidationParameters::default();
        assert!(params.is_algorithm_accepted(Algorithm::RS256));
        assert!(!params.is_algorithm_accepted(Algorithm::None));

        let params = ValidationParameters {
            require_signed_tokens: false,
            ..ValidationParameters::default()
        };
        assert!(params.is_algorithm_accepted(Algorithm::None));

        let params = params.with_valid_algorithms([Algorithm::ES256]);
        assert!(params.is_algorithm_accepted(Algorithm::ES256));
        assert!(!params.is_algorithm_accepted(Algorithm::RS256));
        assert!(!params.is_algorithm_accepted(Algorithm::None));
    }

    #[test]
    fn test_debug_hides_delegates_and_keys() {
        let params = ValidationParameters::new()
            .with_valid_issuer("https://issuer")
            .with_issuer_validator(|_, _| Ok(()));
        let rendered = format!("{params:?}");
        assert!(rendered.contains("https://issuer"));
        assert!(rendered.contains("issuer_signing_keys: 0"));
    }
}
