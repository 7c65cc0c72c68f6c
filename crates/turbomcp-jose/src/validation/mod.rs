//! Token validation: signature search, JWE decryption, claim checks and replay detection

pub(crate) mod decryption;
pub mod parameters;
pub(crate) mod pipeline;
pub mod replay;
pub(crate) mod signature;

pub use parameters::{
    AlgorithmValidator, AudienceValidator, DEFAULT_CLOCK_SKEW, DEFAULT_NESTED_TOKEN_DEPTH,
    IssuerValidator, KeyResolver, LifetimeValidator, SignatureValidator, SigningKeyValidator,
    TokenReplayValidator, ValidationParameters,
};
pub use pipeline::DEFAULT_REPLAY_WINDOW_SECS;
pub use replay::{InMemoryReplayCache, TokenReplayCache};
