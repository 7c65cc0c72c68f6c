//! Compact serialization parser
//!
//! Parsing is purely syntactic: segment count, base64url decoding and JSON decoding
//! of the protected header (and, for JWS, the payload). No key is touched until a
//! token has parsed cleanly.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::{Map, Value};

use crate::algorithm::{Algorithm, EncryptionAlgorithm};
use crate::error::TokenValidationError;

/// Default upper bound on an encoded token, in bytes
pub const DEFAULT_MAXIMUM_TOKEN_SIZE: usize = 250_000;

const JWS_SEGMENTS: usize = 3;
const JWE_SEGMENTS: usize = 5;

/// Decoded JOSE protected header
#[derive(Debug, Clone, PartialEq)]
pub struct JwtHeader {
    /// Raw `alg` value; resolved to an [`Algorithm`] with [`JwtHeader::algorithm`]
    pub alg: String,
    pub enc: Option<String>,
    pub typ: Option<String>,
    pub cty: Option<String>,
    pub kid: Option<String>,
    pub x5t: Option<String>,
    pub zip: Option<String>,
    pub epk: Option<Value>,
    pub apu: Option<String>,
    pub apv: Option<String>,
    raw: Map<String, Value>,
}

impl JwtHeader {
    fn from_json(bytes: &[u8]) -> Result<Self, TokenValidationError> {
        let raw: Map<String, Value> = serde_json::from_slice(bytes)
            .map_err(|e| TokenValidationError::Malformed(format!("header is not a JSON object: {e}")))?;

        let text = |name: &str| -> Result<Option<String>, TokenValidationError> {
            match raw.get(name) {
                None => Ok(None),
                Some(Value::String(s)) => Ok(Some(s.clone())),
                Some(_) => Err(TokenValidationError::Malformed(format!(
                    "header parameter '{name}' must be a string"
                ))),
            }
        };

        let alg = text("alg")?
            .ok_or_else(|| TokenValidationError::Malformed("header has no 'alg'".to_string()))?;

        Ok(Self {
            alg,
            enc: text("enc")?,
            typ: text("typ")?,
            cty: text("cty")?,
            kid: text("kid")?,
            x5t: text("x5t")?,
            zip: text("zip")?,
            epk: raw.get("epk").cloned(),
            apu: text("apu")?,
            apv: text("apv")?,
            raw,
        })
    }

    /// Resolve `alg`
    ///
    /// # Errors
    /// Returns [`TokenValidationError::UnsupportedAlgorithm`] for names the engine does
    /// not implement.
    pub fn algorithm(&self) -> Result<Algorithm, TokenValidationError> {
        self.alg
            .parse()
            .map_err(|_| TokenValidationError::UnsupportedAlgorithm(self.alg.clone()))
    }

    /// Resolve `enc`
    ///
    /// # Errors
    /// Returns [`TokenValidationError::Malformed`] when `enc` is absent and
    /// [`TokenValidationError::UnsupportedAlgorithm`] for unknown values.
    pub fn encryption_algorithm(&self) -> Result<EncryptionAlgorithm, TokenValidationError> {
        let enc = self
            .enc
            .as_deref()
            .ok_or_else(|| TokenValidationError::Malformed("JWE header has no 'enc'".to_string()))?;
        enc.parse()
            .map_err(|_| TokenValidationError::UnsupportedAlgorithm(enc.to_string()))
    }

    /// Any header parameter by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.raw.get(name)
    }

    /// `cty: JWT` marks the plaintext of a JWE as a nested token
    pub fn announces_nested_jwt(&self) -> bool {
        self.cty
            .as_deref()
            .is_some_and(|cty| cty.eq_ignore_ascii_case("JWT"))
    }
}

/// Decoded claim set. Duplicate claim names resolve to the last occurrence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Claims(Map<String, Value>);

impl Claims {
    /// # Errors
    /// Returns [`TokenValidationError::Malformed`] if `bytes` is not a JSON object.
    pub fn from_json(bytes: &[u8]) -> Result<Self, TokenValidationError> {
        serde_json::from_slice(bytes)
            .map(Self)
            .map_err(|e| TokenValidationError::Malformed(format!("payload is not a JSON object: {e}")))
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn issuer(&self) -> Option<&str> {
        self.get("iss").and_then(Value::as_str)
    }

    pub fn subject(&self) -> Option<&str> {
        self.get("sub").and_then(Value::as_str)
    }

    /// `aud` as a list, whether it was sent as a string or an array of strings
    pub fn audiences(&self) -> Vec<&str> {
        match self.get("aud") {
            Some(Value::String(aud)) => vec![aud.as_str()],
            Some(Value::Array(values)) => values.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// `jti`
    pub fn token_id(&self) -> Option<&str> {
        self.get("jti").and_then(Value::as_str)
    }

    /// # Errors
    /// Returns [`TokenValidationError::InvalidLifetime`] if `exp` is not a NumericDate.
    pub fn expiration(&self) -> Result<Option<i64>, TokenValidationError> {
        self.numeric_date("exp")
    }

    /// # Errors
    /// Returns [`TokenValidationError::InvalidLifetime`] if `nbf` is not a NumericDate.
    pub fn not_before(&self) -> Result<Option<i64>, TokenValidationError> {
        self.numeric_date("nbf")
    }

    /// # Errors
    /// Returns [`TokenValidationError::InvalidLifetime`] if `iat` is not a NumericDate.
    pub fn issued_at(&self) -> Result<Option<i64>, TokenValidationError> {
        self.numeric_date("iat")
    }

    /// Seconds since the epoch, from a JSON number or a decimal string.
    /// Fractional seconds are truncated.
    fn numeric_date(&self, name: &str) -> Result<Option<i64>, TokenValidationError> {
        let invalid = || TokenValidationError::InvalidLifetime(format!("'{name}' is not a NumericDate"));
        match self.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(number)) => number
                .as_i64()
                .or_else(|| number.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
                .map(Some)
                .ok_or_else(invalid),
            Some(Value::String(text)) => {
                let text = text.trim();
                text.parse::<i64>()
                    .ok()
                    .or_else(|| text.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
                    .map(Some)
                    .ok_or_else(invalid)
            }
            Some(_) => Err(invalid()),
        }
    }
}

#[derive(Debug, Clone)]
enum TokenBody {
    Jws {
        claims: Claims,
        signature: Vec<u8>,
    },
    Jwe {
        encrypted_key: Vec<u8>,
        iv: Vec<u8>,
        ciphertext: Vec<u8>,
        tag: Vec<u8>,
        decrypted: Option<Decrypted>,
    },
}

#[derive(Debug, Clone)]
enum Decrypted {
    Nested(Box<JsonWebToken>),
    Claims(Claims),
}

/// Encrypted segments of a JWE
#[derive(Debug, Clone, Copy)]
pub struct JweParts<'a> {
    pub encrypted_key: &'a [u8],
    pub iv: &'a [u8],
    pub ciphertext: &'a [u8],
    pub tag: &'a [u8],
    /// ASCII bytes of the protected header segment
    pub aad: &'a [u8],
}

/// A parsed compact token (JWS or JWE)
#[derive(Debug, Clone)]
pub struct JsonWebToken {
    encoded: String,
    header: JwtHeader,
    header_end: usize,
    signing_input_end: usize,
    body: TokenBody,
}

impl JsonWebToken {
    /// Parse with the default size limit
    ///
    /// # Errors
    /// Returns [`TokenValidationError::Malformed`] for anything that is not a well-formed
    /// compact JWS or JWE.
    pub fn parse(token: &str) -> Result<Self, TokenValidationError> {
        Self::parse_with_limit(token, DEFAULT_MAXIMUM_TOKEN_SIZE)
    }

    /// # Errors
    /// See [`JsonWebToken::parse`]; tokens longer than `maximum_size` bytes are malformed.
    pub fn parse_with_limit(token: &str, maximum_size: usize) -> Result<Self, TokenValidationError> {
        if token.len() > maximum_size {
            return Err(TokenValidationError::Malformed(format!(
                "token is {} bytes, limit is {maximum_size}",
                token.len()
            )));
        }

        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != JWS_SEGMENTS && segments.len() != JWE_SEGMENTS {
            return Err(TokenValidationError::Malformed(format!(
                "expected 3 or 5 segments, found {}",
                segments.len()
            )));
        }

        let decoded = segments
            .iter()
            .enumerate()
            .map(|(index, segment)| {
                URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
                    TokenValidationError::Malformed(format!("segment {index} is not base64url: {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut decoded = decoded.into_iter();
        let header_bytes = decoded.next().unwrap_or_default();
        let header = JwtHeader::from_json(&header_bytes)?;

        let header_end = segments[0].len();
        let signing_input_end = header_end + 1 + segments[1].len();

        let body = if segments.len() == JWS_SEGMENTS {
            if header.enc.is_some() {
                return Err(TokenValidationError::Malformed(
                    "JWS header must not carry 'enc'".to_string(),
                ));
            }
            let payload = decoded.next().unwrap_or_default();
            TokenBody::Jws {
                claims: Claims::from_json(&payload)?,
                signature: decoded.next().unwrap_or_default(),
            }
        } else {
            if header.enc.is_none() {
                return Err(TokenValidationError::Malformed(
                    "JWE header has no 'enc'".to_string(),
                ));
            }
            TokenBody::Jwe {
                encrypted_key: decoded.next().unwrap_or_default(),
                iv: decoded.next().unwrap_or_default(),
                ciphertext: decoded.next().unwrap_or_default(),
                tag: decoded.next().unwrap_or_default(),
                decrypted: None,
            }
        };

        Ok(Self {
            encoded: token.to_string(),
            header,
            header_end,
            signing_input_end,
            body,
        })
    }

    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    pub fn header(&self) -> &JwtHeader {
        &self.header
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self.body, TokenBody::Jwe { .. })
    }

    /// Claims of this token. For a JWE these are the decrypted (innermost) claims and
    /// are `None` until decryption succeeded.
    pub fn claims(&self) -> Option<&Claims> {
        match &self.body {
            TokenBody::Jws { claims, .. } => Some(claims),
            TokenBody::Jwe { decrypted, .. } => match decrypted {
                Some(Decrypted::Nested(inner)) => inner.claims(),
                Some(Decrypted::Claims(claims)) => Some(claims),
                None => None,
            },
        }
    }

    /// The token carried inside a decrypted JWE
    pub fn inner_token(&self) -> Option<&JsonWebToken> {
        match &self.body {
            TokenBody::Jwe {
                decrypted: Some(Decrypted::Nested(inner)),
                ..
            } => Some(inner),
            _ => None,
        }
    }

    /// JWS signing input: `header "." payload`, exactly as received
    pub fn signing_input(&self) -> &[u8] {
        &self.encoded.as_bytes()[..self.signing_input_end]
    }

    /// The base64url signature segment, as received
    pub fn signature_segment(&self) -> &str {
        match self.body {
            TokenBody::Jws { .. } => &self.encoded[self.signing_input_end + 1..],
            TokenBody::Jwe { .. } => "",
        }
    }

    /// Decoded signature bytes (empty for a JWE or an unsecured JWS)
    pub fn signature(&self) -> &[u8] {
        match &self.body {
            TokenBody::Jws { signature, .. } => signature,
            TokenBody::Jwe { .. } => &[],
        }
    }

    pub fn jwe_parts(&self) -> Option<JweParts<'_>> {
        match &self.body {
            TokenBody::Jwe {
                encrypted_key,
                iv,
                ciphertext,
                tag,
                ..
            } => Some(JweParts {
                encrypted_key,
                iv,
                ciphertext,
                tag,
                aad: &self.encoded.as_bytes()[..self.header_end],
            }),
            TokenBody::Jws { .. } => None,
        }
    }

    /// Copy of this JWE with its decrypted inner token attached
    pub(crate) fn with_inner_token(&self, inner: JsonWebToken) -> Self {
        self.with_decrypted(Decrypted::Nested(Box::new(inner)))
    }

    /// Copy of this JWE with its decrypted claim set attached
    pub(crate) fn with_decrypted_claims(&self, claims: Claims) -> Self {
        self.with_decrypted(Decrypted::Claims(claims))
    }

    fn with_decrypted(&self, value: Decrypted) -> Self {
        let mut token = self.clone();
        if let TokenBody::Jwe { decrypted, .. } = &mut token.body {
            *decrypted = Some(value);
        }
        token
    }
}

/// Syntactic pre-check: segment count, base64url alphabet and size, without decoding
pub fn can_read_token(token: &str, maximum_size: usize) -> bool {
    if token.is_empty() || token.len() > maximum_size {
        return false;
    }
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != JWS_SEGMENTS && segments.len() != JWE_SEGMENTS {
        return false;
    }
    !segments[0].is_empty()
        && segments.iter().all(|segment| {
            segment
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        })
}

/// Parse a token without validating it
///
/// # Errors
/// Returns [`TokenValidationError::Malformed`] for anything that does not parse.
pub fn read_token(token: &str) -> Result<JsonWebToken, TokenValidationError> {
    JsonWebToken::parse(token)
}
