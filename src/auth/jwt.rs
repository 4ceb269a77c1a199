//! JWT bearer credential extraction
//!
//! Supports HS256, RS256 and ES256. A valid token establishes the identity on
//! its own; the `roles` claim (configurable) becomes the backend roles.

use super::{AuthError, AuthRequest, Challenge, CredentialExtractor, Credentials};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Type name in configuration
pub const TYPE: &str = "jwt";

const DEFAULT_SUBJECT_KEY: &str = "sub";
const DEFAULT_ROLES_KEY: &str = "roles";

/// JWT Claims
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub sub: Option<String>,
    pub exp: usize,
    #[serde(default)]
    pub iat: Option<usize>,
    #[serde(default)]
    pub iss: Option<String>,
    /// A single audience or a list of them
    #[serde(default)]
    pub aud: Option<Value>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// JWT credential extractor
///
/// # Example
///
/// ```
/// use authgate::auth::jwt::JwtExtractor;
///
/// // HS256 with secret
/// let extractor = JwtExtractor::new_hs256("my-secret");
///
/// // With issuer and audience validation
/// let extractor = JwtExtractor::new_hs256("my-secret")
///     .with_issuer("https://auth.example.com")
///     .with_audience("my-api");
/// ```
pub struct JwtExtractor {
    decoding_key: DecodingKey,
    validation: Validation,
    subject_key: String,
    roles_key: String,
}

impl JwtExtractor {
    /// Create a new JWT extractor with a secret key (HS256)
    pub fn new_hs256(secret: &str) -> Self {
        Self::with_key(
            DecodingKey::from_secret(secret.as_bytes()),
            Algorithm::HS256,
        )
    }

    /// Create a new JWT extractor with an RSA public key (RS256)
    pub fn new_rs256(public_key_pem: &str) -> Result<Self, AuthError> {
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        Ok(Self::with_key(decoding_key, Algorithm::RS256))
    }

    /// Create a new JWT extractor with an EC public key (ES256)
    ///
    /// Uses ECDSA with P-256 curve (also known as secp256r1 or prime256v1).
    pub fn new_es256(public_key_pem: &str) -> Result<Self, AuthError> {
        let decoding_key = DecodingKey::from_ec_pem(public_key_pem.as_bytes())
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        Ok(Self::with_key(decoding_key, Algorithm::ES256))
    }

    fn with_key(decoding_key: DecodingKey, algorithm: Algorithm) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.validate_exp = true;
        validation.validate_aud = false; // Only validate aud when explicitly set

        Self {
            decoding_key,
            validation,
            subject_key: DEFAULT_SUBJECT_KEY.to_string(),
            roles_key: DEFAULT_ROLES_KEY.to_string(),
        }
    }

    /// Set the required issuer (`iss` claim)
    #[must_use]
    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.validation.set_issuer(&[issuer]);
        self
    }

    /// Set the required audience (`aud` claim)
    #[must_use]
    pub fn with_audience(mut self, audience: &str) -> Self {
        self.validation.set_audience(&[audience]);
        self.validation.validate_aud = true;
        self
    }

    /// Claim holding the user name
    #[must_use]
    pub fn with_subject_key(mut self, key: &str) -> Self {
        self.subject_key = key.to_string();
        self
    }

    /// Claim holding the caller's roles
    #[must_use]
    pub fn with_roles_key(mut self, key: &str) -> Self {
        self.roles_key = key.to_string();
        self
    }

    /// Token from `Authorization: Bearer` or the `token` query parameter
    fn extract_token<'a>(&self, request: &'a AuthRequest) -> Option<&'a str> {
        if let Some(auth) = request.header("authorization") {
            if let Some(token) = auth.strip_prefix("Bearer ") {
                return Some(token.trim());
            }
        }

        request.query_param("token").filter(|t| !t.is_empty())
    }
}

impl CredentialExtractor for JwtExtractor {
    fn type_name(&self) -> &'static str {
        TYPE
    }

    fn extract(&self, request: &AuthRequest) -> Result<Option<Credentials>, AuthError> {
        let Some(token) = self.extract_token(request) else {
            return Ok(None);
        };

        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken(e.to_string()),
            },
        )?;

        let claims = token_data.claims;
        let subject = if self.subject_key == DEFAULT_SUBJECT_KEY {
            claims.sub.clone()
        } else {
            claims
                .extra
                .get(&self.subject_key)
                .and_then(Value::as_str)
                .map(str::to_string)
        }
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            AuthError::InvalidToken(format!("missing '{}' claim", self.subject_key))
        })?;

        let roles = match claims.extra.get(&self.roles_key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };

        debug!(subject = %subject, "JWT accepted");

        let mut credentials = Credentials::verified(subject).with_backend_roles(roles);
        if let Some(iss) = claims.iss {
            credentials = credentials.with_attribute("iss", iss);
        }
        let audience = match claims.aud {
            Some(Value::String(aud)) => Some(aud),
            Some(Value::Array(items)) => Some(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            _ => None,
        };
        if let Some(aud) = audience.filter(|aud| !aud.is_empty()) {
            credentials = credentials.with_attribute("aud", aud);
        }
        Ok(Some(credentials))
    }

    fn challenge(&self, _credentials: Option<&Credentials>) -> Option<Challenge> {
        Some(Challenge::www_authenticate("Bearer"))
    }
}
