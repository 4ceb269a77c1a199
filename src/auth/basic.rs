//! HTTP Basic credential extraction
//!
//! Reads `Authorization: Basic <base64(user:password)>` and challenges with
//! `WWW-Authenticate: Basic realm="..."`.

use super::{AuthError, AuthRequest, Challenge, CredentialExtractor, Credentials};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Type name in configuration
pub const TYPE: &str = "basic";

const DEFAULT_REALM: &str = "Authorization Required";

/// Basic credential extractor
///
/// # Example
///
/// ```
/// use authgate::auth::basic::BasicExtractor;
/// use authgate::auth::{AuthRequest, CredentialExtractor};
///
/// let extractor = BasicExtractor::new();
/// let mut request = AuthRequest::default();
/// request
///     .headers
///     .insert("authorization".into(), "Basic a2lyazplbnRlcnByaXNl".into());
///
/// let credentials = extractor.extract(&request).unwrap().unwrap();
/// assert_eq!(credentials.username(), "kirk");
/// ```
#[derive(Debug, Clone)]
pub struct BasicExtractor {
    realm: String,
}

impl BasicExtractor {
    pub fn new() -> Self {
        Self {
            realm: DEFAULT_REALM.to_string(),
        }
    }

    /// Set the realm announced in the challenge
    #[must_use]
    pub fn with_realm(mut self, realm: &str) -> Self {
        self.realm = realm.to_string();
        self
    }
}

impl Default for BasicExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialExtractor for BasicExtractor {
    fn type_name(&self) -> &'static str {
        TYPE
    }

    fn extract(&self, request: &AuthRequest) -> Result<Option<Credentials>, AuthError> {
        let Some(header) = request.header("authorization") else {
            return Ok(None);
        };

        let Some(encoded) = strip_scheme(header, "basic") else {
            // Some other scheme; not for us
            return Ok(None);
        };

        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|e| AuthError::InvalidHeader(format!("invalid base64: {}", e)))?;

        let separator = decoded
            .iter()
            .position(|b| *b == b':')
            .ok_or_else(|| AuthError::InvalidHeader("missing ':' separator".into()))?;

        let username = std::str::from_utf8(&decoded[..separator])
            .map_err(|_| AuthError::InvalidHeader("username is not UTF-8".into()))?;

        if username.is_empty() {
            return Err(AuthError::InvalidHeader("empty username".into()));
        }

        Ok(Some(Credentials::new(username, &decoded[separator + 1..])))
    }

    fn challenge(&self, _credentials: Option<&Credentials>) -> Option<Challenge> {
        Some(Challenge::www_authenticate(format!(
            "Basic realm=\"{}\"",
            self.realm
        )))
    }
}

/// Strip an auth scheme prefix case-insensitively
fn strip_scheme<'a>(header: &'a str, scheme: &str) -> Option<&'a str> {
    let (prefix, rest) = header.trim_start().split_once(' ')?;
    prefix.eq_ignore_ascii_case(scheme).then_some(rest)
}

/// Encode a `user:password` pair as a Basic header value
pub fn encode_header(username: &str, password: &str) -> String {
    format!(
        "Basic {}",
        STANDARD.encode(format!("{}:{}", username, password))
    )
}
