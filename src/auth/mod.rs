//! Authentication capabilities
//!
//! Two capability contracts make up an authentication domain:
//!
//! - [`CredentialExtractor`] pulls raw credentials out of a request and knows
//!   how to prompt the client for another round trip.
//! - [`AuthenticationBackend`] verifies credentials against a user store and
//!   returns the authenticated identity with its roles.
//!
//! Built-in extractors: `basic`, `proxy`, `jwt`.
//! Built-in backends: `internal` (alias `intern`), `noop`.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::net::SocketAddr;
use thiserror::Error;

pub mod basic;
pub mod internal;
pub mod jwt;
pub mod noop;
pub mod password;
pub mod proxy;
pub mod session;

/// Authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingCredentials,

    #[error("Invalid authentication header: {0}")]
    InvalidHeader(String),

    #[error("User '{0}' not found")]
    NotFound(String),

    #[error("Empty passwords are not supported")]
    EmptyCredential,

    #[error("Invalid credentials")]
    CredentialsInvalid,

    #[error("Authentication backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Password hash error: {0}")]
    Hash(String),
}

/// Authentication request context
#[derive(Debug, Clone, Default)]
pub struct AuthRequest {
    /// Header names are lowercase
    pub headers: HashMap<String, String>,
    pub query: Option<String>,
    pub method: String,
    pub path: String,
    /// Resolved client address, when known
    pub remote_addr: Option<SocketAddr>,
}

impl AuthRequest {
    /// Header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// First query parameter with the given name
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.as_deref()?.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (key == name).then_some(value)
        })
    }
}

/// Raw credentials pulled out of a request
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    secret: Option<Vec<u8>>,
    complete: bool,
    backend_roles: BTreeSet<String>,
    attributes: HashMap<String, String>,
}

impl Credentials {
    /// Credentials with a secret that still has to be verified
    pub fn new(username: impl Into<String>, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            username: username.into(),
            secret: Some(secret.into()),
            complete: false,
            backend_roles: BTreeSet::new(),
            attributes: HashMap::new(),
        }
    }

    /// Credentials the extractor already verified (token or trusted header)
    pub fn verified(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: None,
            complete: true,
            backend_roles: BTreeSet::new(),
            attributes: HashMap::new(),
        }
    }

    /// Attach roles asserted by the extractor
    #[must_use]
    pub fn with_backend_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.backend_roles.extend(roles.into_iter().map(Into::into));
        self
    }

    /// Attach an extra context attribute
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Presented secret; `None` when the mechanism carries no secret
    pub fn secret(&self) -> Option<&[u8]> {
        self.secret.as_deref()
    }

    /// Whether the extractor already established the identity
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn backend_roles(&self) -> &BTreeSet<String> {
        &self.backend_roles
    }

    pub fn attributes(&self) -> &HashMap<String, String> {
        &self.attributes
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("complete", &self.complete)
            .field("backend_roles", &self.backend_roles)
            .finish()
    }
}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub roles: BTreeSet<String>,
}

impl Identity {
    pub fn new<I, S>(username: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            username: username.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Roleless identity granted by anonymous fallback
    pub fn anonymous() -> Self {
        Self {
            username: ANONYMOUS_USER.to_string(),
            roles: BTreeSet::new(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.username == ANONYMOUS_USER && self.roles.is_empty()
    }
}

/// Username carried by the anonymous identity
pub const ANONYMOUS_USER: &str = "anonymous";

/// Re-authentication prompt sent back with a 401
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub header: String,
    pub value: String,
}

impl Challenge {
    /// `WWW-Authenticate` challenge with the given value
    pub fn www_authenticate(value: impl Into<String>) -> Self {
        Self {
            header: "WWW-Authenticate".to_string(),
            value: value.into(),
        }
    }
}

/// Pulls credentials out of a request
pub trait CredentialExtractor: Send + Sync {
    /// Stable type name used in configuration
    fn type_name(&self) -> &'static str;

    /// Extract credentials.
    ///
    /// `Ok(None)` means the request carries nothing for this mechanism and
    /// another round trip would be needed.
    fn extract(&self, request: &AuthRequest) -> Result<Option<Credentials>, AuthError>;

    /// Prompt asking the client to authenticate again.
    ///
    /// `None` when the mechanism has no way to challenge.
    fn challenge(&self, credentials: Option<&Credentials>) -> Option<Challenge>;
}

/// Verifies credentials against a user store
#[async_trait]
pub trait AuthenticationBackend: Send + Sync {
    /// Stable type name used in configuration
    fn type_name(&self) -> &'static str;

    /// Verify credentials and return the identity with its roles
    async fn authenticate(&self, credentials: &Credentials) -> Result<Identity, AuthError>;

    /// Whether the user is known to this backend
    async fn exists(&self, username: &str) -> Result<bool, AuthError>;
}
