//! Authentication domains
//!
//! An [`AuthDomain`] pairs one credential extractor with one authentication
//! backend. The [`ActiveChain`] is the ordered set of domains tried for every
//! request, together with the anonymous-access flag. Chains are immutable and
//! replaced wholesale by the [`AuthenticationDomainRegistry`].

mod factory;
mod registry;

pub use factory::{AuthTypeRegistry, BackendFactory, ExtractorFactory};
pub use registry::AuthenticationDomainRegistry;

use crate::auth::{AuthenticationBackend, CredentialExtractor};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Name given to the synthesized fallback domain
pub const DEFAULT_DOMAIN_NAME: &str = "default";

/// Domain construction errors
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Unknown {kind} type '{name}'")]
    UnknownType { kind: &'static str, name: String },

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("No default authentication domain could be constructed")]
    NoDefaultDomain,
}

/// One configured (extractor, backend) pairing
pub struct AuthDomain {
    name: String,
    order: i64,
    challenge: bool,
    extractor: Arc<dyn CredentialExtractor>,
    backend: Arc<dyn AuthenticationBackend>,
}

impl AuthDomain {
    pub fn new(
        name: impl Into<String>,
        order: i64,
        challenge: bool,
        extractor: Arc<dyn CredentialExtractor>,
        backend: Arc<dyn AuthenticationBackend>,
    ) -> Self {
        Self {
            name: name.into(),
            order,
            challenge,
            extractor,
            backend,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn order(&self) -> i64 {
        self.order
    }

    /// Whether a request without credentials for this domain is challenged
    /// instead of passed on to the next domain
    pub fn challenge(&self) -> bool {
        self.challenge
    }

    pub fn extractor(&self) -> &dyn CredentialExtractor {
        self.extractor.as_ref()
    }

    pub fn backend(&self) -> &dyn AuthenticationBackend {
        self.backend.as_ref()
    }
}

impl fmt::Debug for AuthDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthDomain")
            .field("name", &self.name)
            .field("order", &self.order)
            .field("challenge", &self.challenge)
            .field("extractor", &self.extractor.type_name())
            .field("backend", &self.backend.type_name())
            .finish()
    }
}

// Domains are identified by (order, name); names are unique per document.
impl PartialEq for AuthDomain {
    fn eq(&self, other: &Self) -> bool {
        self.order == other.order && self.name == other.name
    }
}

impl Eq for AuthDomain {}

impl PartialOrd for AuthDomain {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AuthDomain {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order
            .cmp(&other.order)
            .then_with(|| self.name.cmp(&other.name))
    }
}

/// Ordered domains plus the anonymous flag, published as one unit
#[derive(Debug, Default)]
pub struct ActiveChain {
    domains: Vec<AuthDomain>,
    anonymous_enabled: bool,
}

impl ActiveChain {
    /// Build a chain; domains are sorted by ascending order, then name
    pub fn new(mut domains: Vec<AuthDomain>, anonymous_enabled: bool) -> Self {
        domains.sort();
        Self {
            domains,
            anonymous_enabled,
        }
    }

    pub fn domains(&self) -> &[AuthDomain] {
        &self.domains
    }

    pub fn anonymous_enabled(&self) -> bool {
        self.anonymous_enabled
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Domain names in iteration order
    pub fn names(&self) -> Vec<&str> {
        self.domains.iter().map(AuthDomain::name).collect()
    }
}
