//! Per-request authentication
//!
//! The pipeline walks the active chain in order. For every domain:
//!
//! - no credentials and `challenge` set: stop and answer with the
//!   extractor's challenge
//! - no credentials otherwise: try the next domain
//! - credentials: verify them with the domain's backend; success ends the
//!   walk, any failure moves on to the next domain
//!
//! When every domain is exhausted the request is granted the anonymous
//! identity if anonymous access is enabled, and rejected otherwise. The chain
//! snapshot is taken once per request, so a concurrent rebuild never changes
//! the domains a request is walking.

use crate::auth::session::{Session, SessionStore, SESSION_HEADER};
use crate::auth::{AuthRequest, Challenge, Identity};
use crate::domain::AuthenticationDomainRegistry;
use crate::metrics;
use std::sync::Arc;
use tracing::debug;

/// Terminal state of one authentication attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Authenticated; `domain` is `None` for anonymous and session logins
    Authenticated {
        identity: Identity,
        session: Option<Session>,
        domain: Option<String>,
    },

    /// Client must retry with credentials for `domain`
    Challenged { domain: String, challenge: Challenge },

    /// No domain accepted the request and anonymous access is off
    Rejected,

    /// No authentication chain has been published yet
    Unavailable,
}

impl AuthOutcome {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Authenticated { identity, .. } => Some(identity),
            _ => None,
        }
    }
}

pub struct AuthPipeline {
    registry: Arc<AuthenticationDomainRegistry>,
    sessions: Option<Arc<dyn SessionStore>>,
}

impl AuthPipeline {
    pub fn new(registry: Arc<AuthenticationDomainRegistry>) -> Self {
        Self {
            registry,
            sessions: None,
        }
    }

    /// Mint sessions on success and accept them on later requests
    #[must_use]
    pub fn with_sessions(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub async fn authenticate(&self, request: &AuthRequest) -> AuthOutcome {
        if !self.registry.is_initialized() {
            debug!("Authentication chain not initialized yet");
            return AuthOutcome::Unavailable;
        }

        if let Some(outcome) = self.resume_session(request) {
            return outcome;
        }

        let chain = self.registry.chain();

        for domain in chain.domains() {
            let credentials = match domain.extractor().extract(request) {
                Ok(credentials) => credentials,
                Err(e) => {
                    debug!(domain = %domain.name(), error = %e, "Credential extraction failed");
                    metrics::record_auth_attempt(domain.name(), false);
                    continue;
                }
            };

            let Some(credentials) = credentials else {
                if domain.challenge() {
                    if let Some(challenge) = domain.extractor().challenge(None) {
                        debug!(domain = %domain.name(), "No credentials; sending challenge");
                        metrics::record_challenge(domain.name());
                        return AuthOutcome::Challenged {
                            domain: domain.name().to_string(),
                            challenge,
                        };
                    }
                }
                debug!(domain = %domain.name(), "No credentials for domain");
                continue;
            };

            match domain.backend().authenticate(&credentials).await {
                Ok(identity) => {
                    debug!(domain = %domain.name(), user = %identity.username, "Authenticated");
                    metrics::record_auth_attempt(domain.name(), true);
                    let session = self.sessions.as_ref().map(|store| store.issue(&identity));
                    return AuthOutcome::Authenticated {
                        identity,
                        session,
                        domain: Some(domain.name().to_string()),
                    };
                }
                Err(e) => {
                    debug!(
                        domain = %domain.name(),
                        user = %credentials.username(),
                        error = %e,
                        "Authentication failed"
                    );
                    metrics::record_auth_attempt(domain.name(), false);
                }
            }
        }

        if chain.anonymous_enabled() {
            debug!("No domain authenticated the request; granting anonymous identity");
            metrics::record_anonymous_grant();
            return AuthOutcome::Authenticated {
                identity: Identity::anonymous(),
                session: None,
                domain: None,
            };
        }

        metrics::record_rejection();
        AuthOutcome::Rejected
    }

    fn resume_session(&self, request: &AuthRequest) -> Option<AuthOutcome> {
        let store = self.sessions.as_ref()?;
        let session = Session::parse_header_value(request.header(SESSION_HEADER)?)?;

        match store.resolve(&session) {
            Some(identity) => {
                metrics::record_session_hit();
                Some(AuthOutcome::Authenticated {
                    identity,
                    session: Some(session),
                    domain: None,
                })
            }
            None => {
                debug!(user = %session.username(), "Unknown or expired session");
                None
            }
        }
    }
}
