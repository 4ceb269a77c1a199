//! Rebuilds the active chain whenever the authentication configuration changes

use super::{ActiveChain, AuthDomain, AuthTypeRegistry, DomainError, DEFAULT_DOMAIN_NAME};
use crate::auth::{basic, internal};
use crate::metrics;
use crate::repository::{ConfigurationChangeListener, ListenerError, Settings};
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Key of the anonymous-access toggle
pub const ANONYMOUS_KEY: &str = "dynamic.http.anonymous_auth_enabled";

/// Key of the group of domain entries
pub const DOMAINS_KEY: &str = "dynamic.authc";

/// Owns the published [`ActiveChain`]
///
/// Readers take one snapshot with [`chain`](Self::chain) and keep using it;
/// a rebuild builds a fresh chain and swaps it in atomically.
pub struct AuthenticationDomainRegistry {
    types: AuthTypeRegistry,
    chain: ArcSwap<ActiveChain>,
    initialized: AtomicBool,
}

impl AuthenticationDomainRegistry {
    pub fn new(types: AuthTypeRegistry) -> Self {
        Self {
            types,
            chain: ArcSwap::from_pointee(ActiveChain::default()),
            initialized: AtomicBool::new(false),
        }
    }

    /// Current chain snapshot
    pub fn chain(&self) -> Arc<ActiveChain> {
        self.chain.load_full()
    }

    /// Whether at least one rebuild has been published
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Rebuild the chain from a `config` document and publish it.
    ///
    /// Entries that fail to build are logged and skipped. When nothing is
    /// left, a single `basic` + `internal` domain is used. If that cannot be
    /// built either, the previous chain stays in place and
    /// [`DomainError::NoDefaultDomain`] is returned.
    pub fn rebuild(&self, config: &Settings) -> Result<(), DomainError> {
        let anonymous_enabled = config.get_bool(ANONYMOUS_KEY, false);

        let mut domains = Vec::new();
        for (name, entry) in config.groups(DOMAINS_KEY) {
            if !entry.get_bool("enabled", true) {
                debug!(domain = %name, "Authentication domain disabled");
                continue;
            }

            match self.build_domain(&name, &entry) {
                Ok(domain) => domains.push(domain),
                Err(e) => {
                    warn!(domain = %name, error = %e, "Unable to initialize authentication domain; skipping");
                }
            }
        }

        if domains.is_empty() {
            let domain = self.default_domain().map_err(|e| {
                error!(error = %e, "No authentication domain configured and no default available");
                metrics::record_chain_rebuild(false);
                DomainError::NoDefaultDomain
            })?;
            info!("No authentication domain configured; using default basic/internal domain");
            domains.push(domain);
        }

        let chain = ActiveChain::new(domains, anonymous_enabled);
        info!(
            domains = ?chain.names(),
            anonymous = chain.anonymous_enabled(),
            "Authentication chain rebuilt"
        );

        self.chain.store(Arc::new(chain));
        self.initialized.store(true, Ordering::Release);
        metrics::record_chain_rebuild(true);
        Ok(())
    }

    fn build_domain(&self, name: &str, entry: &Settings) -> Result<AuthDomain, DomainError> {
        let backend_type = entry
            .get_str("authentication_backend.type")
            .unwrap_or_else(|| internal::TYPE.to_string());
        let extractor_type = entry
            .get_str("http_authenticator.type")
            .unwrap_or_else(|| basic::TYPE.to_string());

        let backend = self.types.backend(
            &backend_type,
            &entry.get_settings("authentication_backend.config"),
        )?;
        let extractor = self.types.extractor(
            &extractor_type,
            &entry.get_settings("http_authenticator.config"),
        )?;

        let challenge = entry.get_bool(
            "http_authenticator.challenge",
            entry.get_bool("challenge", true),
        );
        let order = entry.get_i64("order", 0);

        Ok(AuthDomain::new(name, order, challenge, extractor, backend))
    }

    fn default_domain(&self) -> Result<AuthDomain, DomainError> {
        let extractor = self.types.extractor(basic::TYPE, &Settings::empty())?;
        let backend = self.types.backend(internal::TYPE, &Settings::empty())?;
        Ok(AuthDomain::new(
            DEFAULT_DOMAIN_NAME,
            0,
            true,
            extractor,
            backend,
        ))
    }
}

impl ConfigurationChangeListener for AuthenticationDomainRegistry {
    fn on_change(&self, config: &Settings) -> Result<(), ListenerError> {
        self.rebuild(config).map_err(Into::into)
    }
}
