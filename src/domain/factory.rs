//! Type-name registry for extractors and backends
//!
//! Configuration names implementations by a stable type string. Factories are
//! registered once at startup; an unknown name is a configuration error.

use super::DomainError;
use crate::auth::basic::{self, BasicExtractor};
use crate::auth::internal::{self, InternalAuthenticationBackend};
use crate::auth::jwt::{self, JwtExtractor};
use crate::auth::noop::{self, NoopAuthenticationBackend};
use crate::auth::proxy::{self, ProxyExtractor};
use crate::auth::{AuthenticationBackend, CredentialExtractor};
use crate::repository::{ConfigurationRepository, Settings};
use std::collections::HashMap;
use std::sync::Arc;

/// Builds an extractor from its `http_authenticator.config` settings
pub type ExtractorFactory =
    Arc<dyn Fn(&Settings) -> Result<Arc<dyn CredentialExtractor>, DomainError> + Send + Sync>;

/// Builds a backend from its `authentication_backend.config` settings
pub type BackendFactory =
    Arc<dyn Fn(&Settings) -> Result<Arc<dyn AuthenticationBackend>, DomainError> + Send + Sync>;

#[derive(Default, Clone)]
pub struct AuthTypeRegistry {
    extractors: HashMap<String, ExtractorFactory>,
    backends: HashMap<String, BackendFactory>,
}

impl AuthTypeRegistry {
    /// Registry with no types registered
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in extractor and backend
    pub fn with_builtins(repository: Arc<ConfigurationRepository>) -> Self {
        let mut registry = Self::new();

        registry.register_extractor(basic::TYPE, |config: &Settings| {
            let extractor = match config.get_str("realm") {
                Some(realm) => BasicExtractor::new().with_realm(&realm),
                None => BasicExtractor::new(),
            };
            Ok(Arc::new(extractor) as Arc<dyn CredentialExtractor>)
        });

        registry.register_extractor(proxy::TYPE, |config: &Settings| {
            let user_header = config
                .get_str("user_header")
                .unwrap_or_else(|| proxy::DEFAULT_USER_HEADER.to_string());
            let roles_header = config
                .get_str("roles_header")
                .unwrap_or_else(|| proxy::DEFAULT_ROLES_HEADER.to_string());
            Ok(Arc::new(ProxyExtractor::new(&user_header, &roles_header))
                as Arc<dyn CredentialExtractor>)
        });

        registry.register_extractor(jwt::TYPE, |config: &Settings| {
            Ok(Arc::new(jwt_from_settings(config)?) as Arc<dyn CredentialExtractor>)
        });

        let internal_factory =
            move |_config: &Settings| -> Result<Arc<dyn AuthenticationBackend>, DomainError> {
                Ok(Arc::new(InternalAuthenticationBackend::new(Arc::clone(
                    &repository,
                ))))
            };
        registry.register_backend(internal::TYPE, internal_factory.clone());
        registry.register_backend(internal::LEGACY_TYPE, internal_factory);

        registry.register_backend(noop::TYPE, |_config: &Settings| {
            Ok(Arc::new(NoopAuthenticationBackend) as Arc<dyn AuthenticationBackend>)
        });

        registry
    }

    pub fn register_extractor<F>(&mut self, type_name: &str, factory: F)
    where
        F: Fn(&Settings) -> Result<Arc<dyn CredentialExtractor>, DomainError>
            + Send
            + Sync
            + 'static,
    {
        self.extractors
            .insert(type_name.to_string(), Arc::new(factory));
    }

    pub fn register_backend<F>(&mut self, type_name: &str, factory: F)
    where
        F: Fn(&Settings) -> Result<Arc<dyn AuthenticationBackend>, DomainError>
            + Send
            + Sync
            + 'static,
    {
        self.backends.insert(type_name.to_string(), Arc::new(factory));
    }

    /// Build an extractor of a registered type
    pub fn extractor(
        &self,
        type_name: &str,
        config: &Settings,
    ) -> Result<Arc<dyn CredentialExtractor>, DomainError> {
        let factory = self
            .extractors
            .get(type_name)
            .ok_or_else(|| DomainError::UnknownType {
                kind: "http_authenticator",
                name: type_name.to_string(),
            })?;
        factory(config)
    }

    /// Build a backend of a registered type
    pub fn backend(
        &self,
        type_name: &str,
        config: &Settings,
    ) -> Result<Arc<dyn AuthenticationBackend>, DomainError> {
        let factory = self
            .backends
            .get(type_name)
            .ok_or_else(|| DomainError::UnknownType {
                kind: "authentication_backend",
                name: type_name.to_string(),
            })?;
        factory(config)
    }

    pub fn has_extractor(&self, type_name: &str) -> bool {
        self.extractors.contains_key(type_name)
    }

    pub fn has_backend(&self, type_name: &str) -> bool {
        self.backends.contains_key(type_name)
    }
}

/// JWT extractor from `signing_key` (HS256) or `algorithm` + `public_key`
fn jwt_from_settings(config: &Settings) -> Result<JwtExtractor, DomainError> {
    let algorithm = config
        .get_str("algorithm")
        .unwrap_or_else(|| "HS256".to_string())
        .to_ascii_uppercase();

    let mut extractor = match algorithm.as_str() {
        "HS256" => {
            let secret = config.get_str("signing_key").ok_or_else(|| {
                DomainError::InvalidSettings("jwt: 'signing_key' is required for HS256".into())
            })?;
            JwtExtractor::new_hs256(&secret)
        }
        "RS256" | "ES256" => {
            let pem = config.get_str("public_key").ok_or_else(|| {
                DomainError::InvalidSettings(format!(
                    "jwt: 'public_key' is required for {}",
                    algorithm
                ))
            })?;
            let built = if algorithm == "RS256" {
                JwtExtractor::new_rs256(&pem)
            } else {
                JwtExtractor::new_es256(&pem)
            };
            built.map_err(|e| DomainError::InvalidSettings(format!("jwt: {}", e)))?
        }
        other => {
            return Err(DomainError::InvalidSettings(format!(
                "jwt: unsupported algorithm '{}'",
                other
            )))
        }
    };

    if let Some(issuer) = config.get_str("issuer") {
        extractor = extractor.with_issuer(&issuer);
    }
    if let Some(audience) = config.get_str("audience") {
        extractor = extractor.with_audience(&audience);
    }
    if let Some(key) = config.get_str("subject_key") {
        extractor = extractor.with_subject_key(&key);
    }
    if let Some(key) = config.get_str("roles_key") {
        extractor = extractor.with_roles_key(&key);
    }
    Ok(extractor)
}
