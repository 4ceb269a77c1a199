//! Pass-through backend
//!
//! Accepts the identity an extractor already verified (token or trusted
//! header) and keeps the roles it asserted. Credentials that still carry an
//! unverified secret are refused.

use super::{AuthError, AuthenticationBackend, Credentials, Identity};
use async_trait::async_trait;

/// Type name in configuration
pub const TYPE: &str = "noop";

#[derive(Debug, Clone, Default)]
pub struct NoopAuthenticationBackend;

#[async_trait]
impl AuthenticationBackend for NoopAuthenticationBackend {
    fn type_name(&self) -> &'static str {
        TYPE
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        if credentials.username().is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        if !credentials.is_complete() {
            return Err(AuthError::CredentialsInvalid);
        }
        Ok(Identity::new(
            credentials.username(),
            credentials.backend_roles().iter().cloned(),
        ))
    }

    async fn exists(&self, _username: &str) -> Result<bool, AuthError> {
        Ok(true)
    }
}
