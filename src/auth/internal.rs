//! Internal user database backend
//!
//! Users live in the `internalusers` configuration document:
//!
//! ```yaml
//! kirk:
//!   hash: "$2y$12$..."
//!   roles: [captain, admin]
//! picard_renamed:
//!   username: picard
//!   hash: "$2y$12$..."
//! ```
//!
//! A user is looked up by key first, then by the optional `username` alias
//! of every entry.

use super::password::verify_password;
use super::{AuthError, AuthenticationBackend, Credentials, Identity};
use crate::repository::{ConfigurationRepository, Settings, INTERNAL_USERS_TYPE};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Type name in configuration
pub const TYPE: &str = "internal";

/// Legacy type name still accepted in configuration
pub const LEGACY_TYPE: &str = "intern";

/// Backend verifying passwords against the internal user database
pub struct InternalAuthenticationBackend {
    repository: Arc<ConfigurationRepository>,
}

/// Stored entry for one user
struct UserEntry {
    hash: String,
    roles: Vec<String>,
}

impl InternalAuthenticationBackend {
    pub fn new(repository: Arc<ConfigurationRepository>) -> Self {
        Self { repository }
    }

    async fn users(&self) -> Result<Arc<Settings>, AuthError> {
        self.repository
            .get(INTERNAL_USERS_TYPE)
            .await
            .map_err(|e| AuthError::BackendUnavailable(e.to_string()))?
            .ok_or_else(|| {
                AuthError::BackendUnavailable("internal user database not configured".into())
            })
    }
}

/// Find a user's entry by key, falling back to a scan over `username` aliases
fn find_user(users: &Settings, username: &str) -> Option<UserEntry> {
    let entry_for = |key: &str| {
        users.get_str(&format!("{}.hash", key)).map(|hash| UserEntry {
            hash,
            roles: users.get_str_list(&format!("{}.roles", key)),
        })
    };

    if let Some(entry) = entry_for(username) {
        return Some(entry);
    }

    users
        .groups("")
        .iter()
        .find(|(_, entry)| entry.get_str("username").as_deref() == Some(username))
        .and_then(|(key, _)| entry_for(key))
}

#[async_trait]
impl AuthenticationBackend for InternalAuthenticationBackend {
    fn type_name(&self) -> &'static str {
        TYPE
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        let users = self.users().await?;
        let username = credentials.username();

        let entry = find_user(&users, username)
            .ok_or_else(|| AuthError::NotFound(username.to_string()))?;

        let password = credentials.secret().unwrap_or_default();
        if password.is_empty() {
            return Err(AuthError::EmptyCredential);
        }

        // bcrypt/argon2 verification is deliberately slow; keep it off the reactor.
        let hash = entry.hash;
        let presented = password.to_vec();
        let matches = tokio::task::spawn_blocking(move || verify_password(&presented, &hash))
            .await
            .map_err(|e| AuthError::BackendUnavailable(e.to_string()))??;

        if !matches {
            debug!(user = %username, "Password does not match");
            return Err(AuthError::CredentialsInvalid);
        }

        Ok(Identity::new(username, entry.roles))
    }

    async fn exists(&self, username: &str) -> Result<bool, AuthError> {
        let users = match self.repository.get(INTERNAL_USERS_TYPE).await {
            Ok(Some(users)) => users,
            Ok(None) => return Ok(false),
            Err(e) => return Err(AuthError::BackendUnavailable(e.to_string())),
        };
        Ok(find_user(&users, username).is_some())
    }
}
