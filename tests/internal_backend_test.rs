//! Internal User Database Integration Tests
//!
//! Password verification against users stored in the `internalusers`
//! document, including the digest-collision regression.

#[cfg(test)]
mod tests {
    use authgate::auth::internal::InternalAuthenticationBackend;
    use authgate::auth::password::{hash_argon2, hash_bcrypt};
    use authgate::auth::{AuthError, AuthenticationBackend, Credentials, Identity};
    use authgate::repository::{ConfigurationRepository, InMemoryStore, INTERNAL_USERS_TYPE};
    use std::sync::Arc;

    fn backend_with(users: &str) -> InternalAuthenticationBackend {
        let store = Arc::new(InMemoryStore::new());
        store.put(INTERNAL_USERS_TYPE, users);
        InternalAuthenticationBackend::new(Arc::new(ConfigurationRepository::new(store)))
    }

    fn user_entry(name: &str, hash: &str, roles: &[&str]) -> String {
        format!(
            "{}:\n  hash: \"{}\"\n  roles: [{}]\n",
            name,
            hash,
            roles.join(", ")
        )
    }

    // ========================================================================
    // Password verification
    // ========================================================================

    #[tokio::test]
    async fn test_digest_collision_does_not_authenticate() {
        // "aaaqscnch" collides with "Wikohy8b" in a fast low-entropy digest;
        // only the full hash comparison may decide.
        let hash = hash_bcrypt("Wikohy8b", 4).unwrap();
        let backend = backend_with(&user_entry("spock", &hash, &["science"]));

        let identity = backend
            .authenticate(&Credentials::new("spock", "Wikohy8b"))
            .await
            .unwrap();
        assert_eq!(identity, Identity::new("spock", ["science"]));

        let result = backend
            .authenticate(&Credentials::new("spock", "aaaqscnch"))
            .await;
        assert!(matches!(result, Err(AuthError::CredentialsInvalid)));
    }

    #[tokio::test]
    async fn test_argon2_hashes_are_accepted() {
        let hash = hash_argon2("logic").unwrap();
        let backend = backend_with(&user_entry("spock", &hash, &["science", "bridge"]));

        let identity = backend
            .authenticate(&Credentials::new("spock", "logic"))
            .await
            .unwrap();
        assert_eq!(identity.roles.len(), 2);

        assert!(matches!(
            backend
                .authenticate(&Credentials::new("spock", "emotion"))
                .await,
            Err(AuthError::CredentialsInvalid)
        ));
    }

    #[tokio::test]
    async fn test_empty_password_is_refused() {
        let hash = hash_bcrypt("Wikohy8b", 4).unwrap();
        let backend = backend_with(&user_entry("spock", &hash, &[]));

        let result = backend.authenticate(&Credentials::new("spock", "")).await;
        assert!(matches!(result, Err(AuthError::EmptyCredential)));

        let result = backend.authenticate(&Credentials::verified("spock")).await;
        assert!(matches!(result, Err(AuthError::EmptyCredential)));
    }

    #[tokio::test]
    async fn test_malformed_stored_hash_is_an_error() {
        let backend = backend_with(&user_entry("spock", "plain-text", &[]));
        let result = backend
            .authenticate(&Credentials::new("spock", "plain-text"))
            .await;
        assert!(matches!(result, Err(AuthError::Hash(_))));
    }

    // ========================================================================
    // User lookup
    // ========================================================================

    #[tokio::test]
    async fn test_unknown_user() {
        let hash = hash_bcrypt("Wikohy8b", 4).unwrap();
        let backend = backend_with(&user_entry("spock", &hash, &[]));

        let result = backend
            .authenticate(&Credentials::new("kirk", "Wikohy8b"))
            .await;
        assert!(matches!(result, Err(AuthError::NotFound(ref user)) if user == "kirk"));
        assert!(!backend.exists("kirk").await.unwrap());
        assert!(backend.exists("spock").await.unwrap());
    }

    #[tokio::test]
    async fn test_username_alias() {
        let hash = hash_bcrypt("engage", 4).unwrap();
        let users = format!(
            "captain_entry:\n  username: picard\n  hash: \"{}\"\n  roles: [captain]\n",
            hash
        );
        let backend = backend_with(&users);

        let identity = backend
            .authenticate(&Credentials::new("picard", "engage"))
            .await
            .unwrap();
        assert_eq!(identity, Identity::new("picard", ["captain"]));
        assert!(backend.exists("picard").await.unwrap());
    }

    #[tokio::test]
    async fn test_flat_user_document() {
        let hash = hash_bcrypt("Wikohy8b", 4).unwrap();
        let backend = backend_with(&format!(
            "spock.hash: \"{}\"\nspock.roles: [science]\n",
            hash
        ));

        let identity = backend
            .authenticate(&Credentials::new("spock", "Wikohy8b"))
            .await
            .unwrap();
        assert_eq!(identity, Identity::new("spock", ["science"]));
        assert!(backend.exists("spock").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_user_database() {
        let backend =
            InternalAuthenticationBackend::new(Arc::new(ConfigurationRepository::new(Arc::new(
                InMemoryStore::new(),
            ))));

        let result = backend
            .authenticate(&Credentials::new("spock", "Wikohy8b"))
            .await;
        assert!(matches!(result, Err(AuthError::BackendUnavailable(_))));
        assert!(!backend.exists("spock").await.unwrap());
    }

    #[tokio::test]
    async fn test_type_name() {
        let backend = backend_with("");
        assert_eq!(backend.type_name(), "internal");
    }
}
