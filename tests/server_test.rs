//! HTTP Server Integration Tests
//!
//! Starts the server on an OS-assigned port and exercises it over HTTP.

#[cfg(test)]
mod tests {
    use authgate::auth::password::hash_bcrypt;
    use authgate::auth::session::{InMemorySessionStore, SESSION_HEADER};
    use authgate::domain::{AuthTypeRegistry, AuthenticationDomainRegistry};
    use authgate::pipeline::AuthPipeline;
    use authgate::repository::{
        ConfigurationRepository, InMemoryStore, CONFIG_TYPE, INTERNAL_USERS_TYPE,
    };
    use authgate::server::{AppState, AuthServer};
    use authgate::xff::XffResolver;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::task::JoinHandle;
    use tokio::time::sleep;

    const CONFIG: &str = r#"
dynamic:
  http:
    anonymous_auth_enabled: false
  authc:
    basic_internal:
      order: 0
      http_authenticator:
        type: basic
        config:
          realm: authgate-test
      authentication_backend:
        type: internal
"#;

    struct TestServer {
        addr: SocketAddr,
        handle: JoinHandle<Result<(), authgate::server::ServerError>>,
    }

    impl TestServer {
        fn url(&self, path: &str) -> String {
            format!("http://{}{}", self.addr, path)
        }
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            self.handle.abort();
        }
    }

    /// Start a server; `load` controls whether configuration is loaded first
    async fn start(load: bool, sessions: bool) -> TestServer {
        let store = Arc::new(InMemoryStore::new());
        store.put(CONFIG_TYPE, CONFIG);
        store.put(
            INTERNAL_USERS_TYPE,
            format!(
                "spock:\n  hash: \"{}\"\n  roles: [science]\n",
                hash_bcrypt("Wikohy8b", 4).unwrap()
            ),
        );

        let repository = Arc::new(ConfigurationRepository::new(store));
        let registry = Arc::new(AuthenticationDomainRegistry::new(
            AuthTypeRegistry::with_builtins(Arc::clone(&repository)),
        ));
        let xff = Arc::new(XffResolver::new());
        repository.subscribe(CONFIG_TYPE, registry.clone());
        repository.subscribe(CONFIG_TYPE, xff.clone());
        if load {
            repository.reload_subscribed().await.unwrap();
        }

        let mut pipeline = AuthPipeline::new(registry);
        if sessions {
            pipeline = pipeline.with_sessions(Arc::new(InMemorySessionStore::new(
                Duration::from_secs(60),
            )));
        }

        let state = AppState::new(Arc::new(pipeline), xff).with_metrics(true);
        let server = AuthServer::bind("127.0.0.1:0", state)
            .await
            .expect("Failed to bind server");
        let addr = server.local_addr();
        let handle = tokio::spawn(server.run());

        // Give server time to start
        sleep(Duration::from_millis(100)).await;

        TestServer { addr, handle }
    }

    // ========================================================================
    // Binding and health
    // ========================================================================

    #[tokio::test]
    async fn test_binds_to_assigned_port() {
        let server = start(true, false).await;
        assert_eq!(server.addr.ip().to_string(), "127.0.0.1");
        assert!(server.addr.port() > 0);
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let server = start(true, false).await;
        let response = reqwest::get(server.url("/health")).await.unwrap();
        assert_eq!(response.status(), 200);

        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_invalid_bind_address() {
        let repository = Arc::new(ConfigurationRepository::new(Arc::new(InMemoryStore::new())));
        let registry = Arc::new(AuthenticationDomainRegistry::new(
            AuthTypeRegistry::with_builtins(repository),
        ));
        let state = AppState::new(
            Arc::new(AuthPipeline::new(registry)),
            Arc::new(XffResolver::new()),
        );
        assert!(AuthServer::bind("not-an-address", state).await.is_err());
    }

    // ========================================================================
    // Authentication outcomes
    // ========================================================================

    #[tokio::test]
    async fn test_unavailable_before_configuration_loaded() {
        let server = start(false, false).await;
        let response = reqwest::get(server.url("/anything")).await.unwrap();
        assert_eq!(response.status(), 503);
    }

    #[tokio::test]
    async fn test_challenge_without_credentials() {
        let server = start(true, false).await;
        let response = reqwest::get(server.url("/secure")).await.unwrap();

        assert_eq!(response.status(), 401);
        assert_eq!(
            response
                .headers()
                .get("www-authenticate")
                .and_then(|v| v.to_str().ok()),
            Some("Basic realm=\"authgate-test\"")
        );
    }

    #[tokio::test]
    async fn test_valid_credentials_return_identity() {
        let server = start(true, false).await;
        let client = reqwest::Client::new();
        let response = client
            .get(server.url("/secure"))
            .basic_auth("spock", Some("Wikohy8b"))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert!(response.headers().get(SESSION_HEADER).is_none());

        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["user"], "spock");
        assert_eq!(body["roles"], serde_json::json!(["science"]));
        assert_eq!(body["domain"], "basic_internal");
        assert!(body["authenticated_at"].is_string());
    }

    #[tokio::test]
    async fn test_wrong_password_is_unauthorized() {
        let server = start(true, false).await;
        let client = reqwest::Client::new();
        let response = client
            .get(server.url("/secure"))
            .basic_auth("spock", Some("aaaqscnch"))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 401);
        assert!(response.headers().get("www-authenticate").is_none());
    }

    #[tokio::test]
    async fn test_session_header_round_trip() {
        let server = start(true, true).await;
        let client = reqwest::Client::new();
        let response = client
            .get(server.url("/secure"))
            .basic_auth("spock", Some("Wikohy8b"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let session = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .expect("session header")
            .to_string();

        let response = client
            .get(server.url("/secure"))
            .header(SESSION_HEADER, session)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["user"], "spock");
    }

    // ========================================================================
    // Forwarded addresses
    // ========================================================================

    #[tokio::test]
    async fn test_forwarded_client_address_is_reported() {
        let server = start(true, false).await;
        let client = reqwest::Client::new();
        let response = client
            .get(server.url("/secure"))
            .basic_auth("spock", Some("Wikohy8b"))
            .header("X-Forwarded-For", "203.0.113.9")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let body: serde_json::Value = response.json().await.unwrap();
        let remote = body["remote_addr"].as_str().unwrap();
        assert!(remote.starts_with("203.0.113.9:"), "{}", remote);
    }

    #[tokio::test]
    async fn test_unresolvable_forwarded_address_is_forbidden() {
        let server = start(true, false).await;
        let client = reqwest::Client::new();
        let response = client
            .get(server.url("/secure"))
            .header("X-Forwarded-For", "not-an-ip")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 403);
    }

    // ========================================================================
    // Metrics
    // ========================================================================

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let server = start(true, false).await;
        reqwest::get(server.url("/secure")).await.unwrap();

        let response = reqwest::get(server.url("/metrics")).await.unwrap();
        assert_eq!(response.status(), 200);
        let body = response.text().await.unwrap();
        assert!(body.contains("authgate_auth_challenges_total"));
    }
}
