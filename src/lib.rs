//! Authgate Library
//!
//! Dynamically reconfigurable authentication chain for request-processing
//! nodes.
//!
//! # Features
//!
//! - **Configuration repository**: cached, change-notifying view over a
//!   backing store with a readiness gate
//! - **Domain chain**: ordered (extractor, backend) pairs rebuilt and swapped
//!   in atomically on every configuration change
//! - **Pipeline**: per-request challenge / advance / anonymous / reject
//!   state machine
//! - **Internal users**: bcrypt and argon2 password verification
//! - **Proxy awareness**: `X-Forwarded-For` client address resolution
//!
//! # Example
//!
//! ```
//! use authgate::auth::basic::encode_header;
//! use authgate::auth::password::hash_bcrypt;
//! use authgate::auth::AuthRequest;
//! use authgate::domain::{AuthTypeRegistry, AuthenticationDomainRegistry};
//! use authgate::pipeline::{AuthOutcome, AuthPipeline};
//! use authgate::repository::{ConfigurationRepository, InMemoryStore, CONFIG_TYPE, INTERNAL_USERS_TYPE};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryStore::new());
//! store.put(CONFIG_TYPE, "dynamic.http.anonymous_auth_enabled: false");
//! store.put(
//!     INTERNAL_USERS_TYPE,
//!     format!("kirk:\n  hash: \"{}\"\n  roles: [captain]\n", hash_bcrypt("enterprise", 4)?),
//! );
//!
//! let repository = Arc::new(ConfigurationRepository::new(store));
//! let registry = Arc::new(AuthenticationDomainRegistry::new(
//!     AuthTypeRegistry::with_builtins(Arc::clone(&repository)),
//! ));
//! repository.subscribe(CONFIG_TYPE, registry.clone());
//! repository.reload_subscribed().await?;
//!
//! let pipeline = AuthPipeline::new(registry);
//! let mut request = AuthRequest::default();
//! request
//!     .headers
//!     .insert("authorization".into(), encode_header("kirk", "enterprise"));
//!
//! let outcome = pipeline.authenticate(&request).await;
//! assert_eq!(outcome.identity().map(|i| i.username.as_str()), Some("kirk"));
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod domain;
pub mod metrics;
pub mod pipeline;
pub mod repository;
pub mod server;
pub mod xff;

// Re-export commonly used types
pub use config::Config;
pub use pipeline::{AuthOutcome, AuthPipeline};
pub use repository::ConfigurationRepository;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
