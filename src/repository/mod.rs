//! Configuration repository
//!
//! Caches configuration documents by type, loads them from a [`ConfigStore`]
//! on a miss, and pushes changes to subscribed listeners.
//!
//! # Readiness
//!
//! No read is served until the store is started, the configuration index
//! exists, and its health is at least degraded-but-serving. Once reached,
//! readiness is sticky and is never re-checked; a store that becomes
//! unready later keeps being queried and its failures surface as errors.
//!
//! # Listeners
//!
//! Listeners are registered for the lifetime of the process; there is no
//! unsubscribe. A listener must therefore stay safe to call for as long as the
//! repository lives. Notification is synchronous and serialised with
//! registration, so a slow listener delays the ones after it.
//!
//! # Example
//!
//! ```
//! use authgate::repository::{ConfigurationRepository, InMemoryStore};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryStore::new());
//! store.put("config", "dynamic.http.anonymous_auth_enabled: true");
//!
//! let repository = ConfigurationRepository::new(store);
//! let config = repository.get("config").await?.expect("stored above");
//! assert!(config.get_bool("dynamic.http.anonymous_auth_enabled", false));
//! # Ok(())
//! # }
//! ```

mod file;
mod settings;
mod store;

pub use file::FileStore;
pub use settings::Settings;
pub use store::{ConfigStore, Health, InMemoryStore, Lifecycle, StoreError, StoredDocument};

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Configuration type holding the authentication and proxy settings
pub const CONFIG_TYPE: &str = "config";

/// Configuration type holding the internal user database
pub const INTERNAL_USERS_TYPE: &str = "internalusers";

/// Repository errors
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Configuration store not ready")]
    NotReady,

    #[error("Failed to parse configuration '{config_type}': {message}")]
    Parse {
        config_type: String,
        message: String,
    },

    #[error("Configuration store error: {0}")]
    Store(#[from] StoreError),

    #[error("Persisting configuration is not implemented")]
    PersistUnsupported,
}

/// Error a listener may report back while applying a change
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Callback invoked with the new document whenever a subscribed type changes
pub trait ConfigurationChangeListener: Send + Sync {
    fn on_change(&self, config: &Settings) -> Result<(), ListenerError>;
}

/// Cached, change-notifying view over a [`ConfigStore`]
pub struct ConfigurationRepository {
    store: Arc<dyn ConfigStore>,
    cache: DashMap<String, Arc<Settings>>,
    listeners: Mutex<Vec<(String, Arc<dyn ConfigurationChangeListener>)>>,
    ready: AtomicBool,
}

impl ConfigurationRepository {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            store,
            cache: DashMap::new(),
            listeners: Mutex::new(Vec::new()),
            ready: AtomicBool::new(false),
        }
    }

    /// Get the document for one type.
    ///
    /// Returns `Ok(None)` when the store is not ready yet or holds no
    /// document for the type.
    pub async fn get(&self, config_type: &str) -> Result<Option<Arc<Settings>>, RepositoryError> {
        if !self.ensure_ready().await {
            return Ok(None);
        }

        if let Some(cached) = self.cache.get(config_type) {
            return Ok(Some(Arc::clone(cached.value())));
        }

        let mut loaded = self.load(&[config_type.to_string()]).await?;
        Ok(loaded
            .remove(config_type)
            .map(|settings| self.cache_if_absent(config_type, settings)))
    }

    /// Get documents for several types at once.
    ///
    /// Types without a stored document are left out of the result.
    pub async fn get_bulk(
        &self,
        types: &[&str],
    ) -> Result<HashMap<String, Arc<Settings>>, RepositoryError> {
        let mut result = HashMap::new();
        if types.is_empty() || !self.ensure_ready().await {
            return Ok(result);
        }

        let mut to_load = Vec::new();
        for config_type in types {
            match self.cache.get(*config_type) {
                Some(cached) => {
                    result.insert(config_type.to_string(), Arc::clone(cached.value()));
                }
                None => to_load.push(config_type.to_string()),
            }
        }

        if to_load.is_empty() {
            return Ok(result);
        }

        for (config_type, settings) in self.load(&to_load).await? {
            let cached = self.cache_if_absent(&config_type, settings);
            result.insert(config_type, cached);
        }

        Ok(result)
    }

    /// Re-read `types` from the store, bypassing the cache.
    ///
    /// Every reloaded type replaces its cache entry and notifies its
    /// subscribers, even when the document did not change. This is the
    /// repair path for edits made behind the repository's back and is slow.
    pub async fn reload(
        &self,
        types: &[&str],
    ) -> Result<HashMap<String, Arc<Settings>>, RepositoryError> {
        if !self.ensure_ready().await {
            return Ok(HashMap::new());
        }

        let types: Vec<String> = types.iter().map(|t| t.to_string()).collect();
        let loaded = self.load(&types).await?;

        let loaded: HashMap<String, Arc<Settings>> = loaded
            .into_iter()
            .map(|(config_type, settings)| {
                let settings = Arc::new(settings);
                self.cache.insert(config_type.clone(), Arc::clone(&settings));
                (config_type, settings)
            })
            .collect();

        self.notify(&loaded);
        Ok(loaded)
    }

    /// Reload every type that has at least one subscriber
    pub async fn reload_subscribed(&self) -> Result<HashMap<String, Arc<Settings>>, RepositoryError> {
        let types = self.subscribed_types();
        debug!(types = ?types, "Reloading subscribed configuration types");
        let refs: Vec<&str> = types.iter().map(String::as_str).collect();
        self.reload(&refs).await
    }

    /// Write a document through to the store. Not implemented yet.
    pub async fn persist(&self, config_type: &str, _settings: &Settings) -> Result<(), RepositoryError> {
        warn!(config_type = %config_type, "Persisting configuration is not supported");
        Err(RepositoryError::PersistUnsupported)
    }

    /// Register a listener for changes of `config_type`
    pub fn subscribe(&self, config_type: &str, listener: Arc<dyn ConfigurationChangeListener>) {
        debug!(config_type = %config_type, "Subscribing to configuration changes");
        self.listeners
            .lock()
            .push((config_type.to_string(), listener));
    }

    /// Types that currently have subscribers
    pub fn subscribed_types(&self) -> BTreeSet<String> {
        self.listeners
            .lock()
            .iter()
            .map(|(config_type, _)| config_type.clone())
            .collect()
    }

    /// Whether the readiness gate has been passed
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn cache_if_absent(&self, config_type: &str, settings: Settings) -> Arc<Settings> {
        Arc::clone(
            self.cache
                .entry(config_type.to_string())
                .or_insert_with(|| Arc::new(settings))
                .value(),
        )
    }

    fn notify(&self, changed: &HashMap<String, Arc<Settings>>) {
        let listeners = self.listeners.lock();
        for (config_type, listener) in listeners.iter() {
            let Some(settings) = changed.get(config_type) else {
                continue;
            };

            debug!(config_type = %config_type, "Notifying listener about configuration change");
            match catch_unwind(AssertUnwindSafe(|| listener.on_change(settings))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(config_type = %config_type, error = %e, "Listener failed to apply configuration change");
                }
                Err(_) => {
                    error!(config_type = %config_type, "Listener panicked while applying configuration change");
                }
            }
        }
    }

    async fn ensure_ready(&self) -> bool {
        if self.ready.load(Ordering::Acquire) {
            return true;
        }

        if self.store.lifecycle().await != Lifecycle::Started {
            debug!("Configuration store not started yet");
            return false;
        }

        if !self.store.index_exists().await {
            debug!("Configuration index does not exist");
            return false;
        }

        let health = self.store.health().await;
        if !health.is_serving() {
            debug!(health = ?health, "Configuration index not ready for queries");
            return false;
        }

        if !self.ready.swap(true, Ordering::AcqRel) {
            info!("Configuration store ready");
        }
        true
    }

    async fn load(&self, types: &[String]) -> Result<HashMap<String, Settings>, RepositoryError> {
        let documents = self.store.multi_get(types).await?;
        let mut result = HashMap::new();

        for (config_type, document) in documents {
            match document {
                StoredDocument::Found(source) => {
                    let settings = Settings::from_yaml(&source).map_err(|e| {
                        error!(config_type = %config_type, error = %e, "Failed to parse configuration");
                        RepositoryError::Parse {
                            config_type: config_type.clone(),
                            message: e.to_string(),
                        }
                    })?;
                    result.insert(config_type, settings);
                }
                StoredDocument::Missing => {
                    debug!(config_type = %config_type, "Configuration does not exist");
                }
                StoredDocument::Failed(reason) => {
                    warn!(config_type = %config_type, reason = %reason, "Failed to read configuration");
                }
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Counting(AtomicUsize);

    impl ConfigurationChangeListener for Counting {
        fn on_change(&self, _config: &Settings) -> Result<(), ListenerError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Panicking;

    impl ConfigurationChangeListener for Panicking {
        fn on_change(&self, _config: &Settings) -> Result<(), ListenerError> {
            panic!("listener bug");
        }
    }

    #[tokio::test]
    async fn test_get_caches_document() {
        let store = Arc::new(InMemoryStore::new());
        store.put(CONFIG_TYPE, "a: 1");
        let repository = ConfigurationRepository::new(store.clone());

        let first = repository.get(CONFIG_TYPE).await.unwrap().unwrap();
        store.put(CONFIG_TYPE, "a: 2");
        let second = repository.get(CONFIG_TYPE).await.unwrap().unwrap();

        assert_eq!(first.get_i64("a", 0), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_panicking_listener_does_not_block_others() {
        let store = Arc::new(InMemoryStore::new());
        store.put(CONFIG_TYPE, "a: 1");
        let repository = ConfigurationRepository::new(store);

        let counter = Arc::new(Counting(AtomicUsize::new(0)));
        repository.subscribe(CONFIG_TYPE, Arc::new(Panicking));
        repository.subscribe(CONFIG_TYPE, counter.clone());

        repository.reload(&[CONFIG_TYPE]).await.unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_persist_is_unsupported() {
        let repository = ConfigurationRepository::new(Arc::new(InMemoryStore::new()));
        let result = repository.persist(CONFIG_TYPE, &Settings::empty()).await;
        assert!(matches!(result, Err(RepositoryError::PersistUnsupported)));
    }
}
