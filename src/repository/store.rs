//! Backing store abstraction
//!
//! The repository never talks to a persistence engine directly. It only needs
//! lifecycle, index-existence and health probes plus a batched read, which
//! any document store can provide.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;

/// Backing store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Process lifecycle of the backing store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Initializing,
    Started,
    Stopped,
}

/// Health of the configuration index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    /// Fully replicated
    Green,
    /// Degraded but serving reads
    Yellow,
    /// Not serving
    Red,
    /// Health probe did not answer in time
    TimedOut,
}

impl Health {
    /// At least degraded-but-serving
    pub fn is_serving(self) -> bool {
        matches!(self, Health::Green | Health::Yellow)
    }
}

/// Result of reading one configuration type
#[derive(Debug, Clone, PartialEq)]
pub enum StoredDocument {
    /// Document exists; the source may be empty
    Found(String),
    /// No document for this type
    Missing,
    /// The read for this item failed
    Failed(String),
}

/// Document store holding one configuration document per type
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Lifecycle of the store process
    async fn lifecycle(&self) -> Lifecycle;

    /// Whether the configuration index exists
    async fn index_exists(&self) -> bool;

    /// Health of the configuration index
    async fn health(&self) -> Health;

    /// Read the documents for `types`, returning one entry per requested type
    async fn multi_get(
        &self,
        types: &[String],
    ) -> Result<Vec<(String, StoredDocument)>, StoreError>;
}

/// In-process store, primarily for tests and embedding
pub struct InMemoryStore {
    documents: RwLock<HashMap<String, String>>,
    lifecycle: RwLock<Lifecycle>,
    index_exists: RwLock<bool>,
    health: RwLock<Health>,
}

impl InMemoryStore {
    /// Create a started, healthy store with an existing (empty) index
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            lifecycle: RwLock::new(Lifecycle::Started),
            index_exists: RwLock::new(true),
            health: RwLock::new(Health::Green),
        }
    }

    /// Store (or replace) the raw source for a configuration type
    pub fn put(&self, config_type: &str, source: impl Into<String>) {
        self.documents
            .write()
            .insert(config_type.to_string(), source.into());
    }

    /// Remove the document for a configuration type
    pub fn remove(&self, config_type: &str) {
        self.documents.write().remove(config_type);
    }

    pub fn set_lifecycle(&self, lifecycle: Lifecycle) {
        *self.lifecycle.write() = lifecycle;
    }

    pub fn set_index_exists(&self, exists: bool) {
        *self.index_exists.write() = exists;
    }

    pub fn set_health(&self, health: Health) {
        *self.health.write() = health;
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigStore for InMemoryStore {
    async fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.read()
    }

    async fn index_exists(&self) -> bool {
        *self.index_exists.read()
    }

    async fn health(&self) -> Health {
        *self.health.read()
    }

    async fn multi_get(
        &self,
        types: &[String],
    ) -> Result<Vec<(String, StoredDocument)>, StoreError> {
        let documents = self.documents.read();
        Ok(types
            .iter()
            .map(|config_type| {
                let document = match documents.get(config_type) {
                    Some(source) => StoredDocument::Found(source.clone()),
                    None => StoredDocument::Missing,
                };
                (config_type.clone(), document)
            })
            .collect())
    }
}
