//! Directory-backed configuration store
//!
//! Each configuration type is one file inside the store directory, named
//! `<type>.yml`, `<type>.yaml` or `<type>.json`. The directory plays the role
//! of the configuration index: it must exist for reads to be served.

use super::store::{ConfigStore, Health, Lifecycle, StoreError, StoredDocument};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

const EXTENSIONS: [&str; 3] = ["yml", "yaml", "json"];

/// Store reading configuration documents from a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn locate(&self, config_type: &str) -> Option<PathBuf> {
        for ext in EXTENSIONS {
            let candidate = self.root.join(format!("{}.{}", config_type, ext));
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                return Some(candidate);
            }
        }
        None
    }
}

#[async_trait]
impl ConfigStore for FileStore {
    async fn lifecycle(&self) -> Lifecycle {
        Lifecycle::Started
    }

    async fn index_exists(&self) -> bool {
        tokio::fs::metadata(&self.root)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
    }

    async fn health(&self) -> Health {
        match tokio::fs::read_dir(&self.root).await {
            Ok(_) => Health::Green,
            Err(_) => Health::Red,
        }
    }

    async fn multi_get(
        &self,
        types: &[String],
    ) -> Result<Vec<(String, StoredDocument)>, StoreError> {
        let mut documents = Vec::with_capacity(types.len());

        for config_type in types {
            // Type names map to file names; refuse anything that could escape the root.
            if config_type.is_empty()
                || config_type.contains(['/', '\\'])
                || config_type.starts_with('.')
            {
                documents.push((
                    config_type.clone(),
                    StoredDocument::Failed(format!("invalid configuration type '{}'", config_type)),
                ));
                continue;
            }

            let document = match self.locate(config_type).await {
                Some(path) => match tokio::fs::read_to_string(&path).await {
                    Ok(source) => StoredDocument::Found(source),
                    Err(e) => StoredDocument::Failed(format!("{}: {}", path.display(), e)),
                },
                None => StoredDocument::Missing,
            };
            documents.push((config_type.clone(), document));
        }

        Ok(documents)
    }
}
