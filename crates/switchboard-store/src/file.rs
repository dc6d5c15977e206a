//! YAML-file-backed config store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use switchboard_core::{Result, ServerConfig, SwitchboardError};

use crate::ConfigStore;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    servers: Vec<ServerConfig>,
}

/// Single-document YAML store.
///
/// A missing file reads as an empty store; any other read, parse, or write
/// failure surfaces as `StoreUnavailable` so callers keep their prior state.
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<StoreDocument> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => serde_yaml::from_str(&content).map_err(|e| {
                SwitchboardError::StoreUnavailable(format!(
                    "failed to parse {}: {e}",
                    self.path.display()
                ))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("config file {} not found, treating as empty", self.path.display());
                Ok(StoreDocument::default())
            }
            Err(e) => Err(SwitchboardError::StoreUnavailable(format!(
                "failed to read {}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn write_document(&self, document: &StoreDocument) -> Result<()> {
        let content = serde_yaml::to_string(document).map_err(|e| {
            SwitchboardError::StoreUnavailable(format!("failed to serialize config store: {e}"))
        })?;
        tokio::fs::write(&self.path, content).await.map_err(|e| {
            SwitchboardError::StoreUnavailable(format!(
                "failed to write {}: {e}",
                self.path.display()
            ))
        })
    }
}

#[async_trait]
impl ConfigStore for FileStore {
    async fn load_all(&self) -> Result<Vec<ServerConfig>> {
        Ok(self.read_document().await?.servers)
    }

    async fn get(&self, id: &str) -> Result<Option<ServerConfig>> {
        let document = self.read_document().await?;
        Ok(document.servers.into_iter().find(|c| c.id == id))
    }

    async fn save(&self, mut config: ServerConfig) -> Result<ServerConfig> {
        let _guard = self.write_lock.lock().await;
        if config.id.is_empty() {
            config.id = Uuid::new_v4().to_string();
        }

        let mut document = self.read_document().await?;
        match document.servers.iter_mut().find(|c| c.id == config.id) {
            Some(existing) => *existing = config.clone(),
            None => document.servers.push(config.clone()),
        }
        self.write_document(&document).await?;
        Ok(config)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document().await?;
        let before = document.servers.len();
        document.servers.retain(|c| c.id != id);
        if document.servers.len() != before {
            self.write_document(&document).await?;
        }
        Ok(())
    }

    async fn has(&self, id: &str) -> Result<bool> {
        Ok(self.get(id).await?.is_some())
    }
}
