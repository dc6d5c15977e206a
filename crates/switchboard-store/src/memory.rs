//! In-memory config store.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use switchboard_core::{Result, ServerConfig};

use crate::ConfigStore;

/// Map-backed store. The primary adapter for tests and for embedding the
/// manager in a process that keeps configuration elsewhere.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, ServerConfig>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with a set of configs, minting ids where missing.
    pub fn with_configs(configs: impl IntoIterator<Item = ServerConfig>) -> Self {
        let records = configs
            .into_iter()
            .map(|mut config| {
                if config.id.is_empty() {
                    config.id = Uuid::new_v4().to_string();
                }
                (config.id.clone(), config)
            })
            .collect();
        Self {
            records: RwLock::new(records),
        }
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn load_all(&self) -> Result<Vec<ServerConfig>> {
        let records = self.records.read().await;
        let mut configs: Vec<ServerConfig> = records.values().cloned().collect();
        configs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(configs)
    }

    async fn get(&self, id: &str) -> Result<Option<ServerConfig>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn save(&self, mut config: ServerConfig) -> Result<ServerConfig> {
        if config.id.is_empty() {
            config.id = Uuid::new_v4().to_string();
        }
        self.records
            .write()
            .await
            .insert(config.id.clone(), config.clone());
        Ok(config)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.records.write().await.remove(id);
        Ok(())
    }

    async fn has(&self, id: &str) -> Result<bool> {
        Ok(self.records.read().await.contains_key(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::ConnectionSpec;

    fn config(id: &str) -> ServerConfig {
        ServerConfig::new(
            id,
            "test",
            ConnectionSpec::Stdio {
                command: "echo".to_string(),
                args: vec![],
                env: Default::default(),
            },
        )
    }

    #[tokio::test]
    async fn save_and_get_round_trip() {
        let store = MemoryStore::new();
        store.save(config("srv-1")).await.unwrap();

        let fetched = store.get("srv-1").await.unwrap().unwrap();
        assert_eq!(fetched.id, "srv-1");
        assert!(store.has("srv-1").await.unwrap());
        assert!(!store.has("srv-2").await.unwrap());
    }

    #[tokio::test]
    async fn save_mints_id_when_absent() {
        let store = MemoryStore::new();
        let saved = store.save(config("")).await.unwrap();

        assert!(!saved.id.is_empty());
        assert!(store.has(&saved.id).await.unwrap());
    }

    #[tokio::test]
    async fn load_all_is_sorted_by_id() {
        let store = MemoryStore::with_configs([config("b"), config("a"), config("c")]);

        let ids: Vec<String> = store
            .load_all()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryStore::with_configs([config("srv-1")]);

        store.delete("srv-1").await.unwrap();
        store.delete("srv-1").await.unwrap();
        assert!(store.load_all().await.unwrap().is_empty());
    }
}
