//! Config store adapters.
//!
//! The connection manager reads and writes [`ServerConfig`] records through the
//! [`ConfigStore`] trait and never sees the storage medium behind it. Every
//! operation can fail with `StoreUnavailable`, which callers must treat as
//! "unknown state, retry later" — never as an empty result.

use async_trait::async_trait;
use switchboard_core::{Result, ServerConfig};

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Fetch every configuration record.
    ///
    /// A failure here means the full set is unknown; it must not be read as
    /// "zero configs".
    async fn load_all(&self) -> Result<Vec<ServerConfig>>;

    /// Fetch one record by id. Not-found is `Ok(None)`, never an error.
    async fn get(&self, id: &str) -> Result<Option<ServerConfig>>;

    /// Insert or update by id. An empty id asks the store to mint one; the
    /// stored record is returned either way.
    async fn save(&self, config: ServerConfig) -> Result<ServerConfig>;

    /// Remove a record. Deleting an absent id is a no-op.
    async fn delete(&self, id: &str) -> Result<()>;

    async fn has(&self, id: &str) -> Result<bool>;
}
