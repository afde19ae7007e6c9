//! Storage engines
//!
//! Any backend with whole-value `get/set/remove/clear` semantics can store
//! persist documents. Two engines ship with the crate:
//! - [`MemoryStorage`] process-local map, for tests and ephemeral state
//! - [`FileStorage`] one file per key, replaced atomically on write

pub mod file;
pub mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::error::Result;
use async_trait::async_trait;

/// Minimal async key-value contract consumed by persist items
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Returns `None` when the key is absent
    async fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Replaces the whole value stored at `key`
    async fn set_item(&self, key: &str, value: &str) -> Result<()>;

    async fn remove_item(&self, key: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}
