use anyhow::Result;
use async_trait::async_trait;

use crate::item::Item;

/// Knobs that shape how a stored history is brought back.
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    /// Entries beyond this count are dropped during load.
    pub max_items: usize,
    /// When false, stored image entries are discarded on load and their
    /// image files removed.
    pub images_support: bool,
}

#[async_trait]
pub trait HistoryStorePort: Send + Sync {
    /// Persist the sequence under `name`, replacing the stored copy.
    async fn save(&self, name: &str, items: &[Item]) -> Result<()>;

    /// Load the sequence stored under `name`. A missing file yields an
    /// empty sequence, not an error.
    async fn load(&self, name: &str, options: LoadOptions) -> Result<Vec<Item>>;

    /// Remove the stored copy of `name`.
    async fn delete(&self, name: &str) -> Result<()>;

    /// Names of all stored histories.
    async fn list(&self) -> Result<Vec<String>>;
}
