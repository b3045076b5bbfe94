use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Facts about an image held by the store.
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub checksum: String,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// Content-addressed storage for captured images.
#[async_trait]
pub trait ImageStorePort: Send + Sync {
    /// Decode and file the PNG under its checksum, returning where it
    /// landed. Storing the same image twice lands on the same file.
    async fn store(&self, png: Bytes) -> Result<StoredImage>;

    /// Raw PNG bytes of a stored image.
    async fn load(&self, path: &Path) -> Result<Bytes>;

    /// Re-derive the facts for an image already on disk.
    async fn probe(&self, path: &Path) -> Result<StoredImage>;

    /// Drop an image file, e.g. when image support is switched off.
    async fn remove(&self, path: &Path) -> Result<()>;
}
