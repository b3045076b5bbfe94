use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use image::GenericImageView;
use sha2::{Digest, Sha256};
use tokio::fs;

use ck_core::ports::{ImageStorePort, StoredImage};

/// Content-addressed PNG storage: each image lands at `<root>/<sha256>.png`,
/// so the same pixels captured twice share one file.
pub struct FsImageStore {
    root: PathBuf,
}

impl FsImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, checksum: &str) -> PathBuf {
        self.root.join(format!("{checksum}.png"))
    }

    fn describe(png: &[u8], path: PathBuf) -> Result<StoredImage> {
        let decoded = image::load_from_memory_with_format(png, image::ImageFormat::Png)
            .with_context(|| format!("decode png failed: {}", path.display()))?;
        let (width, height) = decoded.dimensions();

        Ok(StoredImage {
            checksum: hex::encode(Sha256::digest(png)),
            path,
            width,
            height,
        })
    }
}

#[async_trait]
impl ImageStorePort for FsImageStore {
    async fn store(&self, png: Bytes) -> Result<StoredImage> {
        let decoded = image::load_from_memory_with_format(&png, image::ImageFormat::Png)
            .context("decode captured png failed")?;
        let (width, height) = decoded.dimensions();
        let checksum = hex::encode(Sha256::digest(&png));
        let path = self.path_for(&checksum);

        let info = StoredImage {
            checksum,
            path: path.clone(),
            width,
            height,
        };

        if fs::try_exists(&path).await? {
            return Ok(info);
        }

        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("create image dir failed: {}", self.root.display()))?;

        let tmp_path = path.with_extension("png.tmp");
        fs::write(&tmp_path, &png)
            .await
            .with_context(|| format!("write temp image failed: {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &path)
            .await
            .with_context(|| format!("store image failed: {}", path.display()))?;

        Ok(info)
    }

    async fn load(&self, path: &Path) -> Result<Bytes> {
        let bytes = fs::read(path)
            .await
            .with_context(|| format!("read image failed: {}", path.display()))?;
        Ok(Bytes::from(bytes))
    }

    async fn probe(&self, path: &Path) -> Result<StoredImage> {
        let bytes = fs::read(path)
            .await
            .with_context(|| format!("read image failed: {}", path.display()))?;
        Self::describe(&bytes, path.to_path_buf())
    }

    async fn remove(&self, path: &Path) -> Result<()> {
        fs::remove_file(path)
            .await
            .with_context(|| format!("remove image failed: {}", path.display()))?;
        Ok(())
    }
}
