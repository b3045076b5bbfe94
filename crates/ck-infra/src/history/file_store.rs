use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, warn};

use ck_core::item::{Item, ItemKind};
use ck_core::ports::{HistoryStorePort, ImageStorePort, LoadOptions};

use super::format::{self, RawEntry};

/// One file per named history in the tagged-text format, plus a sidecar per
/// history holding password names (never their secrets).
pub struct FileHistoryStore {
    dir: PathBuf,
    images: Arc<dyn ImageStorePort>,
}

impl FileHistoryStore {
    pub fn new(dir: impl Into<PathBuf>, images: Arc<dyn ImageStorePort>) -> Self {
        Self {
            dir: dir.into(),
            images,
        }
    }

    fn history_file(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.xml"))
    }

    fn passwords_file(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.passwords"))
    }

    async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("create history dir failed: {}", self.dir.display()))
    }

    /// Write to a sibling temp file, then rename over the target.
    async fn atomic_write(&self, path: &Path, content: &str) -> Result<()> {
        self.ensure_dir().await?;

        let mut tmp_os = path.as_os_str().to_owned();
        tmp_os.push(".tmp");
        let tmp_path = PathBuf::from(tmp_os);

        fs::write(&tmp_path, content)
            .await
            .with_context(|| format!("write temp history failed: {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).await.with_context(|| {
            format!(
                "rename temp history to target failed: {} -> {}",
                tmp_path.display(),
                path.display()
            )
        })?;
        Ok(())
    }

    async fn write_sidecar(&self, name: &str, items: &[Item]) -> Result<()> {
        let names: Vec<&str> = items.iter().filter_map(Item::password_name).collect();
        let path = self.passwords_file(name);

        if names.is_empty() {
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("remove password sidecar failed: {}", path.display())
                    })
                }
            }
            return Ok(());
        }

        let mut content = names.join("\n");
        content.push('\n');
        self.atomic_write(&path, &content).await
    }

    async fn resolve_entry(&self, entry: RawEntry) -> Option<Item> {
        let RawEntry {
            kind,
            uuid,
            value,
            date,
            name,
            specials,
        } = entry;

        let mut item = match kind {
            ItemKind::Text => match Item::text(value) {
                Ok(item) => item,
                Err(err) => {
                    warn!(error = %err, "skipping unusable text entry");
                    return None;
                }
            },
            ItemKind::Uris => match Item::uris(value) {
                Ok(item) => item,
                Err(err) => {
                    warn!(error = %err, "skipping unusable file-list entry");
                    return None;
                }
            },
            ItemKind::Password => Item::password(name.as_deref(), value),
            ItemKind::Image => match self.images.probe(Path::new(&value)).await {
                Ok(info) => Item::image(
                    value,
                    info.checksum,
                    info.width,
                    info.height,
                    date.unwrap_or_default(),
                ),
                Err(err) => {
                    warn!(path = %value, error = %err, "dropping image entry that cannot be reloaded");
                    return None;
                }
            },
        };

        item.set_uuid(uuid);
        for special in specials {
            if item.kind() == ItemKind::Text {
                item.add_special_value(special.mime, special.data);
            } else {
                warn!(kind = %item.kind(), "ignoring special value on non-text entry");
            }
        }
        Some(item)
    }
}

#[async_trait]
impl HistoryStorePort for FileHistoryStore {
    async fn save(&self, name: &str, items: &[Item]) -> Result<()> {
        let doc = format::serialize(items);
        self.atomic_write(&self.history_file(name), &doc).await?;
        self.write_sidecar(name, items).await?;
        debug!(history = name, items = items.len(), "history saved");
        Ok(())
    }

    async fn load(&self, name: &str, options: LoadOptions) -> Result<Vec<Item>> {
        let path = self.history_file(name);
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Create the empty file so the name lists as an available
                // history.
                self.save(name, &[]).await?;
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("read history failed: {}", path.display()))
            }
        };

        let parsed = format::parse(&text, options.max_items, options.images_support);

        for image_path in &parsed.discarded_images {
            if let Err(err) = self.images.remove(Path::new(image_path)).await {
                debug!(path = %image_path, error = %err, "dropped image file was not removed");
            }
        }

        let mut items = Vec::with_capacity(parsed.entries.len());
        for entry in parsed.entries {
            if let Some(item) = self.resolve_entry(entry).await {
                items.push(item);
            }
        }

        if parsed.rewrite_needed {
            debug!(history = name, "rewriting history in the current format");
            if let Err(err) = self.save(name, &items).await {
                warn!(history = name, error = %err, "could not rewrite history file");
            }
        }

        Ok(items)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let path = self.history_file(name);
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("delete history failed: {}", path.display()))
            }
        }

        let sidecar = self.passwords_file(name);
        if let Err(e) = fs::remove_file(&sidecar).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %sidecar.display(), error = %e, "password sidecar was not removed");
            }
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("list histories failed: {}", self.dir.display()))
            }
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("xml") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}
