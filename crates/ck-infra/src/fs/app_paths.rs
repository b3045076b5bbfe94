use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

const APP_DIR: &str = "clipkeep";

/// Filesystem locations for everything the daemon persists.
///
/// Histories live directly in the data directory (one `.xml` file each, plus
/// the password-name sidecars), images in a subdirectory, settings in the
/// config directory. Directories are created lazily by the stores, not here.
#[derive(Debug, Clone)]
pub struct AppPaths {
    data_dir: PathBuf,
    config_dir: PathBuf,
}

impl AppPaths {
    /// Resolves the per-user locations through the platform conventions.
    pub fn resolve() -> Result<Self> {
        let data_root = dirs::data_dir().context("could not determine the user data directory")?;
        let config_root =
            dirs::config_dir().context("could not determine the user config directory")?;

        Ok(Self {
            data_dir: data_root.join(APP_DIR),
            config_dir: config_root.join(APP_DIR),
        })
    }

    /// Places everything under explicit roots instead of the per-user
    /// locations. Tests point this at temporary directories.
    pub fn under(data_root: impl Into<PathBuf>, config_root: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_root.into().join(APP_DIR),
            config_dir: config_root.into().join(APP_DIR),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn histories_dir(&self) -> PathBuf {
        self.data_dir.clone()
    }

    pub fn images_dir(&self) -> PathBuf {
        self.data_dir.join("images")
    }

    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }
}
