//! Application settings shared by every subcommand.

use std::path::{Path, PathBuf};

/// Default database filename next to the working directory.
pub const DEFAULT_DATABASE_FILE: &str = "oilspec.db";

/// Default catalog cache file.
pub const DEFAULT_CATALOG_CACHE: &str = "motul_catalog.json";

/// Default checkpoint file.
pub const DEFAULT_CHECKPOINT_FILE: &str = "scraper_checkpoint.json";

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_path: PathBuf,
}

impl Settings {
    pub fn new(database_path: &Path) -> Self {
        Self {
            database_path: database_path.to_path_buf(),
        }
    }

    /// Make sure the database's parent directory exists.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        if let Some(parent) = self.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}
