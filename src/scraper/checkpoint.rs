//! Atomic persistence of the crawl position.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::progress::ProgressSnapshot;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub last_processed_id: i32,
    pub started_at: DateTime<Utc>,
    pub saved_at: DateTime<Utc>,
    pub stats: CheckpointStats,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointStats {
    pub success: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// Saves and restores the crawl position on a well-known path.
pub struct CheckpointManager {
    path: PathBuf,
}

impl CheckpointManager {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Persist the checkpoint via temp-file + rename so readers never see a
    /// torn write.
    pub fn save(&self, last_id: i32, snapshot: &ProgressSnapshot) -> std::io::Result<()> {
        let checkpoint = Checkpoint {
            last_processed_id: last_id,
            started_at: snapshot.started_at,
            saved_at: Utc::now(),
            stats: CheckpointStats {
                success: snapshot.success,
                failed: snapshot.failed,
                skipped: snapshot.skipped,
            },
        };

        let data = serde_json::to_string_pretty(&checkpoint)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let dir = self.path.parent().unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(data.as_bytes())?;
        tmp.persist(&self.path)?;
        Ok(())
    }

    /// Load the checkpoint; `None` when no file exists.
    pub fn load(&self) -> std::io::Result<Option<Checkpoint>> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let checkpoint = serde_json::from_str(&data)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(Some(checkpoint))
    }

    pub fn delete(&self) -> std::io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::progress::ProgressTracker;
    use tempfile::tempdir;

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let manager = CheckpointManager::new(&dir.path().join("checkpoint.json"));
        assert!(!manager.exists());
        assert!(manager.load().unwrap().is_none());

        let tracker = ProgressTracker::new(100);
        tracker.inc_success();
        tracker.inc_skipped();

        manager.save(42, &tracker.snapshot()).unwrap();
        assert!(manager.exists());

        let loaded = manager.load().unwrap().unwrap();
        assert_eq!(loaded.last_processed_id, 42);
        assert_eq!(loaded.stats.success, 1);
        assert_eq!(loaded.stats.skipped, 1);

        manager.delete().unwrap();
        assert!(!manager.exists());
        // Deleting a missing file is not an error.
        manager.delete().unwrap();
    }

    #[test]
    fn test_save_overwrites_previous() {
        let dir = tempdir().unwrap();
        let manager = CheckpointManager::new(&dir.path().join("checkpoint.json"));
        let tracker = ProgressTracker::new(10);

        manager.save(5, &tracker.snapshot()).unwrap();
        manager.save(9, &tracker.snapshot()).unwrap();

        let loaded = manager.load().unwrap().unwrap();
        assert_eq!(loaded.last_processed_id, 9);
    }
}
