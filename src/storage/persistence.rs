//! On-disk snapshots of a record store

use crate::core::{ArchiveError, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const STORE_SNAPSHOT_VERSION: u32 = 1;

// ============================================================================
// Store Snapshot
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreSnapshot<R> {
    pub version: u32,
    pub collections: BTreeMap<String, Vec<R>>,
    pub metadata: SnapshotMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub created_at: DateTime<Utc>,
    pub record_count: usize,
    pub collection_count: usize,
}

impl<R> StoreSnapshot<R> {
    pub fn new(collections: BTreeMap<String, Vec<R>>) -> Self {
        let record_count = collections.values().map(Vec::len).sum();
        let collection_count = collections.len();

        Self {
            version: STORE_SNAPSHOT_VERSION,
            collections,
            metadata: SnapshotMetadata {
                created_at: Utc::now(),
                record_count,
                collection_count,
            },
        }
    }
}

// ============================================================================
// Snapshot Manager
// ============================================================================

/// Reads and atomically writes MessagePack store snapshots.
pub struct SnapshotManager {
    snapshot_path: PathBuf,
}

impl SnapshotManager {
    pub fn new<P: AsRef<Path>>(snapshot_path: P) -> Self {
        Self {
            snapshot_path: snapshot_path.as_ref().to_path_buf(),
        }
    }

    pub fn save<R: Serialize>(&self, snapshot: &StoreSnapshot<R>) -> Result<()> {
        let parent = match self.snapshot_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)
            .map_err(|e| ArchiveError::Io(format!("Failed to create snapshot directory: {}", e)))?;

        let serialized = rmp_serde::to_vec_named(snapshot)
            .map_err(|e| ArchiveError::Serialization(format!("Failed to serialize snapshot: {}", e)))?;

        let temp_file = NamedTempFile::new_in(&parent)
            .map_err(|e| ArchiveError::Io(format!("Failed to create temp file: {}", e)))?;
        let mut writer = BufWriter::new(temp_file);
        writer
            .write_all(&serialized)
            .map_err(|e| ArchiveError::Io(format!("Failed to write snapshot: {}", e)))?;
        let temp_file = writer
            .into_inner()
            .map_err(|e| ArchiveError::Io(format!("Failed to flush snapshot: {}", e)))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| ArchiveError::Io(format!("Failed to sync snapshot: {}", e)))?;
        temp_file
            .persist(&self.snapshot_path)
            .map_err(|e| ArchiveError::Io(format!("Failed to rename snapshot: {}", e)))?;
        Ok(())
    }

    pub fn load<R: DeserializeOwned>(&self) -> Result<Option<StoreSnapshot<R>>> {
        if !self.snapshot_path.exists() {
            return Ok(None);
        }
        let mut file = File::open(&self.snapshot_path)
            .map_err(|e| ArchiveError::Io(format!("Failed to open snapshot: {}", e)))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| ArchiveError::Io(format!("Failed to read snapshot: {}", e)))?;
        let snapshot: StoreSnapshot<R> = rmp_serde::from_slice(&data)
            .map_err(|e| ArchiveError::Serialization(format!("Failed to deserialize snapshot: {}", e)))?;
        if snapshot.version != STORE_SNAPSHOT_VERSION {
            return Err(ArchiveError::Serialization(format!(
                "Unsupported snapshot version {}",
                snapshot.version
            )));
        }
        Ok(Some(snapshot))
    }

    pub fn exists(&self) -> bool {
        self.snapshot_path.exists()
    }

    pub fn delete(&self) -> Result<()> {
        if self.snapshot_path.exists() {
            fs::remove_file(&self.snapshot_path)
                .map_err(|e| ArchiveError::Io(format!("Failed to delete snapshot: {}", e)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_snapshot_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let snapshot_mgr = SnapshotManager::new(temp_dir.path().join("store.snapshot"));

        let mut collections = BTreeMap::new();
        collections.insert("trash".to_string(), vec!["a".to_string(), "b".to_string()]);
        collections.insert("history".to_string(), Vec::new());
        snapshot_mgr.save(&StoreSnapshot::new(collections)).unwrap();
        assert!(snapshot_mgr.exists());

        let loaded: StoreSnapshot<String> = snapshot_mgr.load().unwrap().unwrap();
        assert_eq!(loaded.metadata.collection_count, 2);
        assert_eq!(loaded.metadata.record_count, 2);
        assert_eq!(loaded.collections["trash"], vec!["a", "b"]);
    }

    #[test]
    fn test_load_missing_snapshot_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let snapshot_mgr = SnapshotManager::new(temp_dir.path().join("absent.snapshot"));
        let loaded: Option<StoreSnapshot<String>> = snapshot_mgr.load().unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_delete_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let snapshot_mgr = SnapshotManager::new(temp_dir.path().join("nested/dir/store.snapshot"));
        snapshot_mgr
            .save(&StoreSnapshot::<String>::new(BTreeMap::new()))
            .unwrap();
        assert!(snapshot_mgr.exists());
        snapshot_mgr.delete().unwrap();
        assert!(!snapshot_mgr.exists());
    }
}
