use crate::core::{CollectionKey, ItemType};
use crate::storage::StoredRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A persisted snapshot of a live entity placed into trash or history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveRecord {
    /// Unique within its collection, generated at archive time.
    pub archive_id: String,
    /// Id of the source live entity. History may hold many records per item.
    pub item_id: String,
    pub item_type: ItemType,
    pub collection_key: CollectionKey,
    pub archived_at: DateTime<Utc>,
    /// Opaque payload produced by the entity kind's payload mapper.
    pub item_data: JsonValue,
    pub is_favorite: bool,
    pub is_manual: bool,
}

impl ArchiveRecord {
    pub fn metadata(&self) -> ArchiveMetadata {
        ArchiveMetadata {
            archive_id: self.archive_id.clone(),
            item_id: self.item_id.clone(),
            item_type: self.item_type,
            collection_key: self.collection_key,
            archived_at: self.archived_at,
            is_favorite: self.is_favorite,
            is_manual: self.is_manual,
        }
    }

    /// Candidate for GC: of the given type and not protected by a favorite flag.
    pub fn is_collectable(&self, item_type: ItemType) -> bool {
        self.item_type == item_type && !self.is_favorite
    }
}

/// Typed single-field updates for archive records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchivePatch {
    Favorite(bool),
}

impl StoredRecord for ArchiveRecord {
    type Patch = ArchivePatch;
    // Tie-break on id so equal timestamps still sort deterministically.
    type SortKey = (DateTime<Utc>, String);

    fn key(&self) -> &str {
        &self.archive_id
    }

    fn sort_key(&self) -> Self::SortKey {
        (self.archived_at, self.archive_id.clone())
    }

    fn apply_patch(&mut self, patch: &ArchivePatch) {
        match patch {
            ArchivePatch::Favorite(value) => self.is_favorite = *value,
        }
    }
}

/// Payload-free view of an archive record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveMetadata {
    pub archive_id: String,
    pub item_id: String,
    pub item_type: ItemType,
    pub collection_key: CollectionKey,
    pub archived_at: DateTime<Utc>,
    pub is_favorite: bool,
    pub is_manual: bool,
}

/// Input to [`ArchiveService::save`](super::ArchiveService::save).
#[derive(Debug, Clone, PartialEq)]
pub struct NewArchiveItem {
    pub item_type: ItemType,
    pub item_id: String,
    pub payload: JsonValue,
    pub is_manual: bool,
}

impl NewArchiveItem {
    pub fn new(item_type: ItemType, item_id: impl Into<String>, payload: JsonValue) -> Self {
        Self {
            item_type,
            item_id: item_id.into(),
            payload,
            is_manual: false,
        }
    }

    pub fn manual(mut self, is_manual: bool) -> Self {
        self.is_manual = is_manual;
        self
    }
}

/// Display filter over the `is_manual` flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SnapshotFilter {
    #[default]
    All,
    ManualOnly,
    AutomaticOnly,
}

impl SnapshotFilter {
    pub fn matches(&self, record: &ArchiveRecord) -> bool {
        match self {
            Self::All => true,
            Self::ManualOnly => record.is_manual,
            Self::AutomaticOnly => !record.is_manual,
        }
    }
}
