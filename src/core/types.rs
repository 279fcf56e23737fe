use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{ArchiveError, Result};

/// The two parallel archival collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKey {
    /// Reversible soft delete; restoring consumes the record.
    Trash,
    /// Repeatable snapshots; restoring leaves the record in place.
    History,
}

impl CollectionKey {
    pub const ALL: [CollectionKey; 2] = [CollectionKey::Trash, CollectionKey::History];

    /// Name of the backing record-store collection.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trash => "trash",
            Self::History => "history",
        }
    }

    /// Whether restoring from this collection deletes the archive record.
    pub fn restore_consumes(&self) -> bool {
        matches!(self, Self::Trash)
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionKey {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "trash" => Ok(Self::Trash),
            "history" => Ok(Self::History),
            other => Err(ArchiveError::Config(format!("unknown collection '{}'", other))),
        }
    }
}

/// Entity kind discriminator stored on every archive record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Deck,
    Pack,
}

impl ItemType {
    pub const ALL: [ItemType; 2] = [ItemType::Deck, ItemType::Pack];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deck => "deck",
            Self::Pack => "pack",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "deck" => Ok(Self::Deck),
            "pack" => Ok(Self::Pack),
            other => Err(ArchiveError::Config(format!("unknown item type '{}'", other))),
        }
    }
}
