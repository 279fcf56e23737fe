use crate::core::{ArchiveError, CollectionKey, ItemType, Result};
use crate::live::DEFAULT_CACHE_CAPACITY;
use crate::policy::{PolicyOverride, PolicyOverrideTable, PolicyResolver};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Archive subsystem configuration
///
/// Loadable from JSON, e.g.
/// `{"retention": {"trash": {"deck": {"timeLimit": 7}}}, "cacheCapacity": 512}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArchiveConfig {
    /// User retention overrides layered over the default table
    pub retention: PolicyOverrideTable,

    /// Upper bound of each live entity cache
    pub cache_capacity: usize,

    /// Background GC interval; `None` disables the worker
    pub gc_interval_secs: Option<u64>,
}

impl ArchiveConfig {
    pub fn new() -> Self {
        Self {
            retention: PolicyOverrideTable::new(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            gc_interval_secs: None,
        }
    }

    /// Set the retention override for one collection/item-type pair
    pub fn retention(mut self, collection: CollectionKey, item_type: ItemType, entry: PolicyOverride) -> Self {
        self.retention
            .entry(collection)
            .or_default()
            .insert(item_type, entry);
        self
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn gc_interval(mut self, interval: Duration) -> Self {
        self.gc_interval_secs = Some(interval.as_secs());
        self
    }

    pub fn gc_interval_duration(&self) -> Option<Duration> {
        self.gc_interval_secs.map(Duration::from_secs)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|err| ArchiveError::Config(format!("invalid archive config: {}", err)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|err| {
            ArchiveError::Config(format!("cannot read config {}: {}", path.display(), err))
        })?;
        Self::from_json_str(&json)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(ArchiveError::Config("cacheCapacity must be > 0".to_string()));
        }

        if self.gc_interval_secs == Some(0) {
            return Err(ArchiveError::Config("gcIntervalSecs must be > 0".to_string()));
        }

        Ok(())
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyResolver {
    pub fn from_config(config: &ArchiveConfig) -> Self {
        Self::with_overrides(config.retention.clone())
    }
}
