//! Retention policy resolution.
//!
//! A policy is resolved per (collection, item type) pair: the user override
//! layer is consulted first, then the static default table. Non-positive
//! values disable the matching GC pass.

use crate::core::{CollectionKey, ItemType, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Field of a retention policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyField {
    TimeLimit,
    MaxSize,
}

/// Fully resolved retention bounds for one collection/item-type pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Records older than this many days are expired. `<= 0` disables the age pass.
    pub time_limit_days: i64,
    /// Upper bound on non-favorite records. `<= 0` disables the count pass.
    pub max_size: i64,
}

impl RetentionPolicy {
    pub const fn new(time_limit_days: i64, max_size: i64) -> Self {
        Self {
            time_limit_days,
            max_size,
        }
    }

    pub fn get(&self, field: PolicyField) -> i64 {
        match field {
            PolicyField::TimeLimit => self.time_limit_days,
            PolicyField::MaxSize => self.max_size,
        }
    }

    pub fn age_pass_enabled(&self) -> bool {
        self.time_limit_days > 0
    }

    pub fn count_pass_enabled(&self) -> bool {
        self.max_size > 0
    }
}

/// Partial user override; unset fields fall through to the defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyOverride {
    #[serde(default, rename = "timeLimit", skip_serializing_if = "Option::is_none")]
    pub time_limit_days: Option<i64>,
    #[serde(default, rename = "maxSize", skip_serializing_if = "Option::is_none")]
    pub max_size: Option<i64>,
}

impl PolicyOverride {
    pub fn time_limit(days: i64) -> Self {
        Self {
            time_limit_days: Some(days),
            max_size: None,
        }
    }

    pub fn max_size(max_size: i64) -> Self {
        Self {
            time_limit_days: None,
            max_size: Some(max_size),
        }
    }

    pub fn with_time_limit(mut self, days: i64) -> Self {
        self.time_limit_days = Some(days);
        self
    }

    pub fn with_max_size(mut self, max_size: i64) -> Self {
        self.max_size = Some(max_size);
        self
    }

    fn get(&self, field: PolicyField) -> Option<i64> {
        match field {
            PolicyField::TimeLimit => self.time_limit_days,
            PolicyField::MaxSize => self.max_size,
        }
    }
}

/// Overrides shaped `{collection: {itemType: {timeLimit, maxSize}}}`.
pub type PolicyOverrideTable = BTreeMap<CollectionKey, BTreeMap<ItemType, PolicyOverride>>;

/// Static default table.
pub fn default_policy(collection: CollectionKey, item_type: ItemType) -> RetentionPolicy {
    match (collection, item_type) {
        (CollectionKey::Trash, ItemType::Deck | ItemType::Pack) => RetentionPolicy::new(30, 200),
        (CollectionKey::History, ItemType::Deck | ItemType::Pack) => RetentionPolicy::new(90, 50),
    }
}

/// Merges the user override layer with the default table.
#[derive(Debug, Default)]
pub struct PolicyResolver {
    overrides: RwLock<PolicyOverrideTable>,
}

impl PolicyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overrides(overrides: PolicyOverrideTable) -> Self {
        Self {
            overrides: RwLock::new(overrides),
        }
    }

    pub fn resolve(
        &self,
        collection: CollectionKey,
        item_type: ItemType,
        field: PolicyField,
    ) -> Result<i64> {
        let overrides = self.overrides.read()?;
        let overridden = overrides
            .get(&collection)
            .and_then(|by_type| by_type.get(&item_type))
            .and_then(|entry| entry.get(field));
        Ok(overridden.unwrap_or_else(|| default_policy(collection, item_type).get(field)))
    }

    pub fn policy_for(&self, collection: CollectionKey, item_type: ItemType) -> Result<RetentionPolicy> {
        Ok(RetentionPolicy {
            time_limit_days: self.resolve(collection, item_type, PolicyField::TimeLimit)?,
            max_size: self.resolve(collection, item_type, PolicyField::MaxSize)?,
        })
    }

    /// Replace the override for one pair. Unset fields keep falling through.
    pub fn set_override(
        &self,
        collection: CollectionKey,
        item_type: ItemType,
        entry: PolicyOverride,
    ) -> Result<()> {
        self.overrides
            .write()?
            .entry(collection)
            .or_default()
            .insert(item_type, entry);
        Ok(())
    }

    pub fn clear_override(&self, collection: CollectionKey, item_type: ItemType) -> Result<()> {
        let mut overrides = self.overrides.write()?;
        if let Some(by_type) = overrides.get_mut(&collection) {
            by_type.remove(&item_type);
            if by_type.is_empty() {
                overrides.remove(&collection);
            }
        }
        Ok(())
    }

    pub fn overrides(&self) -> Result<PolicyOverrideTable> {
        Ok(self.overrides.read()?.clone())
    }
}
