//! Age + count garbage collection over one collection/item-type pair.
//!
//! Favorited records are invisible to both passes: they are never counted
//! toward `max_size` and never deleted, whatever their age.

use super::record::ArchiveRecord;
use crate::core::{CollectionKey, ItemType, Result};
use crate::policy::RetentionPolicy;
use crate::storage::{RecordStore, SortDirection};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{Level, event};

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GcSweepReport {
    /// Deleted by the age pass.
    pub expired: usize,
    /// Deleted by the count pass.
    pub overflow: usize,
}

impl GcSweepReport {
    pub fn total(&self) -> usize {
        self.expired + self.overflow
    }
}

/// Outcome of a GC run for one item type across both collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GcReport {
    pub item_type: ItemType,
    pub trash: GcSweepReport,
    pub history: GcSweepReport,
}

impl GcReport {
    pub fn total(&self) -> usize {
        self.trash.total() + self.history.total()
    }

    pub fn sweep(&self, collection: CollectionKey) -> GcSweepReport {
        match collection {
            CollectionKey::Trash => self.trash,
            CollectionKey::History => self.history,
        }
    }
}

/// Oldest timestamp that survives the age pass.
///
/// `None` when the pass is disabled or the limit reaches past the
/// representable range, in which case nothing can expire.
pub fn age_cutoff(policy: &RetentionPolicy, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if !policy.age_pass_enabled() {
        return None;
    }
    Duration::try_days(policy.time_limit_days).and_then(|limit| now.checked_sub_signed(limit))
}

/// Run the age pass then the count pass.
pub async fn sweep(
    store: &dyn RecordStore<ArchiveRecord>,
    collection: CollectionKey,
    item_type: ItemType,
    policy: RetentionPolicy,
    now: DateTime<Utc>,
) -> Result<GcSweepReport> {
    let expired = match age_cutoff(&policy, now) {
        Some(cutoff) => expire_older_than(store, collection, item_type, cutoff).await?,
        None => 0,
    };

    let overflow = if policy.count_pass_enabled() {
        trim_to_size(store, collection, item_type, policy.max_size as usize).await?
    } else {
        0
    };

    let report = GcSweepReport { expired, overflow };
    if report.total() > 0 {
        event!(
            Level::INFO,
            collection = %collection,
            item_type = %item_type,
            expired,
            overflow,
            "archive gc sweep purged records"
        );
    } else {
        event!(Level::DEBUG, collection = %collection, item_type = %item_type, "archive gc sweep: nothing to purge");
    }
    Ok(report)
}

/// Age pass. Strictly older than `cutoff`; a record exactly at the cutoff stays.
async fn expire_older_than(
    store: &dyn RecordStore<ArchiveRecord>,
    collection: CollectionKey,
    item_type: ItemType,
    cutoff: DateTime<Utc>,
) -> Result<usize> {
    let expired_filter =
        move |record: &ArchiveRecord| record.is_collectable(item_type) && record.archived_at < cutoff;
    let expired = store
        .sorted_slice(collection.as_str(), &expired_filter, SortDirection::Ascending, None)
        .await?;
    let ids: Vec<String> = expired.into_iter().map(|record| record.archive_id).collect();
    store.bulk_delete(collection.as_str(), &ids).await
}

/// Count pass. Deletes the oldest non-favorites beyond `max_size`.
async fn trim_to_size(
    store: &dyn RecordStore<ArchiveRecord>,
    collection: CollectionKey,
    item_type: ItemType,
    max_size: usize,
) -> Result<usize> {
    let collectable = move |record: &ArchiveRecord| record.is_collectable(item_type);
    let count = store.count_where(collection.as_str(), &collectable).await?;
    if count <= max_size {
        return Ok(0);
    }

    let excess = count - max_size;
    let oldest = store
        .sorted_slice(collection.as_str(), &collectable, SortDirection::Ascending, Some(excess))
        .await?;
    let ids: Vec<String> = oldest.into_iter().map(|record| record.archive_id).collect();
    store.bulk_delete(collection.as_str(), &ids).await
}
