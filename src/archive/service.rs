use super::gc::{self, GcReport};
use super::record::{ArchiveMetadata, ArchivePatch, ArchiveRecord, NewArchiveItem};
use crate::core::{Clock, CollectionKey, ItemType, Result, SystemClock};
use crate::policy::PolicyResolver;
use crate::storage::{InMemoryRecordStore, RecordStore, SortDirection};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{Level, event};
use uuid::Uuid;

/// Builds archive records and runs bulk reads, writes and GC against the
/// record store.
pub struct ArchiveService {
    store: Arc<dyn RecordStore<ArchiveRecord>>,
    policies: Arc<PolicyResolver>,
    clock: Arc<dyn Clock>,
}

impl ArchiveService {
    pub fn new(
        store: Arc<dyn RecordStore<ArchiveRecord>>,
        policies: Arc<PolicyResolver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            policies,
            clock,
        }
    }

    /// Service over a fresh in-memory store with default policies.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(archive_store()),
            Arc::new(PolicyResolver::new()),
            Arc::new(SystemClock),
        )
    }

    pub fn policies(&self) -> &PolicyResolver {
        &self.policies
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Stamp and persist new archive records. Every record gets a fresh id
    /// and starts out non-favorite.
    pub async fn save(
        &self,
        items: Vec<NewArchiveItem>,
        collection: CollectionKey,
    ) -> Result<Vec<ArchiveRecord>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let archived_at = self.clock.now();
        let records: Vec<ArchiveRecord> = items
            .into_iter()
            .map(|item| ArchiveRecord {
                archive_id: Uuid::new_v4().to_string(),
                item_id: item.item_id,
                item_type: item.item_type,
                collection_key: collection,
                archived_at,
                item_data: item.payload,
                is_favorite: false,
                is_manual: item.is_manual,
            })
            .collect();

        if let Err(err) = self.store.bulk_put(collection.as_str(), records.clone()).await {
            event!(Level::ERROR, collection = %collection, error = %err, "archive save failed");
            return Err(err);
        }
        event!(Level::DEBUG, collection = %collection, count = records.len(), "archive records saved");
        Ok(records)
    }

    pub async fn fetch_all_metadata(&self, collection: CollectionKey) -> Result<Vec<ArchiveMetadata>> {
        let records = self.fetch_all_raw(collection).await?;
        Ok(records.iter().map(ArchiveRecord::metadata).collect())
    }

    /// Every record of a collection including payloads.
    pub async fn fetch_all_raw(&self, collection: CollectionKey) -> Result<Vec<ArchiveRecord>> {
        self.store.fetch_all(collection.as_str()).await.inspect_err(|err| {
            event!(Level::ERROR, collection = %collection, error = %err, "archive fetch failed");
        })
    }

    /// Metadata of the present records, in request order.
    pub async fn fetch_by_ids(
        &self,
        ids: &[String],
        collection: CollectionKey,
    ) -> Result<Vec<ArchiveMetadata>> {
        let slots = self.fetch_raw_by_ids(ids, collection).await?;
        Ok(slots.iter().flatten().map(ArchiveRecord::metadata).collect())
    }

    /// Untransformed records, one slot per requested id.
    pub async fn fetch_raw_by_ids(
        &self,
        ids: &[String],
        collection: CollectionKey,
    ) -> Result<Vec<Option<ArchiveRecord>>> {
        self.store
            .bulk_get(collection.as_str(), ids)
            .await
            .inspect_err(|err| {
                event!(Level::ERROR, collection = %collection, error = %err, "archive lookup failed");
            })
    }

    pub async fn delete_by_ids(&self, ids: &[String], collection: CollectionKey) -> Result<usize> {
        let deleted = self
            .store
            .bulk_delete(collection.as_str(), ids)
            .await
            .inspect_err(|err| {
                event!(Level::ERROR, collection = %collection, error = %err, "archive delete failed");
            })?;
        event!(Level::DEBUG, collection = %collection, deleted, "archive records deleted");
        Ok(deleted)
    }

    /// Delete trash records of `item_type` whose `item_id` is in `item_ids`,
    /// except the archive ids listed in `keep`. Favorites are deleted too:
    /// a trash copy is only meaningful while its entity is not live.
    pub async fn delete_trashed_copies(
        &self,
        item_type: ItemType,
        item_ids: &[String],
        keep: &[String],
    ) -> Result<usize> {
        if item_ids.is_empty() {
            return Ok(0);
        }

        let item_ids: HashSet<&str> = item_ids.iter().map(String::as_str).collect();
        let keep: HashSet<&str> = keep.iter().map(String::as_str).collect();
        let stale = move |record: &ArchiveRecord| {
            record.item_type == item_type
                && item_ids.contains(record.item_id.as_str())
                && !keep.contains(record.archive_id.as_str())
        };
        let copies = self
            .store
            .sorted_slice(CollectionKey::Trash.as_str(), &stale, SortDirection::Ascending, None)
            .await?;
        if copies.is_empty() {
            return Ok(0);
        }

        let ids: Vec<String> = copies.into_iter().map(|record| record.archive_id).collect();
        let deleted = self.delete_by_ids(&ids, CollectionKey::Trash).await?;
        event!(Level::DEBUG, item_type = %item_type, deleted, "superseded trash copies deleted");
        Ok(deleted)
    }

    /// Returns the number of records updated.
    pub async fn set_favorite(
        &self,
        ids: &[String],
        collection: CollectionKey,
        value: bool,
    ) -> Result<usize> {
        self.store
            .bulk_update(collection.as_str(), ids, ArchivePatch::Favorite(value))
            .await
            .inspect_err(|err| {
                event!(Level::ERROR, collection = %collection, error = %err, "archive favorite update failed");
            })
    }

    /// Resolve policies for trash and history independently and sweep both.
    pub async fn run_garbage_collection(&self, item_type: ItemType) -> Result<GcReport> {
        let now = self.clock.now();
        let trash_policy = self.policies.policy_for(CollectionKey::Trash, item_type)?;
        let history_policy = self.policies.policy_for(CollectionKey::History, item_type)?;

        let store = self.store.as_ref();
        let (trash, history) = futures::try_join!(
            gc::sweep(store, CollectionKey::Trash, item_type, trash_policy, now),
            gc::sweep(store, CollectionKey::History, item_type, history_policy, now),
        )
        .inspect_err(|err| {
            event!(Level::ERROR, item_type = %item_type, error = %err, "archive gc failed");
        })?;

        Ok(GcReport {
            item_type,
            trash,
            history,
        })
    }

    pub async fn run_garbage_collection_all(&self) -> Result<Vec<GcReport>> {
        let mut reports = Vec::with_capacity(ItemType::ALL.len());
        for item_type in ItemType::ALL {
            reports.push(self.run_garbage_collection(item_type).await?);
        }
        Ok(reports)
    }
}

/// Empty in-memory store with the trash and history collections created.
pub fn archive_store() -> InMemoryRecordStore<ArchiveRecord> {
    InMemoryRecordStore::with_collections(CollectionKey::ALL.map(|key| key.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use crate::policy::PolicyOverride;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    fn service_with_clock() -> (ArchiveService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let service = ArchiveService::new(
            Arc::new(archive_store()),
            Arc::new(PolicyResolver::new()),
            clock.clone(),
        );
        (service, clock)
    }

    fn item(id: &str) -> NewArchiveItem {
        NewArchiveItem::new(ItemType::Deck, id, json!({"id": id}))
    }

    #[tokio::test]
    async fn test_save_stamps_records() {
        let (service, clock) = service_with_clock();
        let saved = service
            .save(vec![item("d1"), item("d1").manual(true)], CollectionKey::History)
            .await
            .unwrap();

        assert_eq!(saved.len(), 2);
        assert_ne!(saved[0].archive_id, saved[1].archive_id);
        assert!(saved.iter().all(|r| r.archived_at == clock.now()));
        assert!(saved.iter().all(|r| !r.is_favorite));
        assert!(saved.iter().all(|r| r.collection_key == CollectionKey::History));
        assert!(!saved[0].is_manual);
        assert!(saved[1].is_manual);

        assert_eq!(service.fetch_all_metadata(CollectionKey::History).await.unwrap().len(), 2);
        assert!(service.fetch_all_metadata(CollectionKey::Trash).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_by_ids_skips_missing() {
        let (service, _) = service_with_clock();
        let saved = service.save(vec![item("d1")], CollectionKey::Trash).await.unwrap();
        let wanted = vec!["nope".to_string(), saved[0].archive_id.clone()];

        let raw = service.fetch_raw_by_ids(&wanted, CollectionKey::Trash).await.unwrap();
        assert!(raw[0].is_none());
        assert!(raw[1].is_some());

        let found = service.fetch_by_ids(&wanted, CollectionKey::Trash).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].item_id, "d1");
    }

    #[tokio::test]
    async fn test_set_favorite_and_delete() {
        let (service, _) = service_with_clock();
        let saved = service.save(vec![item("d1")], CollectionKey::Trash).await.unwrap();
        let ids = vec![saved[0].archive_id.clone()];

        assert_eq!(service.set_favorite(&ids, CollectionKey::Trash, true).await.unwrap(), 1);
        let meta = service.fetch_by_ids(&ids, CollectionKey::Trash).await.unwrap();
        assert!(meta[0].is_favorite);

        assert_eq!(service.delete_by_ids(&ids, CollectionKey::Trash).await.unwrap(), 1);
        assert_eq!(service.delete_by_ids(&ids, CollectionKey::Trash).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_trashed_copies_keeps_listed_and_other_types() {
        let (service, _) = service_with_clock();
        let old = service.save(vec![item("d1"), item("d2")], CollectionKey::Trash).await.unwrap();
        let fresh = service.save(vec![item("d1")], CollectionKey::Trash).await.unwrap();
        service
            .save(
                vec![NewArchiveItem::new(ItemType::Pack, "d1", json!({}))],
                CollectionKey::Trash,
            )
            .await
            .unwrap();
        service.save(vec![item("d1")], CollectionKey::History).await.unwrap();
        service
            .set_favorite(&[old[0].archive_id.clone()], CollectionKey::Trash, true)
            .await
            .unwrap();

        let deleted = service
            .delete_trashed_copies(
                ItemType::Deck,
                &["d1".to_string()],
                &[fresh[0].archive_id.clone()],
            )
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        let trash = service.fetch_all_raw(CollectionKey::Trash).await.unwrap();
        let deck_d1: Vec<&ArchiveRecord> = trash
            .iter()
            .filter(|r| r.item_type == ItemType::Deck && r.item_id == "d1")
            .collect();
        assert_eq!(deck_d1.len(), 1);
        assert_eq!(deck_d1[0].archive_id, fresh[0].archive_id);
        assert_eq!(trash.len(), 3);
        assert_eq!(service.fetch_all_raw(CollectionKey::History).await.unwrap().len(), 1);
        assert_eq!(
            service.delete_trashed_copies(ItemType::Deck, &[], &[]).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_gc_resolves_policies_per_collection() {
        let (service, clock) = service_with_clock();
        service
            .policies()
            .set_override(
                CollectionKey::Trash,
                ItemType::Deck,
                PolicyOverride::time_limit(10).with_max_size(0),
            )
            .unwrap();
        service
            .policies()
            .set_override(
                CollectionKey::History,
                ItemType::Deck,
                PolicyOverride::time_limit(0).with_max_size(1),
            )
            .unwrap();

        service.save(vec![item("a")], CollectionKey::Trash).await.unwrap();
        service.save(vec![item("a")], CollectionKey::History).await.unwrap();
        clock.advance(Duration::days(11)).unwrap();
        service.save(vec![item("b")], CollectionKey::Trash).await.unwrap();
        service.save(vec![item("b")], CollectionKey::History).await.unwrap();

        let report = service.run_garbage_collection(ItemType::Deck).await.unwrap();
        assert_eq!(report.trash.expired, 1);
        assert_eq!(report.history.overflow, 1);
        assert_eq!(report.total(), 2);

        let trash = service.fetch_all_metadata(CollectionKey::Trash).await.unwrap();
        let history = service.fetch_all_metadata(CollectionKey::History).await.unwrap();
        assert_eq!(trash.len(), 1);
        assert_eq!(trash[0].item_id, "b");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].item_id, "b");
    }
}
