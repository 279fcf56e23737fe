use super::engine::{RecordFilter, RecordStore, SortDirection, StoredRecord};
use super::persistence::StoreSnapshot;
use crate::core::{ArchiveError, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

type Collection<R> = Arc<RwLock<BTreeMap<String, R>>>;

/// In-memory [`RecordStore`] with one lock per collection.
pub struct InMemoryRecordStore<R: StoredRecord> {
    /// Collections with individual locks
    collections: RwLock<HashMap<String, Collection<R>>>,
}

impl<R: StoredRecord> InMemoryRecordStore<R> {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Store pre-populated with empty collections.
    pub fn with_collections<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let collections = names
            .into_iter()
            .map(|name| (name.into(), Arc::new(RwLock::new(BTreeMap::new()))))
            .collect();
        Self {
            collections: RwLock::new(collections),
        }
    }

    pub async fn create_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            return Err(ArchiveError::CollectionExists(name.to_string()));
        }
        collections.insert(name.to_string(), Arc::new(RwLock::new(BTreeMap::new())));
        Ok(())
    }

    pub async fn drop_collection(&self, name: &str) -> Result<()> {
        if self.collections.write().await.remove(name).is_none() {
            return Err(ArchiveError::CollectionNotFound(name.to_string()));
        }
        Ok(())
    }

    pub async fn collection_exists(&self, name: &str) -> bool {
        self.collections.read().await.contains_key(name)
    }

    pub async fn list_collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Handle on a collection for concurrent access
    async fn collection(&self, name: &str) -> Result<Collection<R>> {
        self.collections
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| ArchiveError::CollectionNotFound(name.to_string()))
    }
}

impl<R> InMemoryRecordStore<R>
where
    R: StoredRecord + Serialize + DeserializeOwned,
{
    /// Copy every collection into a serializable snapshot.
    pub async fn snapshot(&self) -> StoreSnapshot<R> {
        let collections = self.collections.read().await;
        let mut copied = BTreeMap::new();
        for (name, handle) in collections.iter() {
            let records = handle.read().await;
            copied.insert(name.clone(), records.values().cloned().collect());
        }
        StoreSnapshot::new(copied)
    }

    /// Replace all collections with the snapshot contents.
    pub async fn restore(&self, snapshot: StoreSnapshot<R>) {
        let mut collections = self.collections.write().await;
        collections.clear();
        for (name, records) in snapshot.collections {
            let map = records
                .into_iter()
                .map(|record| (record.key().to_string(), record))
                .collect();
            collections.insert(name, Arc::new(RwLock::new(map)));
        }
    }
}

impl<R: StoredRecord> Default for InMemoryRecordStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: StoredRecord> RecordStore<R> for InMemoryRecordStore<R> {
    async fn fetch_all(&self, collection: &str) -> Result<Vec<R>> {
        let handle = self.collection(collection).await?;
        let records = handle.read().await;
        Ok(records.values().cloned().collect())
    }

    async fn bulk_get(&self, collection: &str, ids: &[String]) -> Result<Vec<Option<R>>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let handle = self.collection(collection).await?;
        let records = handle.read().await;
        Ok(ids.iter().map(|id| records.get(id).cloned()).collect())
    }

    async fn bulk_put(&self, collection: &str, records: Vec<R>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let handle = self.collection(collection).await?;
        let mut stored = handle.write().await;
        for record in records {
            stored.insert(record.key().to_string(), record);
        }
        Ok(())
    }

    async fn bulk_delete(&self, collection: &str, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let handle = self.collection(collection).await?;
        let mut stored = handle.write().await;
        Ok(ids.iter().filter(|id| stored.remove(id.as_str()).is_some()).count())
    }

    async fn bulk_update(&self, collection: &str, ids: &[String], patch: R::Patch) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let handle = self.collection(collection).await?;
        let mut stored = handle.write().await;
        let mut updated = 0;
        for id in ids {
            if let Some(record) = stored.get_mut(id) {
                record.apply_patch(&patch);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn count_where(&self, collection: &str, filter: RecordFilter<'_, R>) -> Result<usize> {
        let handle = self.collection(collection).await?;
        let records = handle.read().await;
        Ok(records.values().filter(|record| filter(*record)).count())
    }

    async fn sorted_slice(
        &self,
        collection: &str,
        filter: RecordFilter<'_, R>,
        direction: SortDirection,
        limit: Option<usize>,
    ) -> Result<Vec<R>> {
        let handle = self.collection(collection).await?;
        let records = handle.read().await;
        let mut matched: Vec<R> = records.values().filter(|record| filter(*record)).cloned().collect();
        drop(records);

        matched.sort_by_key(|record| record.sort_key());
        if direction == SortDirection::Descending {
            matched.reverse();
        }
        if let Some(limit) = limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }
}
