use crate::core::Result;
use async_trait::async_trait;
use std::fmt;

/// A record that can live in a [`RecordStore`] collection.
///
/// Field updates are expressed as typed patches instead of a field name plus
/// an untyped value.
pub trait StoredRecord: Clone + Send + Sync + 'static {
    /// Typed single-field update.
    type Patch: Clone + Send + Sync + fmt::Debug;

    /// Ordering key used by [`RecordStore::sorted_slice`].
    type SortKey: Ord + Clone + Send;

    /// Primary key, unique within a collection.
    fn key(&self) -> &str;

    fn sort_key(&self) -> Self::SortKey;

    fn apply_patch(&mut self, patch: &Self::Patch);
}

/// Predicate over stored records.
pub type RecordFilter<'a, R> = &'a (dyn Fn(&R) -> bool + Send + Sync);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Generic keyed record store - allows pluggable storage backends.
///
/// Every bulk operation is a no-op on an empty id list. Failures are reported
/// for the whole call; there is no partial-success result.
#[async_trait]
pub trait RecordStore<R: StoredRecord>: Send + Sync {
    /// All records of a collection, in key order.
    async fn fetch_all(&self, collection: &str) -> Result<Vec<R>>;

    /// One slot per requested id, in input order. Missing ids yield `None`.
    async fn bulk_get(&self, collection: &str, ids: &[String]) -> Result<Vec<Option<R>>>;

    /// Insert or replace records by key.
    async fn bulk_put(&self, collection: &str, records: Vec<R>) -> Result<()>;

    /// Remove records by key. Returns how many were present.
    async fn bulk_delete(&self, collection: &str, ids: &[String]) -> Result<usize>;

    /// Apply `patch` to every present record. Returns the number updated.
    async fn bulk_update(&self, collection: &str, ids: &[String], patch: R::Patch) -> Result<usize>;

    async fn count_where(&self, collection: &str, filter: RecordFilter<'_, R>) -> Result<usize>;

    /// Records matching `filter`, ordered by [`StoredRecord::sort_key`],
    /// truncated to `limit` when given.
    async fn sorted_slice(
        &self,
        collection: &str,
        filter: RecordFilter<'_, R>,
        direction: SortDirection,
        limit: Option<usize>,
    ) -> Result<Vec<R>>;
}
