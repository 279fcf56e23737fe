use super::gc::GcReport;
use super::handler::{ArchiveKind, EntityArchiveHandler, ProjectionMapper, Unpacked};
use super::record::{ArchiveRecord, NewArchiveItem, SnapshotFilter};
use super::service::ArchiveService;
use crate::core::{CollectionKey, Result};
use crate::live::LiveEntity;
use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};

/// What to snapshot into history: a live entity by id, or one already in hand.
#[derive(Debug, Clone)]
pub enum SnapshotSource<E> {
    Id(String),
    Entity(E),
}

/// Entity-agnostic archive engine, parameterized by an injected handler.
pub struct ArchiveOrchestrator<K: ArchiveKind> {
    service: Arc<ArchiveService>,
    handler: EntityArchiveHandler<K>,
    projections: Arc<dyn ProjectionMapper<K>>,
}

impl<K: ArchiveKind> ArchiveOrchestrator<K> {
    pub fn new(
        service: Arc<ArchiveService>,
        handler: EntityArchiveHandler<K>,
        projections: Arc<dyn ProjectionMapper<K>>,
    ) -> Self {
        Self {
            service,
            handler,
            projections,
        }
    }

    pub fn handler(&self) -> &EntityArchiveHandler<K> {
        &self.handler
    }

    pub fn service(&self) -> &ArchiveService {
        &self.service
    }

    /// Pack live entities into archive payloads, bundling children for
    /// composite kinds. Also returns the ids of every bundled child.
    async fn build_items(
        &self,
        entities: &[K::Entity],
        is_manual: bool,
    ) -> Result<(Vec<NewArchiveItem>, Vec<String>)> {
        let mut items = Vec::with_capacity(entities.len());
        let mut child_ids = Vec::new();
        for entity in entities {
            let children = match self.handler.child_ops() {
                Some(child_ops) => Some(
                    child_ops
                        .fetch_children_by_parent_ids(&[entity.id().to_string()])
                        .await?,
                ),
                None => None,
            };
            let payload = self.handler.to_payload(entity, children.as_deref())?;
            if let Some(children) = &children {
                child_ids.extend(children.iter().map(|child| child.id().to_string()));
            }
            items.push(
                NewArchiveItem::new(self.handler.item_type(), entity.id(), payload).manual(is_manual),
            );
        }
        Ok((items, child_ids))
    }

    /// Archive live entities into trash and remove them from the live side.
    ///
    /// Ids without a live entity are skipped and repeated ids count once.
    /// If the live delete fails the freshly written trash records are
    /// deleted again and the delete error is returned. Once the live delete
    /// succeeds the caches are evicted before anything else can fail, and
    /// older trash copies of the same entities are dropped.
    pub async fn move_to_trash(&self, ids: &[String]) -> Result<Vec<ArchiveRecord>> {
        let item_type = self.handler.item_type();
        let ids = distinct(ids);
        let entities = self.handler.live_store().fetch_by_ids(&ids).await?;
        if entities.is_empty() {
            return Ok(Vec::new());
        }

        let (items, child_ids) = self.build_items(&entities, false).await?;
        let saved = self.service.save(items, CollectionKey::Trash).await?;
        let written: Vec<String> = saved.iter().map(|record| record.archive_id.clone()).collect();

        let live_ids: Vec<String> = entities.iter().map(|entity| entity.id().to_string()).collect();
        if let Err(err) = self.handler.live_store().delete(&live_ids).await {
            match self.service.delete_by_ids(&written, CollectionKey::Trash).await {
                Ok(undone) => event!(
                    Level::WARN,
                    item_type = %item_type,
                    undone,
                    error = %err,
                    "live delete failed, trash write rolled back"
                ),
                Err(undo_err) => event!(
                    Level::ERROR,
                    item_type = %item_type,
                    error = %err,
                    undo_error = %undo_err,
                    "live delete failed and trash rollback failed"
                ),
            }
            return Err(err);
        }

        self.handler.live_cache().remove_many(&live_ids)?;
        if let Some(child_cache) = self.handler.child_cache() {
            child_cache.remove_many(&child_ids)?;
        }

        self.service
            .delete_trashed_copies(item_type, &live_ids, &written)
            .await?;

        if let Some(child_ops) = self.handler.child_ops() {
            for id in &live_ids {
                child_ops.remove_children_by_parent_id(id).await?;
            }
        }

        event!(Level::INFO, item_type = %item_type, count = saved.len(), "moved to trash");
        Ok(saved)
    }

    /// Snapshot one entity into history. No live-side effects.
    ///
    /// Returns `None` when the source id has no live entity.
    pub async fn save_snapshot_to_history(
        &self,
        source: SnapshotSource<K::Entity>,
        is_manual: bool,
    ) -> Result<Option<ArchiveRecord>> {
        let entity = match source {
            SnapshotSource::Entity(entity) => entity,
            SnapshotSource::Id(id) => {
                match self.handler.live_store().fetch_by_ids(&[id]).await?.into_iter().next() {
                    Some(entity) => entity,
                    None => return Ok(None),
                }
            }
        };

        let (items, _) = self.build_items(std::slice::from_ref(&entity), is_manual).await?;
        let saved = self.service.save(items, CollectionKey::History).await?;
        event!(
            Level::DEBUG,
            item_type = %self.handler.item_type(),
            item_id = entity.id(),
            is_manual,
            "history snapshot saved"
        );
        Ok(saved.into_iter().next())
    }

    /// Summaries of every record of this kind, newest first.
    pub async fn fetch_all_metadata(&self, collection: CollectionKey) -> Result<Vec<K::Summary>> {
        self.fetch_metadata_filtered(collection, SnapshotFilter::All).await
    }

    pub async fn fetch_metadata_filtered(
        &self,
        collection: CollectionKey,
        filter: SnapshotFilter,
    ) -> Result<Vec<K::Summary>> {
        let item_type = self.handler.item_type();
        let mut records: Vec<ArchiveRecord> = self
            .service
            .fetch_all_raw(collection)
            .await?
            .into_iter()
            .filter(|record| record.item_type == item_type && filter.matches(record))
            .collect();
        records.sort_by_key(|record| Reverse(record.archived_at));

        Ok(records
            .iter()
            .map(|record| self.projections.to_summary(record))
            .collect())
    }

    /// Restorable projection of one record, or `None` if absent, of another
    /// kind, or unreadable.
    pub async fn fetch_item_detail(
        &self,
        archive_id: &str,
        collection: CollectionKey,
    ) -> Result<Option<K::Detail>> {
        let slots = self
            .service
            .fetch_raw_by_ids(&[archive_id.to_string()], collection)
            .await?;
        let Some(record) = slots.into_iter().flatten().next() else {
            return Ok(None);
        };
        if record.item_type != self.handler.item_type() {
            return Ok(None);
        }

        match self.handler.from_payload(&record.item_data) {
            Ok(content) => Ok(Some(self.projections.to_detail(&record, content))),
            Err(err) => {
                event!(Level::WARN, archive_id, error = %err, "archive payload unreadable");
                Ok(None)
            }
        }
    }

    /// Reinstate archived entities into the live store.
    ///
    /// Restoring from trash consumes the records; restoring from history
    /// leaves them in place. Returns the saved parent entities.
    pub async fn bulk_restore(
        &self,
        archive_ids: &[String],
        collection: CollectionKey,
    ) -> Result<Vec<K::Entity>> {
        let span = info_span!(
            "archive.restore",
            item_type = %self.handler.item_type(),
            collection = %collection,
            requested = archive_ids.len()
        );
        self.restore_records(archive_ids, collection).instrument(span).await
    }

    async fn restore_records(
        &self,
        archive_ids: &[String],
        collection: CollectionKey,
    ) -> Result<Vec<K::Entity>> {
        let archive_ids = distinct(archive_ids);
        if archive_ids.is_empty() {
            return Ok(Vec::new());
        }

        let item_type = self.handler.item_type();
        let records: Vec<ArchiveRecord> = self
            .service
            .fetch_raw_by_ids(&archive_ids, collection)
            .await?
            .into_iter()
            .flatten()
            .filter(|record| record.item_type == item_type)
            .collect();

        let mut consumed = Vec::with_capacity(records.len());
        let mut parents = Vec::with_capacity(records.len());
        let mut children = Vec::new();
        for record in &records {
            match self.handler.from_payload(&record.item_data) {
                Ok(Unpacked::Simple(entity)) => parents.push(entity),
                Ok(Unpacked::Composite {
                    entity,
                    children: bundled,
                }) => {
                    parents.push(entity);
                    children.extend(bundled);
                }
                Err(err) => {
                    event!(
                        Level::WARN,
                        archive_id = %record.archive_id,
                        error = %err,
                        "skipping unreadable archive payload"
                    );
                    continue;
                }
            }
            consumed.push(record.archive_id.clone());
        }

        if parents.is_empty() {
            event!(Level::DEBUG, "nothing to restore");
            return Ok(Vec::new());
        }

        let parents = match self.handler.post_restore_hook() {
            Some(hook) => hook.apply(parents).await?,
            None => parents,
        };

        let saved = self.handler.live_store().save(parents).await?;
        self.handler.live_cache().sync_many(&saved)?;

        if let Some(child_ops) = self.handler.child_ops()
            && !children.is_empty()
        {
            let saved_children = child_ops.bulk_save_children(children).await?;
            if let Some(child_cache) = self.handler.child_cache() {
                child_cache.sync_many(&saved_children)?;
            }
        }

        if collection.restore_consumes() {
            self.service.delete_by_ids(&consumed, collection).await?;
        }
        // A live entity has no trash copy left behind.
        let restored_ids: Vec<String> = saved.iter().map(|entity| entity.id().to_string()).collect();
        self.service
            .delete_trashed_copies(item_type, &restored_ids, &[])
            .await?;

        event!(Level::INFO, restored = saved.len(), "archive items restored");
        Ok(saved)
    }

    /// Permanently delete records. Payloads are self-contained, so nothing
    /// cascades.
    pub async fn bulk_purge(&self, archive_ids: &[String], collection: CollectionKey) -> Result<usize> {
        let purged = self.service.delete_by_ids(archive_ids, collection).await?;
        event!(
            Level::INFO,
            item_type = %self.handler.item_type(),
            collection = %collection,
            purged,
            "archive items purged"
        );
        Ok(purged)
    }

    pub async fn run_garbage_collection(&self) -> Result<GcReport> {
        self.service
            .run_garbage_collection(self.handler.item_type())
            .await
    }

    pub async fn set_favorite(
        &self,
        archive_ids: &[String],
        collection: CollectionKey,
        value: bool,
    ) -> Result<usize> {
        self.service.set_favorite(archive_ids, collection, value).await
    }
}

/// First occurrence of each id, in input order.
fn distinct(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_keeps_first_occurrence_order() {
        let ids: Vec<String> = ["b", "a", "b", "c", "a"].iter().map(|s| s.to_string()).collect();
        assert_eq!(distinct(&ids), vec!["b", "a", "c"]);
        assert!(distinct(&[]).is_empty());
    }
}
