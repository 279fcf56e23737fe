//! Packs: the composite archive kind. A pack is archived together with every
//! card whose `pack_id` points at it.

use super::card::{Card, PackCardOps};
use crate::archive::{
    ArchiveKind, ArchiveMetadata, ArchiveOrchestrator, ArchiveRecord, ArchiveService,
    CompositePayload, EntityArchiveHandler, GcReport, PayloadMapper, ProjectionMapper,
    SnapshotFilter, SnapshotSource, Unpacked,
};
use crate::core::{ArchiveError, CollectionKey, ItemType, Result};
use crate::live::{LiveCache, LiveEntity, LiveEntityCache, LiveStore};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pack {
    pub id: String,
    pub name: String,
    pub set_code: String,
    pub opened: bool,
}

impl Pack {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn placeholder(id: impl Into<String>) -> Self {
        Self::new(id, "Unknown pack")
    }
}

impl LiveEntity for Pack {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackSummary {
    pub meta: ArchiveMetadata,
    pub name: String,
    pub set_code: String,
    pub card_count: usize,
    pub is_placeholder: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackDetail {
    pub meta: ArchiveMetadata,
    pub pack: Pack,
    pub cards: Vec<Card>,
}

pub struct PackKind;

impl ArchiveKind for PackKind {
    type Entity = Pack;
    type Child = Card;
    type Summary = PackSummary;
    type Detail = PackDetail;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PackMapper;

impl PayloadMapper<PackKind> for PackMapper {
    fn to_payload(&self, entity: &Pack, children: Option<&[Card]>) -> Result<JsonValue> {
        let bundle = CompositePayload {
            entity: entity.clone(),
            children: children.map(<[Card]>::to_vec).unwrap_or_default(),
        };
        Ok(serde_json::to_value(bundle)?)
    }

    fn from_payload(&self, payload: &JsonValue) -> Result<Unpacked<Pack, Card>> {
        let bundle = CompositePayload::<Pack, Card>::deserialize(payload)
            .map_err(|err| ArchiveError::Serialization(format!("pack payload: {}", err)))?;
        if bundle.entity.id.is_empty() {
            return Err(ArchiveError::Serialization("pack payload without id".to_string()));
        }
        Ok(Unpacked::Composite {
            entity: bundle.entity,
            children: bundle.children,
        })
    }
}

impl ProjectionMapper<PackKind> for PackMapper {
    fn to_summary(&self, record: &ArchiveRecord) -> PackSummary {
        let decoded = match record.item_type {
            ItemType::Pack => self.from_payload(&record.item_data).ok(),
            _ => None,
        };
        let is_placeholder = decoded.is_none();
        let (pack, cards) = decoded
            .map(Unpacked::into_parts)
            .unwrap_or_else(|| (Pack::placeholder(record.item_id.clone()), Vec::new()));

        PackSummary {
            meta: record.metadata(),
            name: pack.name,
            set_code: pack.set_code,
            card_count: cards.len(),
            is_placeholder,
        }
    }

    fn to_detail(&self, record: &ArchiveRecord, content: Unpacked<Pack, Card>) -> PackDetail {
        let (pack, cards) = content.into_parts();
        PackDetail {
            meta: record.metadata(),
            pack,
            cards,
        }
    }
}

/// Archive operations for packs and their cards.
pub struct PackArchive {
    orchestrator: ArchiveOrchestrator<PackKind>,
    packs: Arc<dyn LiveStore<Pack>>,
    cache: Arc<LiveEntityCache<Pack>>,
}

impl PackArchive {
    pub fn new(
        service: Arc<ArchiveService>,
        packs: Arc<dyn LiveStore<Pack>>,
        cards: Arc<dyn LiveStore<Card>>,
        cache: Arc<LiveEntityCache<Pack>>,
        card_cache: Arc<dyn LiveCache<Card>>,
    ) -> Self {
        let mapper = Arc::new(PackMapper);
        let live_cache: Arc<dyn LiveCache<Pack>> = cache.clone();
        let handler = EntityArchiveHandler::<PackKind>::builder(
            ItemType::Pack,
            packs.clone(),
            live_cache,
            mapper.clone(),
        )
        .child_ops(Arc::new(PackCardOps::new(cards)))
        .child_cache(card_cache)
        .build();

        Self {
            orchestrator: ArchiveOrchestrator::new(service, handler, mapper),
            packs,
            cache,
        }
    }

    pub fn orchestrator(&self) -> &ArchiveOrchestrator<PackKind> {
        &self.orchestrator
    }

    pub async fn live_packs(&self) -> Result<Vec<Pack>> {
        self.cache.load_all(self.packs.as_ref()).await
    }

    /// Bundles each pack with its cards, then removes both from the live side.
    pub async fn move_to_trash(&self, ids: &[String]) -> Result<Vec<ArchiveRecord>> {
        self.orchestrator.move_to_trash(ids).await
    }

    pub async fn save_snapshot_to_history(
        &self,
        source: SnapshotSource<Pack>,
        is_manual: bool,
    ) -> Result<Option<ArchiveRecord>> {
        self.orchestrator.save_snapshot_to_history(source, is_manual).await
    }

    pub async fn list(&self, collection: CollectionKey) -> Result<Vec<PackSummary>> {
        self.orchestrator.fetch_all_metadata(collection).await
    }

    pub async fn list_filtered(
        &self,
        collection: CollectionKey,
        filter: SnapshotFilter,
    ) -> Result<Vec<PackSummary>> {
        self.orchestrator.fetch_metadata_filtered(collection, filter).await
    }

    pub async fn detail(&self, archive_id: &str, collection: CollectionKey) -> Result<Option<PackDetail>> {
        self.orchestrator.fetch_item_detail(archive_id, collection).await
    }

    /// Restores packs and every bundled card.
    pub async fn restore(&self, archive_ids: &[String], collection: CollectionKey) -> Result<Vec<Pack>> {
        self.orchestrator.bulk_restore(archive_ids, collection).await
    }

    pub async fn purge(&self, archive_ids: &[String], collection: CollectionKey) -> Result<usize> {
        self.orchestrator.bulk_purge(archive_ids, collection).await
    }

    pub async fn set_favorite(
        &self,
        archive_ids: &[String],
        collection: CollectionKey,
        value: bool,
    ) -> Result<usize> {
        self.orchestrator.set_favorite(archive_ids, collection, value).await
    }

    pub async fn run_garbage_collection(&self) -> Result<GcReport> {
        let report = self.orchestrator.run_garbage_collection().await?;
        self.cache.invalidate()?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ChildOps;
    use crate::live::InMemoryLiveStore;

    struct Fixture {
        archive: PackArchive,
        packs: Arc<InMemoryLiveStore<Pack>>,
        cards: Arc<InMemoryLiveStore<Card>>,
        card_cache: Arc<LiveEntityCache<Card>>,
    }

    fn fixture() -> Fixture {
        let packs = Arc::new(InMemoryLiveStore::with_entities(vec![Pack::new("p1", "Booster")]));
        let cards = Arc::new(InMemoryLiveStore::with_entities(vec![
            Card::new("c1", "Ember Drake").in_pack("p1"),
            Card::new("c2", "Tide Caller").in_pack("p1"),
            Card::new("c3", "Loose Card"),
        ]));
        let card_cache = Arc::new(LiveEntityCache::new(16));
        let archive = PackArchive::new(
            Arc::new(ArchiveService::in_memory()),
            packs.clone(),
            cards.clone(),
            Arc::new(LiveEntityCache::new(16)),
            card_cache.clone(),
        );
        Fixture {
            archive,
            packs,
            cards,
            card_cache,
        }
    }

    #[tokio::test]
    async fn test_move_to_trash_bundles_cards() {
        let fx = fixture();
        fx.card_cache.load_all(fx.cards.as_ref()).await.unwrap();

        let trashed = fx.archive.move_to_trash(&["p1".to_string()]).await.unwrap();
        assert_eq!(trashed.len(), 1);
        assert!(fx.packs.is_empty().await);
        assert_eq!(fx.cards.len().await, 1);
        assert!(fx.card_cache.peek("c1").unwrap().is_none());
        assert!(fx.card_cache.peek("c3").unwrap().is_some());

        let summaries = fx.archive.list(CollectionKey::Trash).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].card_count, 2);
        assert!(!summaries[0].is_placeholder);
    }

    #[tokio::test]
    async fn test_detail_carries_children() {
        let fx = fixture();
        let snapshot = fx
            .archive
            .save_snapshot_to_history(SnapshotSource::Id("p1".to_string()), true)
            .await
            .unwrap()
            .unwrap();

        let detail = fx
            .archive
            .detail(&snapshot.archive_id, CollectionKey::History)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(detail.pack.name, "Booster");
        assert_eq!(detail.cards.len(), 2);
        assert_eq!(fx.cards.len().await, 3);
    }

    /// Card ops whose child removal always fails.
    struct FailingCardOps(PackCardOps);

    #[async_trait::async_trait]
    impl ChildOps<Card> for FailingCardOps {
        async fn fetch_children_by_parent_ids(&self, parent_ids: &[String]) -> Result<Vec<Card>> {
            self.0.fetch_children_by_parent_ids(parent_ids).await
        }

        async fn bulk_save_children(&self, children: Vec<Card>) -> Result<Vec<Card>> {
            self.0.bulk_save_children(children).await
        }

        async fn remove_children_by_parent_id(&self, _parent_id: &str) -> Result<usize> {
            Err(ArchiveError::LiveStore("card table locked".to_string()))
        }
    }

    #[tokio::test]
    async fn test_failed_child_removal_still_evicts_parent_cache() {
        let fx = fixture();
        let cache = Arc::new(LiveEntityCache::<Pack>::new(16));
        let live_cache: Arc<dyn LiveCache<Pack>> = cache.clone();
        let handler = EntityArchiveHandler::<PackKind>::builder(
            ItemType::Pack,
            fx.packs.clone(),
            live_cache,
            Arc::new(PackMapper),
        )
        .child_ops(Arc::new(FailingCardOps(PackCardOps::new(fx.cards.clone()))))
        .build();
        let orchestrator =
            ArchiveOrchestrator::new(Arc::new(ArchiveService::in_memory()), handler, Arc::new(PackMapper));

        assert_eq!(cache.load_all(fx.packs.as_ref()).await.unwrap().len(), 1);
        let err = orchestrator.move_to_trash(&["p1".to_string()]).await.unwrap_err();
        assert!(matches!(err, ArchiveError::LiveStore(_)));

        assert!(fx.packs.is_empty().await);
        assert!(cache.peek("p1").unwrap().is_none());
        assert!(cache.load_all(fx.packs.as_ref()).await.unwrap().is_empty());
    }

    #[test]
    fn test_unreadable_bundle_is_placeholder() {
        let record = ArchiveRecord {
            archive_id: "a1".to_string(),
            item_id: "p7".to_string(),
            item_type: ItemType::Pack,
            collection_key: CollectionKey::Trash,
            archived_at: chrono::Utc::now(),
            item_data: serde_json::json!({"entity": "not a pack"}),
            is_favorite: false,
            is_manual: false,
        };
        let summary = PackMapper.to_summary(&record);
        assert!(summary.is_placeholder);
        assert_eq!(summary.name, "Unknown pack");
        assert!(PackMapper.from_payload(&record.item_data).is_err());
    }
}
