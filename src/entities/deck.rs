//! Decks: the simple archive kind.
//!
//! A deck payload is the deck itself. Restoring re-derives
//! `has_missing_cards` against the live card store, since cards may have
//! come and gone while the deck sat in the archive.

use super::card::Card;
use crate::archive::{
    ArchiveKind, ArchiveMetadata, ArchiveOrchestrator, ArchiveRecord, ArchiveService,
    EntityArchiveHandler, GcReport, PayloadMapper, PostRestoreHook, ProjectionMapper,
    SnapshotFilter, SnapshotSource, Unpacked,
};
use crate::core::{ArchiveError, CollectionKey, ItemType, Result};
use crate::live::{LiveCache, LiveEntity, LiveEntityCache, LiveStore, NoChildren};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Deck {
    pub id: String,
    pub name: String,
    pub format: String,
    pub card_ids: Vec<String>,
    /// Derived: some referenced card is not in the collection.
    pub has_missing_cards: bool,
}

impl Deck {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_cards<I, S>(mut self, card_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.card_ids = card_ids.into_iter().map(Into::into).collect();
        self
    }

    /// Stand-in shown for records whose payload cannot be read.
    pub fn placeholder(id: impl Into<String>) -> Self {
        Self::new(id, "Unknown deck")
    }
}

impl LiveEntity for Deck {
    fn id(&self) -> &str {
        &self.id
    }
}

/// List row for an archived deck.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckSummary {
    pub meta: ArchiveMetadata,
    pub name: String,
    pub card_count: usize,
    pub has_missing_cards: bool,
    /// The payload was unreadable and default values were substituted.
    pub is_placeholder: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckDetail {
    pub meta: ArchiveMetadata,
    pub deck: Deck,
}

pub struct DeckKind;

impl ArchiveKind for DeckKind {
    type Entity = Deck;
    type Child = NoChildren;
    type Summary = DeckSummary;
    type Detail = DeckDetail;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DeckMapper;

impl PayloadMapper<DeckKind> for DeckMapper {
    fn to_payload(&self, entity: &Deck, _children: Option<&[NoChildren]>) -> Result<JsonValue> {
        Ok(serde_json::to_value(entity)?)
    }

    fn from_payload(&self, payload: &JsonValue) -> Result<Unpacked<Deck, NoChildren>> {
        let deck = Deck::deserialize(payload)
            .map_err(|err| ArchiveError::Serialization(format!("deck payload: {}", err)))?;
        if deck.id.is_empty() {
            return Err(ArchiveError::Serialization("deck payload without id".to_string()));
        }
        Ok(Unpacked::Simple(deck))
    }
}

impl ProjectionMapper<DeckKind> for DeckMapper {
    fn to_summary(&self, record: &ArchiveRecord) -> DeckSummary {
        let decoded = match record.item_type {
            ItemType::Deck => self.from_payload(&record.item_data).ok(),
            _ => None,
        };
        let is_placeholder = decoded.is_none();
        let deck = decoded
            .map(|unpacked| unpacked.into_parts().0)
            .unwrap_or_else(|| Deck::placeholder(record.item_id.clone()));

        DeckSummary {
            meta: record.metadata(),
            name: deck.name,
            card_count: deck.card_ids.len(),
            has_missing_cards: deck.has_missing_cards,
            is_placeholder,
        }
    }

    fn to_detail(&self, record: &ArchiveRecord, content: Unpacked<Deck, NoChildren>) -> DeckDetail {
        DeckDetail {
            meta: record.metadata(),
            deck: content.into_parts().0,
        }
    }
}

/// Recomputes `has_missing_cards` from the live card store.
pub struct DeckMissingCardsHook {
    cards: Arc<dyn LiveStore<Card>>,
}

impl DeckMissingCardsHook {
    pub fn new(cards: Arc<dyn LiveStore<Card>>) -> Self {
        Self { cards }
    }
}

#[async_trait]
impl PostRestoreHook<Deck> for DeckMissingCardsHook {
    async fn apply(&self, mut decks: Vec<Deck>) -> Result<Vec<Deck>> {
        let wanted: Vec<String> = decks
            .iter()
            .flat_map(|deck| deck.card_ids.iter().cloned())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let present: HashSet<String> = self
            .cards
            .fetch_by_ids(&wanted)
            .await?
            .into_iter()
            .map(|card| card.id)
            .collect();

        for deck in &mut decks {
            deck.has_missing_cards = deck.card_ids.iter().any(|id| !present.contains(id));
        }
        Ok(decks)
    }
}

/// Archive operations for decks.
pub struct DeckArchive {
    orchestrator: ArchiveOrchestrator<DeckKind>,
    decks: Arc<dyn LiveStore<Deck>>,
    cache: Arc<LiveEntityCache<Deck>>,
}

impl DeckArchive {
    pub fn new(
        service: Arc<ArchiveService>,
        decks: Arc<dyn LiveStore<Deck>>,
        cards: Arc<dyn LiveStore<Card>>,
        cache: Arc<LiveEntityCache<Deck>>,
    ) -> Self {
        let mapper = Arc::new(DeckMapper);
        let live_cache: Arc<dyn LiveCache<Deck>> = cache.clone();
        let handler = EntityArchiveHandler::<DeckKind>::builder(
            ItemType::Deck,
            decks.clone(),
            live_cache,
            mapper.clone(),
        )
        .post_restore_hook(Arc::new(DeckMissingCardsHook::new(cards)))
        .build();

        Self {
            orchestrator: ArchiveOrchestrator::new(service, handler, mapper),
            decks,
            cache,
        }
    }

    pub fn orchestrator(&self) -> &ArchiveOrchestrator<DeckKind> {
        &self.orchestrator
    }

    /// Live decks, served from the cache once it is populated.
    pub async fn live_decks(&self) -> Result<Vec<Deck>> {
        self.cache.load_all(self.decks.as_ref()).await
    }

    pub async fn move_to_trash(&self, ids: &[String]) -> Result<Vec<ArchiveRecord>> {
        self.orchestrator.move_to_trash(ids).await
    }

    pub async fn save_snapshot_to_history(
        &self,
        source: SnapshotSource<Deck>,
        is_manual: bool,
    ) -> Result<Option<ArchiveRecord>> {
        self.orchestrator.save_snapshot_to_history(source, is_manual).await
    }

    pub async fn list(&self, collection: CollectionKey) -> Result<Vec<DeckSummary>> {
        self.orchestrator.fetch_all_metadata(collection).await
    }

    pub async fn list_filtered(
        &self,
        collection: CollectionKey,
        filter: SnapshotFilter,
    ) -> Result<Vec<DeckSummary>> {
        self.orchestrator.fetch_metadata_filtered(collection, filter).await
    }

    pub async fn detail(&self, archive_id: &str, collection: CollectionKey) -> Result<Option<DeckDetail>> {
        self.orchestrator.fetch_item_detail(archive_id, collection).await
    }

    pub async fn restore(&self, archive_ids: &[String], collection: CollectionKey) -> Result<Vec<Deck>> {
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

    /// Sweep both collections, then drop the cached live listing.
    pub async fn run_garbage_collection(&self) -> Result<GcReport> {
        let report = self.orchestrator.run_garbage_collection().await?;
        self.cache.invalidate()?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::InMemoryLiveStore;
    use chrono::Utc;
    use serde_json::json;

    struct Fixture {
        archive: DeckArchive,
        decks: Arc<InMemoryLiveStore<Deck>>,
        cards: Arc<InMemoryLiveStore<Card>>,
        cache: Arc<LiveEntityCache<Deck>>,
    }

    fn fixture() -> Fixture {
        let decks = Arc::new(InMemoryLiveStore::with_entities(vec![
            Deck::new("d1", "Burn").with_cards(["c1", "c2"]),
            Deck::new("d2", "Control").with_cards(["c3"]),
        ]));
        let cards = Arc::new(InMemoryLiveStore::with_entities(vec![
            Card::new("c1", "Spark"),
            Card::new("c2", "Blaze"),
            Card::new("c3", "Counter"),
        ]));
        let cache = Arc::new(LiveEntityCache::new(16));
        let archive = DeckArchive::new(
            Arc::new(ArchiveService::in_memory()),
            decks.clone(),
            cards.clone(),
            cache.clone(),
        );
        Fixture {
            archive,
            decks,
            cards,
            cache,
        }
    }

    fn record(item_type: ItemType, item_data: JsonValue) -> ArchiveRecord {
        ArchiveRecord {
            archive_id: "a1".to_string(),
            item_id: "d9".to_string(),
            item_type,
            collection_key: CollectionKey::Trash,
            archived_at: Utc::now(),
            item_data,
            is_favorite: false,
            is_manual: false,
        }
    }

    #[test]
    fn test_summary_placeholder_for_malformed_payload() {
        let summary = DeckMapper.to_summary(&record(ItemType::Deck, json!({"cardIds": 7})));
        assert!(summary.is_placeholder);
        assert_eq!(summary.name, "Unknown deck");
        assert_eq!(summary.meta.item_id, "d9");

        let summary = DeckMapper.to_summary(&record(ItemType::Pack, json!({"id": "d9", "name": "Burn"})));
        assert!(summary.is_placeholder);

        let summary = DeckMapper.to_summary(&record(
            ItemType::Deck,
            json!({"id": "d9", "name": "Burn", "cardIds": ["c1"]}),
        ));
        assert!(!summary.is_placeholder);
        assert_eq!(summary.card_count, 1);
    }

    #[tokio::test]
    async fn test_move_to_trash_evicts_cache() {
        let fx = fixture();
        assert_eq!(fx.archive.live_decks().await.unwrap().len(), 2);
        assert!(fx.cache.peek("d1").unwrap().is_some());

        let trashed = fx.archive.move_to_trash(&["d1".to_string(), "ghost".to_string()]).await.unwrap();
        assert_eq!(trashed.len(), 1);
        assert!(!trashed[0].is_manual);
        assert!(fx.cache.peek("d1").unwrap().is_none());
        assert!(fx.decks.fetch_by_ids(&["d1".to_string()]).await.unwrap().is_empty());
        assert_eq!(fx.archive.live_decks().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_restore_recomputes_missing_cards() {
        let fx = fixture();
        let trashed = fx.archive.move_to_trash(&["d1".to_string()]).await.unwrap();
        fx.cards.delete(&["c2".to_string()]).await.unwrap();

        let restored = fx
            .archive
            .restore(&[trashed[0].archive_id.clone()], CollectionKey::Trash)
            .await
            .unwrap();
        assert_eq!(restored.len(), 1);
        assert!(restored[0].has_missing_cards);
        assert_eq!(fx.cache.peek("d1").unwrap(), Some(restored[0].clone()));
    }

    #[tokio::test]
    async fn test_snapshot_filter_by_manual_flag() {
        let fx = fixture();
        fx.archive
            .save_snapshot_to_history(SnapshotSource::Id("d2".to_string()), true)
            .await
            .unwrap();
        fx.archive
            .save_snapshot_to_history(SnapshotSource::Entity(Deck::new("d3", "Draft")), false)
            .await
            .unwrap();
        assert!(
            fx.archive
                .save_snapshot_to_history(SnapshotSource::Id("ghost".to_string()), true)
                .await
                .unwrap()
                .is_none()
        );

        let manual = fx
            .archive
            .list_filtered(CollectionKey::History, SnapshotFilter::ManualOnly)
            .await
            .unwrap();
        assert_eq!(manual.len(), 1);
        assert_eq!(manual[0].name, "Control");
        assert_eq!(fx.archive.list(CollectionKey::History).await.unwrap().len(), 2);
        assert_eq!(fx.decks.len().await, 2);
    }

    #[tokio::test]
    async fn test_gc_invalidates_live_listing() {
        let fx = fixture();
        fx.archive.live_decks().await.unwrap();
        assert!(fx.cache.is_loaded().unwrap());

        fx.archive.run_garbage_collection().await.unwrap();
        assert!(!fx.cache.is_loaded().unwrap());
        assert!(fx.cache.is_empty().unwrap());
    }
}
