//! Per-entity-kind strategy injected into the generic archive engine.
//!
//! A handler is a value carrying trait objects for everything the engine
//! cannot know about an entity kind: how to read and write it live, how to
//! pack it into an archive payload and unpack it again, and the optional
//! post-restore and child hooks used by composite kinds.

use super::record::ArchiveRecord;
use crate::core::{ItemType, Result};
use crate::live::{LiveCache, LiveEntity, LiveStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;

/// Binds the concrete types of one entity kind.
pub trait ArchiveKind: Send + Sync + 'static {
    type Entity: LiveEntity;
    /// [`NoChildren`](crate::live::NoChildren) for simple kinds.
    type Child: LiveEntity;
    /// List-row projection.
    type Summary: Clone + Send + Sync + fmt::Debug;
    /// Restorable detail projection.
    type Detail: Clone + Send + Sync + fmt::Debug;
}

/// Result of unpacking an archive payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Unpacked<E, C> {
    Simple(E),
    Composite { entity: E, children: Vec<C> },
}

impl<E, C> Unpacked<E, C> {
    pub fn entity(&self) -> &E {
        match self {
            Self::Simple(entity) | Self::Composite { entity, .. } => entity,
        }
    }

    pub fn children(&self) -> &[C] {
        match self {
            Self::Simple(_) => &[],
            Self::Composite { children, .. } => children,
        }
    }

    pub fn into_parts(self) -> (E, Vec<C>) {
        match self {
            Self::Simple(entity) => (entity, Vec::new()),
            Self::Composite { entity, children } => (entity, children),
        }
    }
}

/// Wire shape of a composite payload: the parent plus every child as it
/// existed at archive time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositePayload<E, C> {
    pub entity: E,
    pub children: Vec<C>,
}

/// Converts live entities to archive payloads and back.
pub trait PayloadMapper<K: ArchiveKind>: Send + Sync {
    fn to_payload(&self, entity: &K::Entity, children: Option<&[K::Child]>) -> Result<JsonValue>;

    fn from_payload(&self, payload: &JsonValue) -> Result<Unpacked<K::Entity, K::Child>>;
}

/// Builds display and detail projections from archive records.
pub trait ProjectionMapper<K: ArchiveKind>: Send + Sync {
    /// Must not fail: malformed payloads yield a default-valued placeholder.
    fn to_summary(&self, record: &ArchiveRecord) -> K::Summary;

    fn to_detail(&self, record: &ArchiveRecord, content: Unpacked<K::Entity, K::Child>) -> K::Detail;
}

/// Re-derives computed fields on entities about to be restored.
#[async_trait]
pub trait PostRestoreHook<E: LiveEntity>: Send + Sync {
    async fn apply(&self, entities: Vec<E>) -> Result<Vec<E>>;
}

/// Live-side operations on the dependent children of a composite kind.
#[async_trait]
pub trait ChildOps<C: LiveEntity>: Send + Sync {
    async fn fetch_children_by_parent_ids(&self, parent_ids: &[String]) -> Result<Vec<C>>;

    async fn bulk_save_children(&self, children: Vec<C>) -> Result<Vec<C>>;

    /// Returns how many children were removed.
    async fn remove_children_by_parent_id(&self, parent_id: &str) -> Result<usize>;
}

/// Strategy value wiring one entity kind into the archive engine.
pub struct EntityArchiveHandler<K: ArchiveKind> {
    item_type: ItemType,
    live_store: Arc<dyn LiveStore<K::Entity>>,
    live_cache: Arc<dyn LiveCache<K::Entity>>,
    mapper: Arc<dyn PayloadMapper<K>>,
    post_restore: Option<Arc<dyn PostRestoreHook<K::Entity>>>,
    child_ops: Option<Arc<dyn ChildOps<K::Child>>>,
    child_cache: Option<Arc<dyn LiveCache<K::Child>>>,
}

impl<K: ArchiveKind> EntityArchiveHandler<K> {
    pub fn builder(
        item_type: ItemType,
        live_store: Arc<dyn LiveStore<K::Entity>>,
        live_cache: Arc<dyn LiveCache<K::Entity>>,
        mapper: Arc<dyn PayloadMapper<K>>,
    ) -> EntityArchiveHandlerBuilder<K> {
        EntityArchiveHandlerBuilder {
            handler: Self {
                item_type,
                live_store,
                live_cache,
                mapper,
                post_restore: None,
                child_ops: None,
                child_cache: None,
            },
        }
    }

    pub fn item_type(&self) -> ItemType {
        self.item_type
    }

    pub fn live_store(&self) -> &dyn LiveStore<K::Entity> {
        self.live_store.as_ref()
    }

    pub fn live_cache(&self) -> &dyn LiveCache<K::Entity> {
        self.live_cache.as_ref()
    }

    pub fn mapper(&self) -> &dyn PayloadMapper<K> {
        self.mapper.as_ref()
    }

    pub fn post_restore_hook(&self) -> Option<&dyn PostRestoreHook<K::Entity>> {
        self.post_restore.as_deref()
    }

    pub fn child_ops(&self) -> Option<&dyn ChildOps<K::Child>> {
        self.child_ops.as_deref()
    }

    pub fn child_cache(&self) -> Option<&dyn LiveCache<K::Child>> {
        self.child_cache.as_deref()
    }

    pub fn to_payload(&self, entity: &K::Entity, children: Option<&[K::Child]>) -> Result<JsonValue> {
        self.mapper.to_payload(entity, children)
    }

    pub fn from_payload(&self, payload: &JsonValue) -> Result<Unpacked<K::Entity, K::Child>> {
        self.mapper.from_payload(payload)
    }
}

pub struct EntityArchiveHandlerBuilder<K: ArchiveKind> {
    handler: EntityArchiveHandler<K>,
}

impl<K: ArchiveKind> EntityArchiveHandlerBuilder<K> {
    pub fn post_restore_hook(mut self, hook: Arc<dyn PostRestoreHook<K::Entity>>) -> Self {
        self.handler.post_restore = Some(hook);
        self
    }

    pub fn child_ops(mut self, ops: Arc<dyn ChildOps<K::Child>>) -> Self {
        self.handler.child_ops = Some(ops);
        self
    }

    pub fn child_cache(mut self, cache: Arc<dyn LiveCache<K::Child>>) -> Self {
        self.handler.child_cache = Some(cache);
        self
    }

    pub fn build(self) -> EntityArchiveHandler<K> {
        self.handler
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpacked_parts() {
        let simple: Unpacked<&str, u8> = Unpacked::Simple("deck");
        assert_eq!(*simple.entity(), "deck");
        assert!(simple.children().is_empty());

        let composite: Unpacked<&str, u8> = Unpacked::Composite {
            entity: "pack",
            children: vec![1, 2],
        };
        assert_eq!(composite.children(), &[1, 2]);
        assert_eq!(composite.into_parts(), ("pack", vec![1, 2]));
    }
}
