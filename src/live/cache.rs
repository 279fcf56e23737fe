use super::store::{LiveEntity, LiveStore};
use crate::core::Result;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use tracing::{Level, event};

pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// In-memory projection of live entities.
///
/// Writers call `sync_many`/`remove_many` after mutating the live store;
/// `invalidate` drops everything so the next read repopulates.
pub trait LiveCache<E: LiveEntity>: Send + Sync {
    fn sync_many(&self, entities: &[E]) -> Result<()>;

    fn remove_many(&self, ids: &[String]) -> Result<()>;

    fn invalidate(&self) -> Result<()>;
}

struct CacheState<E> {
    entries: LruCache<String, E>,
    /// Set once a full listing has been loaded and nothing was evicted since.
    complete: bool,
}

/// Bounded LRU cache owned by whoever wires the archive modules.
///
/// Populated lazily on the first [`load_all`](Self::load_all) or
/// [`get`](Self::get) and invalidated on demand.
pub struct LiveEntityCache<E: LiveEntity> {
    state: Mutex<CacheState<E>>,
}

impl<E: LiveEntity> LiveEntityCache<E> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                complete: false,
            }),
        }
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.state.lock()?.entries.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn is_loaded(&self) -> Result<bool> {
        Ok(self.state.lock()?.complete)
    }

    /// Cached entity, or `None` on a miss. Does not touch the store.
    pub fn peek(&self, id: &str) -> Result<Option<E>> {
        Ok(self.state.lock()?.entries.peek(id).cloned())
    }

    /// Cached entity, falling back to the store on a miss.
    pub async fn get(&self, id: &str, store: &dyn LiveStore<E>) -> Result<Option<E>> {
        let hit = self.state.lock()?.entries.get(id).cloned();
        if hit.is_some() {
            return Ok(hit);
        }

        let fetched = store.fetch_by_ids(&[id.to_string()]).await?;
        let entity = fetched.into_iter().next();
        if let Some(entity) = &entity {
            self.state.lock()?.entries.put(entity.id().to_string(), entity.clone());
        }
        Ok(entity)
    }

    /// Full listing. Served from memory when a complete load is cached.
    pub async fn load_all(&self, store: &dyn LiveStore<E>) -> Result<Vec<E>> {
        {
            let state = self.state.lock()?;
            if state.complete {
                let mut all: Vec<E> = state.entries.iter().map(|(_, entity)| entity.clone()).collect();
                all.sort_by(|a, b| a.id().cmp(b.id()));
                return Ok(all);
            }
        }

        let all = store.fetch_all().await?;
        let mut state = self.state.lock()?;
        state.entries.clear();
        for entity in &all {
            state.entries.put(entity.id().to_string(), entity.clone());
        }
        // A listing larger than the cache cannot be served from it.
        state.complete = all.len() <= state.entries.cap().get();
        event!(Level::DEBUG, count = all.len(), complete = state.complete, "live cache populated");
        Ok(all)
    }
}

impl<E: LiveEntity> Default for LiveEntityCache<E> {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl<E: LiveEntity> LiveCache<E> for LiveEntityCache<E> {
    fn sync_many(&self, entities: &[E]) -> Result<()> {
        let mut state = self.state.lock()?;
        for entity in entities {
            if let Some((evicted, _)) = state.entries.push(entity.id().to_string(), entity.clone())
                && evicted != entity.id()
            {
                state.complete = false;
            }
        }
        Ok(())
    }

    fn remove_many(&self, ids: &[String]) -> Result<()> {
        let mut state = self.state.lock()?;
        for id in ids {
            state.entries.pop(id);
        }
        Ok(())
    }

    fn invalidate(&self) -> Result<()> {
        let mut state = self.state.lock()?;
        state.entries.clear();
        state.complete = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::InMemoryLiveStore;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        id: String,
        label: String,
    }

    impl LiveEntity for Item {
        fn id(&self) -> &str {
            &self.id
        }
    }

    fn item(id: &str, label: &str) -> Item {
        Item {
            id: id.to_string(),
            label: label.to_string(),
        }
    }

    #[tokio::test]
    async fn test_lazy_population_on_first_load() {
        let store = InMemoryLiveStore::with_entities([item("a", "one"), item("b", "two")]);
        let cache = LiveEntityCache::new(8);
        assert!(!cache.is_loaded().unwrap());

        let all = cache.load_all(&store).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(cache.is_loaded().unwrap());

        // Served from memory: a store-side change is not observed until invalidated.
        store.save(vec![item("c", "three")]).await.unwrap();
        assert_eq!(cache.load_all(&store).await.unwrap().len(), 2);

        cache.invalidate().unwrap();
        assert_eq!(cache.load_all(&store).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_sync_and_remove() {
        let store = InMemoryLiveStore::new();
        let cache = LiveEntityCache::new(8);
        cache.load_all(&store).await.unwrap();

        cache.sync_many(&[item("a", "one")]).unwrap();
        assert_eq!(cache.peek("a").unwrap(), Some(item("a", "one")));
        assert_eq!(cache.load_all(&store).await.unwrap(), vec![item("a", "one")]);

        cache.remove_many(&["a".to_string()]).unwrap();
        assert!(cache.peek("a").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_eviction_marks_listing_incomplete() {
        let store = InMemoryLiveStore::new();
        let cache = LiveEntityCache::new(1);
        cache.load_all(&store).await.unwrap();
        assert!(cache.is_loaded().unwrap());

        cache.sync_many(&[item("a", "one"), item("b", "two")]).unwrap();
        assert!(!cache.is_loaded().unwrap());
        assert_eq!(cache.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_falls_back_to_store() {
        let store = InMemoryLiveStore::with_entities([item("a", "one")]);
        let cache = LiveEntityCache::new(4);
        assert!(cache.peek("a").unwrap().is_none());
        assert_eq!(cache.get("a", &store).await.unwrap(), Some(item("a", "one")));
        assert_eq!(cache.peek("a").unwrap(), Some(item("a", "one")));
        assert!(cache.get("missing", &store).await.unwrap().is_none());
    }
}
