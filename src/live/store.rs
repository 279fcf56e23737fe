use crate::core::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::RwLock;

/// An entity that lives in a durable live store and can be archived.
pub trait LiveEntity: Clone + Send + Sync + fmt::Debug + Serialize + DeserializeOwned + 'static {
    fn id(&self) -> &str;
}

/// Uninhabited child type for simple (non-composite) entity kinds.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub enum NoChildren {}

impl LiveEntity for NoChildren {
    fn id(&self) -> &str {
        match *self {}
    }
}

/// Durable store of live entities of one kind.
#[async_trait]
pub trait LiveStore<E: LiveEntity>: Send + Sync {
    /// Present entities only; missing ids are skipped.
    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<E>>;

    /// Upsert. Returns the entities as stored.
    async fn save(&self, entities: Vec<E>) -> Result<Vec<E>>;

    /// Returns how many entities were removed.
    async fn delete(&self, ids: &[String]) -> Result<usize>;

    async fn fetch_all(&self) -> Result<Vec<E>>;
}

/// Reference [`LiveStore`] kept in memory.
pub struct InMemoryLiveStore<E: LiveEntity> {
    entities: RwLock<BTreeMap<String, E>>,
}

impl<E: LiveEntity> InMemoryLiveStore<E> {
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn with_entities(entities: impl IntoIterator<Item = E>) -> Self {
        let entities = entities
            .into_iter()
            .map(|entity| (entity.id().to_string(), entity))
            .collect();
        Self {
            entities: RwLock::new(entities),
        }
    }

    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }
}

impl<E: LiveEntity> Default for InMemoryLiveStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E: LiveEntity> LiveStore<E> for InMemoryLiveStore<E> {
    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<E>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let entities = self.entities.read().await;
        Ok(ids.iter().filter_map(|id| entities.get(id).cloned()).collect())
    }

    async fn save(&self, entities: Vec<E>) -> Result<Vec<E>> {
        if entities.is_empty() {
            return Ok(entities);
        }
        let mut stored = self.entities.write().await;
        for entity in &entities {
            stored.insert(entity.id().to_string(), entity.clone());
        }
        Ok(entities)
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut stored = self.entities.write().await;
        Ok(ids.iter().filter(|id| stored.remove(id.as_str()).is_some()).count())
    }

    async fn fetch_all(&self) -> Result<Vec<E>> {
        Ok(self.entities.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Thing {
        id: String,
        group: u8,
    }

    impl LiveEntity for Thing {
        fn id(&self) -> &str {
            &self.id
        }
    }

    fn thing(id: &str, group: u8) -> Thing {
        Thing {
            id: id.to_string(),
            group,
        }
    }

    #[tokio::test]
    async fn test_save_fetch_delete() {
        let store = InMemoryLiveStore::new();
        store.save(vec![thing("a", 1), thing("b", 2)]).await.unwrap();

        let found = store
            .fetch_by_ids(&["b".to_string(), "zz".to_string()])
            .await
            .unwrap();
        assert_eq!(found, vec![thing("b", 2)]);

        assert_eq!(store.delete(&["a".to_string(), "a".to_string()]).await.unwrap(), 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_save_replaces_by_id() {
        let store = InMemoryLiveStore::with_entities([thing("a", 1), thing("b", 1)]);
        store.save(vec![thing("a", 7)]).await.unwrap();
        assert_eq!(store.fetch_all().await.unwrap(), vec![thing("a", 7), thing("b", 1)]);
        assert!(store.save(Vec::new()).await.unwrap().is_empty());
    }
}
