use crate::archive::ChildOps;
use crate::core::Result;
use crate::live::{LiveEntity, LiveStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A card in the collection, optionally belonging to a pack.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Card {
    pub id: String,
    pub pack_id: Option<String>,
    pub name: String,
    pub rarity: String,
    pub quantity: u32,
}

impl Card {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            quantity: 1,
            ..Self::default()
        }
    }

    pub fn in_pack(mut self, pack_id: impl Into<String>) -> Self {
        self.pack_id = Some(pack_id.into());
        self
    }

    pub fn rarity(mut self, rarity: impl Into<String>) -> Self {
        self.rarity = rarity.into();
        self
    }
}

impl LiveEntity for Card {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Cards as the dependent children of packs, linked through `pack_id`.
pub struct PackCardOps {
    cards: Arc<dyn LiveStore<Card>>,
}

impl PackCardOps {
    pub fn new(cards: Arc<dyn LiveStore<Card>>) -> Self {
        Self { cards }
    }
}

#[async_trait]
impl ChildOps<Card> for PackCardOps {
    async fn fetch_children_by_parent_ids(&self, parent_ids: &[String]) -> Result<Vec<Card>> {
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }
        let cards = self.cards.fetch_all().await?;
        Ok(cards
            .into_iter()
            .filter(|card| {
                card.pack_id
                    .as_ref()
                    .is_some_and(|pack_id| parent_ids.contains(pack_id))
            })
            .collect())
    }

    async fn bulk_save_children(&self, children: Vec<Card>) -> Result<Vec<Card>> {
        self.cards.save(children).await
    }

    async fn remove_children_by_parent_id(&self, parent_id: &str) -> Result<usize> {
        let ids: Vec<String> = self
            .fetch_children_by_parent_ids(&[parent_id.to_string()])
            .await?
            .into_iter()
            .map(|card| card.id)
            .collect();
        self.cards.delete(&ids).await
    }
}
