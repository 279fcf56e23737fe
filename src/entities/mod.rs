//! Collection entities and their archive modules.

pub mod card;
pub mod deck;
pub mod pack;

pub use crate::archive::SnapshotSource;
pub use card::{Card, PackCardOps};
pub use deck::{Deck, DeckArchive, DeckDetail, DeckKind, DeckMapper, DeckMissingCardsHook, DeckSummary};
pub use pack::{Pack, PackArchive, PackDetail, PackKind, PackMapper, PackSummary};
