//! Live-entity side of the archive: durable stores and their in-memory caches.

pub mod cache;
pub mod store;

pub use cache::{DEFAULT_CACHE_CAPACITY, LiveCache, LiveEntityCache};
pub use store::{InMemoryLiveStore, LiveEntity, LiveStore, NoChildren};
