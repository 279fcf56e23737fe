// ============================================================================
// CardVault archive library
// ============================================================================

pub mod archive;
pub mod config;
pub mod core;
pub mod entities;
pub mod live;
pub mod policy;
pub mod storage;

// Re-export main types for convenience
pub use archive::{
    ArchiveMetadata, ArchiveOrchestrator, ArchiveRecord, ArchiveService, GcReport, NewArchiveItem,
    RetentionWorker, SnapshotFilter, SnapshotSource, spawn_retention_worker,
};
pub use config::ArchiveConfig;
pub use core::{ArchiveError, Clock, CollectionKey, ItemType, ManualClock, Result, SystemClock};
pub use entities::{Card, Deck, DeckArchive, Pack, PackArchive};
pub use live::{InMemoryLiveStore, LiveEntityCache};
pub use policy::{PolicyOverride, PolicyResolver, RetentionPolicy};
pub use storage::{InMemoryRecordStore, SnapshotManager};
