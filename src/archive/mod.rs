//! Archive engine: trash and history collections, restore, purge and GC.

pub mod gc;
pub mod handler;
pub mod orchestrator;
pub mod record;
pub mod service;
pub mod worker;

pub use gc::{GcReport, GcSweepReport};
pub use handler::{
    ArchiveKind, ChildOps, CompositePayload, EntityArchiveHandler, EntityArchiveHandlerBuilder,
    PayloadMapper, PostRestoreHook, ProjectionMapper, Unpacked,
};
pub use orchestrator::{ArchiveOrchestrator, SnapshotSource};
pub use record::{ArchiveMetadata, ArchivePatch, ArchiveRecord, NewArchiveItem, SnapshotFilter};
pub use service::{ArchiveService, archive_store};
pub use worker::{RetentionWorker, spawn_retention_worker};
