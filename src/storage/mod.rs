pub mod engine;
pub mod memory;
pub mod persistence;

pub use engine::{RecordFilter, RecordStore, SortDirection, StoredRecord};
pub use memory::InMemoryRecordStore;
pub use persistence::{SnapshotManager, SnapshotMetadata, StoreSnapshot};
