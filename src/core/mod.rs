pub mod clock;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ArchiveError, Result};
pub use types::{CollectionKey, ItemType};
