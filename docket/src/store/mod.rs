//! Persistence: byte level providers, path layout, record framing and the
//! periodic flush ticker.
pub mod codec;
mod file_storage;
mod layout;
mod memory_storage;
mod provider;
mod scheduler;

pub use codec::{BatchRecord, CollectionMeta, DatabaseMeta};
pub use file_storage::FileStorage;
pub use layout::StorageLayout;
pub use memory_storage::MemoryStorage;
pub use provider::*;
pub(crate) use scheduler::FlushScheduler;
