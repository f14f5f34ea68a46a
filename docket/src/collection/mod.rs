mod batch;
#[allow(clippy::module_inception)]
mod collection;
mod doc_id;
mod document;
mod index;
mod snowflake;
mod store;

pub use batch::BatchId;
pub(crate) use batch::Batch;
pub use collection::*;
pub use doc_id::{created_millis, generate_id};
pub use document::*;
pub(crate) use index::SecondaryIndex;
pub use snowflake::SnowflakeIdGenerator;
pub(crate) use store::CollectionStore;
