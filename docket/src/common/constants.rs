// doc constants
pub const DOC_ID: &str = "id";
pub const DOC_INDEX: &str = "index";
pub const DOC_CREATED: &str = "created";
pub const RESERVED_FIELDS: [&str; 3] = [DOC_ID, DOC_INDEX, DOC_CREATED];

// collection constants
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

// pipeline constants
pub const DEFAULT_INTAKE_CAPACITY: usize = 100_000;
pub const DEFAULT_COLLECTION_CHANNEL_CAPACITY: usize = 10_000;
pub const DEFAULT_DISPATCHER_RESTART_DELAY_MS: u64 = 2_000;

// filter constants
pub const FILTER_DEFAULT_LIMIT: usize = 1_000;
pub const FILTER_DEFAULT_WORKERS: usize = 4;

// persistence constants
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 30;
pub const DATABASE_META_FILE: &str = "database.meta";
pub const COLLECTION_META_FILE: &str = "collection.meta";
pub const BATCH_FILE_EXTENSION: &str = "batch";
pub const TEMP_FILE_EXTENSION: &str = "tmp";
pub const RECORD_MAGIC: [u8; 4] = *b"DKT1";
pub const RECORD_FORMAT_VERSION: u16 = 1;

// registry constants
pub const SCHEMA_VERSION_KEY: &str = "schema_version";
pub const INITIAL_SCHEMA_VERSION: u32 = 1;
pub const MAX_NAME_LENGTH: usize = 64;

pub const DOCKET_VERSION: &str = env!("CARGO_PKG_VERSION");
