use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::DATABASE_META_FILE;
use crate::errors::{DocketError, DocketResult, ErrorKind};
use crate::store::{
    codec, BatchRecord, CollectionMeta, DatabaseMeta, FileStorage, MemoryStorage, StorageLayout,
};

/// Byte level storage contract.
///
/// Implementations only move opaque bytes between paths, record framing and
/// path derivation are done by [Storage].
pub trait StorageProvider: Send + Sync {
    /// Replaces the content at `path`, creating parent directories as needed.
    fn write(&self, path: &Path, bytes: &[u8]) -> DocketResult<()>;

    fn read(&self, path: &Path) -> DocketResult<Vec<u8>>;

    fn exists(&self, path: &Path) -> bool;

    /// Immediate children of `dir`. A missing directory has none.
    fn list(&self, dir: &Path) -> DocketResult<Vec<PathBuf>>;

    /// Removes `dir` and everything below it. Missing directories are ignored.
    fn remove_all(&self, dir: &Path) -> DocketResult<()>;
}

/// Record level access to the persisted state.
///
/// Cheap to clone, every clone shares the same provider.
#[derive(Clone)]
pub struct Storage {
    provider: Arc<dyn StorageProvider>,
    layout: StorageLayout,
}

impl Storage {
    pub fn with_provider(provider: Arc<dyn StorageProvider>, layout: StorageLayout) -> Self {
        Storage { provider, layout }
    }

    pub fn in_memory() -> Self {
        Self::with_provider(Arc::new(MemoryStorage::new()), StorageLayout::default())
    }

    pub fn on_disk<P: AsRef<Path>>(root: P) -> DocketResult<Self> {
        let provider = FileStorage::new(root.as_ref())?;
        Ok(Self::with_provider(Arc::new(provider), StorageLayout::new(root)))
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn write_database_meta(&self, meta: &DatabaseMeta) -> DocketResult<()> {
        self.write_record(&self.layout.database_meta(&meta.name), meta)
    }

    pub fn read_database_meta(&self, database: &str) -> DocketResult<DatabaseMeta> {
        self.read_record(&self.layout.database_meta(database))
    }

    pub fn write_collection_meta(&self, database: &str, meta: &CollectionMeta) -> DocketResult<()> {
        self.write_record(&self.layout.collection_meta(database, &meta.name), meta)
    }

    pub fn read_collection_meta(&self, database: &str, collection: &str) -> DocketResult<CollectionMeta> {
        self.read_record(&self.layout.collection_meta(database, collection))
    }

    pub fn write_batch(&self, database: &str, collection: &str, record: &BatchRecord) -> DocketResult<()> {
        self.write_record(&self.layout.batch_file(database, collection, &record.batch_id), record)
    }

    pub fn read_batch(&self, path: &Path) -> DocketResult<BatchRecord> {
        self.read_record(path)
    }

    /// Names of every database folder holding a metadata file.
    pub fn list_databases(&self) -> DocketResult<Vec<String>> {
        let mut names: Vec<String> = self
            .provider
            .list(self.layout.root())?
            .into_iter()
            .filter(|dir| self.provider.exists(&dir.join(DATABASE_META_FILE)))
            .filter_map(|dir| dir.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Batch files of a collection, sorted by path.
    pub fn list_batch_files(&self, database: &str, collection: &str) -> DocketResult<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = self
            .provider
            .list(&self.layout.collection_dir(database, collection))?
            .into_iter()
            .filter(|path| StorageLayout::is_batch_file(path))
            .collect();
        files.sort();
        Ok(files)
    }

    /// Removes the on-disk folder of a collection.
    pub fn purge_collection(&self, database: &str, collection: &str) -> DocketResult<()> {
        let dir = self.layout.collection_dir(database, collection);
        log::debug!("Purging collection folder {}", dir.display());
        self.provider.remove_all(&dir)
    }

    fn write_record<T: Serialize>(&self, path: &Path, record: &T) -> DocketResult<()> {
        let bytes = codec::encode(record)?;
        self.provider.write(path, &bytes).map_err(|err| {
            DocketError::new_with_cause(
                &format!("Failed to write {}", path.display()),
                ErrorKind::WriteFailure,
                err,
            )
        })
    }

    fn read_record<T: DeserializeOwned>(&self, path: &Path) -> DocketResult<T> {
        let bytes = self.provider.read(path)?;
        codec::decode(&bytes).map_err(|err| {
            DocketError::new_with_cause(
                &format!("Failed to decode {}", path.display()),
                ErrorKind::DecodeFailure,
                err,
            )
        })
    }
}
