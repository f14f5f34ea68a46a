use std::path::{Path, PathBuf};

use crate::common::{BATCH_FILE_EXTENSION, COLLECTION_META_FILE, DATABASE_META_FILE};

/// Derives every storage path from the root and the entity names.
///
/// ```text
/// <root>/<db>/database.meta
/// <root>/<db>/<coll>/collection.meta
/// <root>/<db>/<coll>/<batch-uuid>.batch
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        StorageLayout {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn database_dir(&self, database: &str) -> PathBuf {
        self.root.join(database)
    }

    pub fn database_meta(&self, database: &str) -> PathBuf {
        self.database_dir(database).join(DATABASE_META_FILE)
    }

    pub fn collection_dir(&self, database: &str, collection: &str) -> PathBuf {
        self.database_dir(database).join(collection)
    }

    pub fn collection_meta(&self, database: &str, collection: &str) -> PathBuf {
        self.collection_dir(database, collection).join(COLLECTION_META_FILE)
    }

    pub fn batch_file(&self, database: &str, collection: &str, batch_id: &str) -> PathBuf {
        self.collection_dir(database, collection)
            .join(format!("{}.{}", batch_id, BATCH_FILE_EXTENSION))
    }

    pub fn is_batch_file(path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == BATCH_FILE_EXTENSION)
    }
}
