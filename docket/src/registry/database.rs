use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use itertools::Itertools;
use parking_lot::RwLock;

use crate::collection::Collection;
use crate::common::SCHEMA_VERSION_KEY;
use crate::store::DatabaseMeta;

/// Name and declared index keys of a collection to create.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionSpec {
    pub name: String,
    pub index_keys: Vec<String>,
}

impl CollectionSpec {
    pub fn new(name: &str) -> Self {
        CollectionSpec {
            name: name.to_string(),
            index_keys: Vec::new(),
        }
    }

    pub fn with_index(mut self, field: &str) -> Self {
        self.index_keys.push(field.to_string());
        self
    }

    pub fn with_indexes<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.index_keys.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Declared keys in declaration order, without repeats.
    pub(crate) fn unique_index_keys(&self) -> Vec<String> {
        self.index_keys.iter().unique().cloned().collect()
    }
}

/// A named group of collections.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

struct DatabaseInner {
    name: String,
    collections: RwLock<IndexMap<String, Collection>>,
    config: RwLock<BTreeMap<String, String>>,
    deleted: AtomicBool,
}

impl Database {
    pub(crate) fn new(name: &str, schema_version: u32) -> Self {
        let mut config = BTreeMap::new();
        config.insert(SCHEMA_VERSION_KEY.to_string(), schema_version.to_string());
        Self::with_config(name, config)
    }

    pub(crate) fn from_meta(meta: &DatabaseMeta) -> Self {
        Self::with_config(&meta.name, meta.config.clone())
    }

    fn with_config(name: &str, config: BTreeMap<String, String>) -> Self {
        Database {
            inner: Arc::new(DatabaseInner {
                name: name.to_string(),
                collections: RwLock::new(IndexMap::new()),
                config: RwLock::new(config),
                deleted: AtomicBool::new(false),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn collection(&self, name: &str) -> Option<Collection> {
        self.inner.collections.read().get(name).cloned()
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.inner.collections.read().contains_key(name)
    }

    /// Live collection names in creation order.
    pub fn collection_names(&self) -> Vec<String> {
        self.inner.collections.read().keys().cloned().collect()
    }

    pub fn collections(&self) -> Vec<Collection> {
        self.inner.collections.read().values().cloned().collect()
    }

    pub fn config(&self) -> BTreeMap<String, String> {
        self.inner.config.read().clone()
    }

    pub fn schema_version(&self) -> Option<u32> {
        self.inner
            .config
            .read()
            .get(SCHEMA_VERSION_KEY)
            .and_then(|v| v.parse().ok())
    }

    pub fn is_deleted(&self) -> bool {
        self.inner.deleted.load(Ordering::Acquire)
    }

    pub(crate) fn mark_deleted(&self) {
        self.inner.deleted.store(true, Ordering::Release);
    }

    pub(crate) fn add_collection(&self, collection: Collection) {
        self.inner
            .collections
            .write()
            .insert(collection.name().to_string(), collection);
    }

    pub(crate) fn remove_collection(&self, name: &str) -> Option<Collection> {
        self.inner.collections.write().shift_remove(name)
    }

    pub(crate) fn meta(&self) -> DatabaseMeta {
        DatabaseMeta {
            name: self.inner.name.clone(),
            config: self.config(),
            collections: self.collection_names(),
            deleted: self.is_deleted(),
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.inner.name)
            .field("collections", &self.collection_names())
            .field("deleted", &self.is_deleted())
            .finish()
    }
}
