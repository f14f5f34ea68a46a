use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use crate::collection::{Collection, CollectionStore};
use crate::common::validate_name;
use crate::docket_config::DocketConfig;
use crate::errors::{DocketError, DocketResult, ErrorKind};
use crate::pipeline::CollectionResolver;
use crate::registry::{CollectionSpec, Database};
use crate::store::{BatchRecord, Storage};

/// Registry of live databases and their collections.
///
/// Administrative changes are serialized and persisted before they become
/// visible. Lookups only take a read lock.
#[derive(Clone)]
pub struct Catalog {
    inner: Arc<CatalogInner>,
}

struct CatalogInner {
    databases: RwLock<IndexMap<String, Database>>,
    admin: Mutex<()>,
    storage: Storage,
    config: DocketConfig,
}

impl Catalog {
    pub(crate) fn new(storage: Storage, config: DocketConfig) -> Self {
        Catalog {
            inner: Arc::new(CatalogInner {
                databases: RwLock::new(IndexMap::new()),
                admin: Mutex::new(()),
                storage,
                config,
            }),
        }
    }

    /// Rebuilds the registry from storage.
    ///
    /// Tombstoned databases and collections are skipped. A record that fails
    /// to decode is logged and skipped, it never aborts the load.
    pub(crate) fn load(&self) -> DocketResult<()> {
        let _admin = self.inner.admin.lock();
        let names = self.inner.storage.list_databases()?;
        let mut loaded = IndexMap::with_capacity(names.len());

        for name in names {
            let meta = match self.inner.storage.read_database_meta(&name) {
                Ok(meta) => meta,
                Err(err) => {
                    log::error!("Skipping database {}: {}", name, err);
                    continue;
                }
            };
            if meta.deleted {
                log::debug!("Skipping deleted database {}", name);
                continue;
            }

            let database = Database::from_meta(&meta);
            for collection_name in &meta.collections {
                if let Some(collection) = self.load_collection(&meta.name, collection_name) {
                    database.add_collection(collection);
                }
            }
            log::info!(
                "Loaded database {} with {} collections",
                database.name(),
                database.collection_names().len()
            );
            loaded.insert(meta.name.clone(), database);
        }

        *self.inner.databases.write() = loaded;
        Ok(())
    }

    fn load_collection(&self, database: &str, name: &str) -> Option<Collection> {
        let storage = &self.inner.storage;
        let meta = match storage.read_collection_meta(database, name) {
            Ok(meta) => meta,
            Err(err) => {
                log::error!("Skipping collection {}/{}: {}", database, name, err);
                return None;
            }
        };
        if meta.deleted {
            log::debug!("Skipping deleted collection {}/{}", database, name);
            return None;
        }

        let files = match storage.list_batch_files(database, name) {
            Ok(files) => files,
            Err(err) => {
                log::error!("Cannot list batches of {}/{}: {}", database, name, err);
                Vec::new()
            }
        };

        let records: Vec<BatchRecord> = files
            .iter()
            .filter_map(|path| match storage.read_batch(path) {
                Ok(record) => Some(record),
                Err(err) => {
                    log::warn!("Skipping batch {}: {}", path.display(), err);
                    None
                }
            })
            .collect();

        let store = CollectionStore::restore(&meta, records, self.inner.config.batch_size());
        Some(Collection::from_store(database, store, self.inner.config.filter_executor()))
    }

    pub fn create_database(&self, name: &str) -> DocketResult<Database> {
        validate_name("database", name)?;
        let _admin = self.inner.admin.lock();
        if self.inner.databases.read().contains_key(name) {
            log::error!("Database {} already exists", name);
            return Err(DocketError::new(
                &format!("Database {} already exists", name),
                ErrorKind::AlreadyExists,
            ));
        }

        let database = Database::new(name, self.inner.config.schema_version());
        self.inner.storage.write_database_meta(&database.meta())?;
        self.inner
            .databases
            .write()
            .insert(name.to_string(), database.clone());
        log::info!("Created database {}", name);
        Ok(database)
    }

    /// Removes a database and returns the collections it held, all marked
    /// deleted. Their workers still have to be stopped by the caller.
    pub fn delete_database(&self, name: &str) -> DocketResult<Vec<Collection>> {
        let _admin = self.inner.admin.lock();
        let database = self
            .inner
            .databases
            .write()
            .shift_remove(name)
            .ok_or_else(|| database_not_found(name))?;

        database.mark_deleted();
        let collections = database.collections();
        for collection in &collections {
            collection.mark_deleted();
            self.write_tombstone(collection);
        }
        if let Err(err) = self.inner.storage.write_database_meta(&database.meta()) {
            log::error!("Failed to persist deletion of database {}: {}", name, err);
        }
        log::info!("Deleted database {} with {} collections", name, collections.len());
        Ok(collections)
    }

    pub fn list_databases(&self) -> Vec<String> {
        self.inner.databases.read().keys().cloned().collect()
    }

    pub fn database(&self, name: &str) -> DocketResult<Database> {
        self.inner
            .databases
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| database_not_found(name))
    }

    /// Creates every collection in `specs` or none of them.
    pub fn create_collections(&self, database: &str, specs: &[CollectionSpec]) -> DocketResult<Vec<Collection>> {
        let _admin = self.inner.admin.lock();
        let db = self.database(database)?;

        let mut seen = HashSet::with_capacity(specs.len());
        for spec in specs {
            validate_name("collection", &spec.name)?;
            if db.has_collection(&spec.name) || !seen.insert(spec.name.as_str()) {
                log::error!("Collection {}/{} already exists", database, spec.name);
                return Err(DocketError::new(
                    &format!("Collection {}/{} already exists", database, spec.name),
                    ErrorKind::AlreadyExists,
                ));
            }
        }

        let collections: Vec<Collection> = specs
            .iter()
            .map(|spec| {
                Collection::new(
                    database,
                    &spec.name,
                    &spec.unique_index_keys(),
                    self.inner.config.batch_size(),
                    self.inner.config.filter_executor(),
                )
            })
            .collect();

        for collection in &collections {
            db.add_collection(collection.clone());
        }
        if let Err(err) = self.persist_new_collections(&db, &collections) {
            for collection in &collections {
                db.remove_collection(collection.name());
                if let Err(purge) = self.inner.storage.purge_collection(database, collection.name()) {
                    log::warn!("Failed to clean up {}/{}: {}", database, collection.name(), purge);
                }
            }
            log::error!("Failed to create collections in {}: {}", database, err);
            return Err(err);
        }

        log::info!(
            "Created {} collections in {}: {:?}",
            collections.len(),
            database,
            specs.iter().map(|s| s.name.as_str()).collect::<Vec<_>>()
        );
        Ok(collections)
    }

    fn persist_new_collections(&self, db: &Database, collections: &[Collection]) -> DocketResult<()> {
        for collection in collections {
            collection.write_meta(&self.inner.storage)?;
        }
        self.inner.storage.write_database_meta(&db.meta())
    }

    /// Removes every named collection or none of them, returning the removed
    /// collections marked deleted.
    pub fn delete_collections(&self, database: &str, names: &[&str]) -> DocketResult<Vec<Collection>> {
        let _admin = self.inner.admin.lock();
        let db = self.database(database)?;
        if let Some(missing) = names.iter().find(|name| !db.has_collection(name)) {
            return Err(collection_not_found(database, missing));
        }

        let removed: Vec<Collection> = names
            .iter()
            .filter_map(|name| db.remove_collection(name))
            .collect();
        for collection in &removed {
            collection.mark_deleted();
            self.write_tombstone(collection);
        }
        if let Err(err) = self.inner.storage.write_database_meta(&db.meta()) {
            log::error!("Failed to persist metadata of database {}: {}", database, err);
        }
        log::info!("Deleted {} collections from {}", removed.len(), database);
        Ok(removed)
    }

    pub fn list_collections(&self, database: &str) -> DocketResult<Vec<String>> {
        Ok(self.database(database)?.collection_names())
    }

    pub fn collection(&self, database: &str, name: &str) -> DocketResult<Collection> {
        self.database(database)?
            .collection(name)
            .ok_or_else(|| collection_not_found(database, name))
    }

    /// Every live collection across databases.
    pub fn all_collections(&self) -> Vec<Collection> {
        self.inner
            .databases
            .read()
            .values()
            .flat_map(|db| db.collections())
            .collect()
    }

    /// Rewrites the metadata record of every live database.
    pub fn write_all_metadata(&self) -> DocketResult<()> {
        let databases: Vec<Database> = self.inner.databases.read().values().cloned().collect();
        let mut first_error = None;
        for database in databases {
            if let Err(err) = self.inner.storage.write_database_meta(&database.meta()) {
                log::error!("Failed to write metadata of database {}: {}", database.name(), err);
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn write_tombstone(&self, collection: &Collection) {
        if let Err(err) = collection.write_meta(&self.inner.storage) {
            log::warn!(
                "Failed to persist deletion of {}/{}: {}",
                collection.database(),
                collection.name(),
                err
            );
        }
    }
}

impl CollectionResolver for Catalog {
    fn resolve(&self, database: &str, collection: &str) -> DocketResult<Collection> {
        self.collection(database, collection)
    }
}

fn database_not_found(name: &str) -> DocketError {
    DocketError::new(&format!("Database {} does not exist", name), ErrorKind::DatabaseNotFound)
}

fn collection_not_found(database: &str, name: &str) -> DocketError {
    DocketError::new(
        &format!("Collection {}/{} does not exist", database, name),
        ErrorKind::CollectionNotFound,
    )
}
