use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::collection::{BatchId, CollectionStore, Document};
use crate::errors::{DocketError, DocketResult, ErrorKind};
use crate::filter::{FilterExecutor, FilterSpec};
use crate::store::Storage;

/// Point-in-time counters of a collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionStats {
    pub collection_name: String,
    pub index_keys: Vec<String>,
    pub document_count: usize,
    pub batch_count: usize,
    pub dirty_batches: usize,
    pub last_index: u64,
}

/// Outcome of flushing one collection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub batches_written: usize,
    pub batches_failed: usize,
}

/// Handle to a live collection.
///
/// Cloning is cheap and every clone refers to the same state. Mutations are
/// only issued by the collection's worker, reads and filters may run from
/// any thread concurrently with it.
#[derive(Clone)]
pub struct Collection {
    inner: Arc<CollectionInner>,
}

struct CollectionInner {
    database: String,
    name: String,
    store: RwLock<CollectionStore>,
    executor: FilterExecutor,
    deleted: AtomicBool,
    stopped: AtomicBool,
}

impl Collection {
    pub(crate) fn new(
        database: &str,
        name: &str,
        index_keys: &[String],
        batch_size: usize,
        executor: FilterExecutor,
    ) -> Self {
        Self::from_store(database, CollectionStore::new(name, index_keys, batch_size), executor)
    }

    pub(crate) fn from_store(database: &str, store: CollectionStore, executor: FilterExecutor) -> Self {
        let name = store.name().to_string();
        Collection {
            inner: Arc::new(CollectionInner {
                database: database.to_string(),
                name,
                store: RwLock::new(store),
                executor,
                deleted: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn database(&self) -> &str {
        &self.inner.database
    }

    pub fn index_keys(&self) -> Vec<String> {
        self.inner.store.read().index_keys()
    }

    pub fn len(&self) -> usize {
        self.inner.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn create(&self, document: Document) -> Document {
        self.inner.store.write().create(document)
    }

    pub(crate) fn update(&self, id: &str, changes: &Document) -> DocketResult<Document> {
        self.inner.store.write().update(id, changes)
    }

    pub(crate) fn delete(&self, id: &str) -> DocketResult<Document> {
        self.inner.store.write().delete(id)
    }

    pub fn read(&self, id: &str) -> DocketResult<Document> {
        self.inner.store.read().get(id).cloned().ok_or_else(|| {
            DocketError::new(
                &format!("Document {} not found in collection {}", id, self.inner.name),
                ErrorKind::NotFound,
            )
        })
    }

    /// Every document, ordered by `index`.
    pub fn all_documents(&self) -> Vec<Document> {
        let mut documents: Vec<Document> = self.inner.store.read().documents().cloned().collect();
        documents.sort_by_key(|doc| doc.index().unwrap_or_default());
        documents
    }

    /// Candidates are copied out under the read lock. The residual scan runs
    /// after the lock is released, so it never holds up the worker.
    pub fn filter(&self, spec: &FilterSpec) -> DocketResult<Vec<Document>> {
        let plan = self.inner.executor.plan(&self.inner.store.read(), spec)?;
        Ok(self.inner.executor.run(plan))
    }

    pub fn stats(&self) -> CollectionStats {
        let store = self.inner.store.read();
        CollectionStats {
            collection_name: self.inner.name.clone(),
            index_keys: store.index_keys(),
            document_count: store.len(),
            batch_count: store.batch_count(),
            dirty_batches: store.dirty_batch_count(),
            last_index: store.last_index(),
        }
    }

    pub(crate) fn clear(&self) {
        self.inner.store.write().clear();
    }

    pub fn is_deleted(&self) -> bool {
        self.inner.deleted.load(Ordering::Acquire)
    }

    pub(crate) fn mark_deleted(&self) {
        self.inner.deleted.store(true, Ordering::Release);
    }

    /// Whether the worker of this collection has processed a stop event.
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    pub(crate) fn mark_stopped(&self) {
        self.inner.stopped.store(true, Ordering::Release);
    }

    /// Writes the collection metadata record.
    pub(crate) fn write_meta(&self, storage: &Storage) -> DocketResult<()> {
        let (meta, revision) = {
            let store = self.inner.store.read();
            (store.meta(self.is_deleted()), store.meta_revision())
        };
        storage.write_collection_meta(&self.inner.database, &meta)?;
        self.inner.store.write().mark_meta_persisted(revision);
        Ok(())
    }

    /// Writes every dirty batch and then the metadata record.
    ///
    /// The dirty state is snapshotted under the read lock and written without
    /// holding any lock. A batch or metadata record that fails to write stays
    /// dirty so the next flush retries it. Deleted collections are skipped.
    pub(crate) fn flush(&self, storage: &Storage) -> DocketResult<FlushReport> {
        if self.is_deleted() {
            log::debug!("Skipping flush of deleted collection {}/{}", self.database(), self.name());
            return Ok(FlushReport::default());
        }

        let snapshot = self.inner.store.read().snapshot(false);
        if snapshot.batches.is_empty() && !snapshot.meta_dirty {
            return Ok(FlushReport::default());
        }

        let mut report = FlushReport::default();
        let mut persisted: Vec<(BatchId, u64)> = Vec::with_capacity(snapshot.batches.len());
        let mut first_error = None;

        for (batch_id, revision, record) in &snapshot.batches {
            match storage.write_batch(&self.inner.database, &self.inner.name, record) {
                Ok(()) => {
                    report.batches_written += 1;
                    persisted.push((*batch_id, *revision));
                }
                Err(err) => {
                    log::error!(
                        "Failed to flush batch {} of {}/{}: {}",
                        batch_id,
                        self.inner.database,
                        self.inner.name,
                        err
                    );
                    report.batches_failed += 1;
                    first_error.get_or_insert(err);
                }
            }
        }

        let meta_written = match storage.write_collection_meta(&self.inner.database, &snapshot.meta) {
            Ok(()) => true,
            Err(err) => {
                log::error!(
                    "Failed to write metadata of {}/{}: {}",
                    self.inner.database,
                    self.inner.name,
                    err
                );
                first_error.get_or_insert(err);
                false
            }
        };

        {
            let mut store = self.inner.store.write();
            store.mark_persisted(&persisted);
            if meta_written {
                store.mark_meta_persisted(snapshot.meta_revision);
            }
        }
        log::debug!(
            "Flushed {}/{}: {} batches written, {} failed",
            self.inner.database,
            self.inner.name,
            report.batches_written,
            report.batches_failed
        );

        match first_error {
            None => Ok(report),
            Some(err) => Err(DocketError::new_with_cause(
                &format!(
                    "Flush of {}/{} incomplete, {} of {} batches failed",
                    self.inner.database,
                    self.inner.name,
                    report.batches_failed,
                    snapshot.batches.len()
                ),
                ErrorKind::WriteFailure,
                err,
            )),
        }
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("database", &self.inner.database)
            .field("name", &self.inner.name)
            .field("deleted", &self.is_deleted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Value, COLLECTION_META_FILE};
    use crate::doc;
    use crate::store::MemoryStorage;

    fn collection(batch_size: usize) -> Collection {
        Collection::new(
            "hr",
            "employees",
            &["city".to_string()],
            batch_size,
            FilterExecutor::default(),
        )
    }

    #[test]
    fn read_returns_copy() {
        let collection = collection(10);
        let created = collection.create(doc! { "name": "A" });
        let id = created.id().unwrap();

        let mut copy = collection.read(id).unwrap();
        copy.put("name", "changed");
        assert_eq!(collection.read(id).unwrap().get("name"), Some(&Value::from("A")));
    }

    #[test]
    fn read_missing_is_not_found() {
        let err = collection(10).read("missing").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::NotFound);
    }

    #[test]
    fn all_documents_are_index_ordered() {
        let collection = collection(2);
        for i in 0..5 {
            collection.create(doc! { "n": i });
        }
        let indexes: Vec<u64> = collection
            .all_documents()
            .iter()
            .filter_map(Document::index)
            .collect();
        assert_eq!(indexes, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn stats_reflect_state() {
        let collection = collection(2);
        for i in 0..3 {
            collection.create(doc! { "n": i });
        }
        let stats = collection.stats();
        assert_eq!(stats.collection_name, "employees");
        assert_eq!(stats.index_keys, vec!["city".to_string()]);
        assert_eq!(stats.document_count, 3);
        assert_eq!(stats.batch_count, 2);
        assert_eq!(stats.dirty_batches, 2);
        assert_eq!(stats.last_index, 3);
    }

    #[test]
    fn flush_writes_dirty_batches_once() {
        let storage = Storage::in_memory();
        let collection = collection(2);
        for i in 0..3 {
            collection.create(doc! { "n": i });
        }

        let report = collection.flush(&storage).unwrap();
        assert_eq!(report.batches_written, 2);
        assert_eq!(collection.stats().dirty_batches, 0);

        let report = collection.flush(&storage).unwrap();
        assert_eq!(report, FlushReport::default());

        let files = storage.list_batch_files("hr", "employees").unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn failed_flush_keeps_batches_dirty() {
        let memory = MemoryStorage::new();
        let storage = Storage::with_provider(Arc::new(memory.clone()), Default::default());
        let collection = collection(10);
        collection.create(doc! { "n": 1 });

        memory.set_fail_writes(true);
        let err = collection.flush(&storage).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::WriteFailure);
        assert_eq!(collection.stats().dirty_batches, 1);

        memory.set_fail_writes(false);
        let report = collection.flush(&storage).unwrap();
        assert_eq!(report.batches_written, 1);
        assert_eq!(collection.stats().dirty_batches, 0);
    }

    #[test]
    fn deleted_collection_is_not_flushed() {
        let storage = Storage::in_memory();
        let collection = collection(10);
        collection.create(doc! { "n": 1 });
        collection.mark_deleted();

        assert_eq!(collection.flush(&storage).unwrap(), FlushReport::default());
        assert!(storage.list_batch_files("hr", "employees").unwrap().is_empty());
    }

    #[test]
    fn failed_meta_write_is_retried() {
        let memory = MemoryStorage::new();
        let storage = Storage::with_provider(Arc::new(memory.clone()), Default::default());
        let collection = collection(10);
        collection.create(doc! { "n": 1 });
        collection.create(doc! { "n": 2 });
        collection.flush(&storage).unwrap();

        let third = collection.create(doc! { "n": 3 });
        collection.delete(third.id().unwrap()).unwrap();

        memory.set_fail_writes_to(Some(COLLECTION_META_FILE));
        let err = collection.flush(&storage).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::WriteFailure);
        assert_eq!(storage.read_collection_meta("hr", "employees").unwrap().last_index, 2);

        memory.set_fail_writes_to(None);
        collection.flush(&storage).unwrap();
        let meta = storage.read_collection_meta("hr", "employees").unwrap();
        assert_eq!(meta.last_index, 3);
        assert_eq!(collection.flush(&storage).unwrap(), FlushReport::default());

        let records = storage
            .list_batch_files("hr", "employees")
            .unwrap()
            .iter()
            .map(|file| storage.read_batch(file).unwrap())
            .collect();
        let mut restored = CollectionStore::restore(&meta, records, 10);
        assert_eq!(restored.create(doc! { "n": 4 }).index(), Some(4));
    }
}
