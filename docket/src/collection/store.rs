use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::collection::doc_id::{created_timestamp, resolve_id};
use crate::collection::{Batch, BatchId, Document, SecondaryIndex};
use crate::common::DOC_ID;
use crate::errors::{DocketError, DocketResult, ErrorKind};
use crate::store::{BatchRecord, CollectionMeta};

/// Dirty state of a collection captured for a flush.
#[derive(Debug, Clone)]
pub(crate) struct FlushSnapshot {
    pub(crate) meta: CollectionMeta,
    pub(crate) meta_revision: u64,
    pub(crate) meta_dirty: bool,
    /// Dirty batches with the revision each record was taken at.
    pub(crate) batches: Vec<(BatchId, u64, BatchRecord)>,
}

/// In-memory state of one collection: batches of documents, a locator from
/// id to batch, the secondary index and the index counter.
///
/// Not synchronized. [crate::collection::Collection] wraps it in a lock and
/// only the collection worker takes that lock for writing.
///
/// The metadata record carries its own revision pair, bumped whenever the
/// counter or the current batch moves, the same way [Batch] tracks its
/// documents.
#[derive(Debug)]
pub(crate) struct CollectionStore {
    name: String,
    batch_size: usize,
    batches: IndexMap<BatchId, Batch>,
    current_batch: Option<BatchId>,
    locator: HashMap<String, BatchId>,
    index: SecondaryIndex,
    last_index: u64,
    meta_revision: u64,
    persisted_meta_revision: u64,
}

impl CollectionStore {
    pub(crate) fn new(name: &str, index_keys: &[String], batch_size: usize) -> Self {
        CollectionStore {
            name: name.to_string(),
            batch_size: batch_size.max(1),
            batches: IndexMap::new(),
            current_batch: None,
            locator: HashMap::new(),
            index: SecondaryIndex::new(index_keys.iter().cloned()),
            last_index: 0,
            meta_revision: 0,
            persisted_meta_revision: 0,
        }
    }

    /// Rebuilds the state from persisted records.
    ///
    /// Documents are replayed into the index. The counter resumes from the
    /// larger of the persisted value and the highest loaded `index`, so a
    /// stale metadata record never causes index reuse.
    pub(crate) fn restore(meta: &CollectionMeta, records: Vec<BatchRecord>, batch_size: usize) -> Self {
        let mut store = CollectionStore::new(&meta.name, &meta.index_keys, batch_size);
        let mut max_index = meta.last_index;

        // an id found in several batches keeps the copy with the highest index
        let mut loaded: Vec<(BatchId, HashMap<String, Document>)> = Vec::with_capacity(records.len());
        let mut owners: HashMap<String, usize> = HashMap::new();
        let mut stale: HashSet<usize> = HashSet::new();

        for record in records {
            let Some(batch_id) = BatchId::parse(&record.batch_id) else {
                log::warn!(
                    "Skipping batch with malformed id '{}' in collection {}",
                    record.batch_id,
                    meta.name
                );
                continue;
            };

            let slot = loaded.len();
            loaded.push((batch_id, HashMap::with_capacity(record.documents.len())));
            for document in record.documents {
                let Some(id) = document.id().map(str::to_string) else {
                    log::warn!("Skipping document without id in batch {}", batch_id);
                    continue;
                };
                let index = document.index().unwrap_or_default();
                max_index = max_index.max(index);

                if let Some(&owner) = owners.get(&id) {
                    let kept = loaded[owner].1.get(&id).and_then(Document::index).unwrap_or_default();
                    if kept >= index {
                        log::warn!("Dropping stale copy of document {} in batch {}", id, batch_id);
                        stale.insert(slot);
                        continue;
                    }
                    log::warn!("Dropping stale copy of document {} in batch {}", id, loaded[owner].0);
                    loaded[owner].1.remove(&id);
                    stale.insert(owner);
                }
                owners.insert(id.clone(), slot);
                loaded[slot].1.insert(id, document);
            }
        }

        for (slot, (batch_id, documents)) in loaded.into_iter().enumerate() {
            for (id, document) in &documents {
                store.index.on_create(id, document);
                store.locator.insert(id.clone(), batch_id);
            }
            let mut batch = Batch::restored(batch_id, documents);
            if stale.contains(&slot) {
                // rewritten on the next flush without the dropped copy
                batch.touch();
            }
            store.batches.insert(batch_id, batch);
        }

        store.current_batch = meta
            .current_batch
            .as_deref()
            .and_then(BatchId::parse)
            .filter(|id| store.batches.contains_key(id));
        store.last_index = max_index;
        if store.last_index != meta.last_index {
            store.touch_meta();
        }

        log::debug!(
            "Restored collection {} with {} documents in {} batches, last index {}",
            meta.name,
            store.locator.len(),
            store.batches.len(),
            store.last_index
        );
        store
    }

    /// Stores a new document and returns it with its reserved fields set.
    ///
    /// A document whose id is already present replaces the old one.
    pub(crate) fn create(&mut self, mut document: Document) -> Document {
        let id = resolve_id(document.get(DOC_ID));
        if self.locator.contains_key(&id) {
            log::warn!("Document {} already exists in {}, replacing it", id, self.name);
            self.remove_document(&id);
        }

        self.last_index += 1;
        self.touch_meta();
        document.set_id(&id);
        document.set_index(self.last_index);
        document.set_created(&created_timestamp(&id));

        let batch_id = self.writable_batch();
        self.index.on_create(&id, &document);
        self.locator.insert(id.clone(), batch_id);
        if let Some(batch) = self.batches.get_mut(&batch_id) {
            batch.insert(id, document.clone());
        }
        document
    }

    /// Shallow merges `changes` into the document stored under `id`.
    /// Reserved fields in `changes` are ignored.
    pub(crate) fn update(&mut self, id: &str, changes: &Document) -> DocketResult<Document> {
        let batch_id = self.locate(id)?;
        let changes = changes.without_reserved();

        let batch = self
            .batches
            .get_mut(&batch_id)
            .ok_or_else(|| dangling_locator(id, &batch_id))?;
        let document = batch
            .get_mut(id)
            .ok_or_else(|| dangling_locator(id, &batch_id))?;

        let old = document.clone();
        document.merge(&changes);
        let updated = document.clone();
        batch.touch();

        self.index.on_update(id, &old, &updated);
        Ok(updated)
    }

    pub(crate) fn delete(&mut self, id: &str) -> DocketResult<Document> {
        self.locate(id)?;
        self.remove_document(id)
            .ok_or_else(|| DocketError::new(&format!("Document {} not found", id), ErrorKind::NotFound))
    }

    pub(crate) fn get(&self, id: &str) -> Option<&Document> {
        let batch_id = self.locator.get(id)?;
        self.batches.get(batch_id)?.get(id)
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn documents(&self) -> impl Iterator<Item = &Document> {
        self.batches.values().flat_map(Batch::documents)
    }

    pub(crate) fn batches(&self) -> impl Iterator<Item = &Batch> {
        self.batches.values()
    }

    pub(crate) fn index(&self) -> &SecondaryIndex {
        &self.index
    }

    pub(crate) fn len(&self) -> usize {
        self.locator.len()
    }

    pub(crate) fn batch_count(&self) -> usize {
        self.batches.len()
    }

    pub(crate) fn dirty_batch_count(&self) -> usize {
        self.batches.values().filter(|b| b.is_dirty()).count()
    }

    pub(crate) fn last_index(&self) -> u64 {
        self.last_index
    }

    pub(crate) fn index_keys(&self) -> Vec<String> {
        self.index.keys().cloned().collect()
    }

    /// Drops every document and index entry. The counter is kept.
    pub(crate) fn clear(&mut self) {
        self.batches.clear();
        self.locator.clear();
        self.index.clear();
        self.current_batch = None;
        self.touch_meta();
    }

    pub(crate) fn meta(&self, deleted: bool) -> CollectionMeta {
        CollectionMeta {
            name: self.name.clone(),
            index_keys: self.index_keys(),
            last_index: self.last_index,
            current_batch: self.current_batch.map(|id| id.to_string()),
            deleted,
        }
    }

    /// Captures every dirty batch. Clean batches are left out.
    pub(crate) fn snapshot(&self, deleted: bool) -> FlushSnapshot {
        let batches = self
            .batches
            .values()
            .filter(|batch| batch.is_dirty())
            .map(|batch| {
                let record = BatchRecord {
                    batch_id: batch.id().to_string(),
                    documents: batch.documents().cloned().collect(),
                };
                (batch.id(), batch.revision(), record)
            })
            .collect();

        FlushSnapshot {
            meta: self.meta(deleted),
            meta_revision: self.meta_revision,
            meta_dirty: self.is_meta_dirty(),
            batches,
        }
    }

    /// Clears the dirty flag of batches unchanged since their snapshot.
    pub(crate) fn mark_persisted(&mut self, persisted: &[(BatchId, u64)]) {
        for (batch_id, revision) in persisted {
            if let Some(batch) = self.batches.get_mut(batch_id) {
                batch.mark_persisted(*revision);
            }
        }
    }

    pub(crate) fn meta_revision(&self) -> u64 {
        self.meta_revision
    }

    pub(crate) fn is_meta_dirty(&self) -> bool {
        self.meta_revision != self.persisted_meta_revision
    }

    pub(crate) fn mark_meta_persisted(&mut self, revision: u64) {
        self.persisted_meta_revision = self.persisted_meta_revision.max(revision);
    }

    fn touch_meta(&mut self) {
        self.meta_revision += 1;
    }

    fn locate(&self, id: &str) -> DocketResult<BatchId> {
        self.locator.get(id).copied().ok_or_else(|| {
            DocketError::new(
                &format!("Document {} not found in collection {}", id, self.name),
                ErrorKind::NotFound,
            )
        })
    }

    fn remove_document(&mut self, id: &str) -> Option<Document> {
        let batch_id = self.locator.remove(id)?;
        let removed = self.batches.get_mut(&batch_id)?.remove(id)?;
        self.index.on_delete(id, &removed);
        Some(removed)
    }

    fn writable_batch(&mut self) -> BatchId {
        if let Some(current) = self.current_batch {
            if self
                .batches
                .get(&current)
                .is_some_and(|batch| batch.len() < self.batch_size)
            {
                return current;
            }
        }

        let batch_id = BatchId::new();
        log::debug!("Collection {} rolled over to batch {}", self.name, batch_id);
        self.batches.insert(batch_id, Batch::new(batch_id));
        self.current_batch = Some(batch_id);
        batch_id
    }
}

fn dangling_locator(id: &str, batch_id: &BatchId) -> DocketError {
    log::error!("Document {} points at missing batch {}", id, batch_id);
    DocketError::new(
        &format!("Document {} points at missing batch {}", id, batch_id),
        ErrorKind::InternalError,
    )
}
