use std::collections::HashMap;
use std::fmt::Display;

use uuid::Uuid;

use crate::collection::Document;

/// Identifier of a batch, also used as its file stem on disk.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct BatchId(Uuid);

impl BatchId {
    pub fn new() -> Self {
        BatchId(Uuid::new_v4())
    }

    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value).ok().map(BatchId)
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A bounded group of documents persisted as one unit.
///
/// Every mutation bumps `revision`. A flush records the revision it wrote
/// in `persisted_revision`, so a batch modified while its snapshot was on the
/// way to disk stays dirty.
#[derive(Clone, Debug)]
pub(crate) struct Batch {
    id: BatchId,
    documents: HashMap<String, Document>,
    revision: u64,
    persisted_revision: u64,
}

impl Batch {
    pub(crate) fn new(id: BatchId) -> Self {
        Batch {
            id,
            documents: HashMap::new(),
            revision: 0,
            persisted_revision: 0,
        }
    }

    /// A batch read back from storage, clean until modified.
    pub(crate) fn restored(id: BatchId, documents: HashMap<String, Document>) -> Self {
        Batch {
            id,
            documents,
            revision: 0,
            persisted_revision: 0,
        }
    }

    pub(crate) fn id(&self) -> BatchId {
        self.id
    }

    pub(crate) fn len(&self) -> usize {
        self.documents.len()
    }

    pub(crate) fn get(&self, id: &str) -> Option<&Document> {
        self.documents.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Document> {
        self.documents.get_mut(id)
    }

    pub(crate) fn insert(&mut self, id: String, document: Document) -> Option<Document> {
        self.touch();
        self.documents.insert(id, document)
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<Document> {
        let removed = self.documents.remove(id);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    pub(crate) fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.values()
    }

    pub(crate) fn touch(&mut self) {
        self.revision += 1;
    }

    pub(crate) fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.revision != self.persisted_revision
    }

    /// Records that the state at `revision` reached storage.
    pub(crate) fn mark_persisted(&mut self, revision: u64) {
        if revision > self.persisted_revision {
            self.persisted_revision = revision;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn batch_id_parse_round_trip() {
        let id = BatchId::new();
        assert_eq!(BatchId::parse(&id.to_string()), Some(id));
        assert!(BatchId::parse("not-a-uuid").is_none());
    }

    #[test]
    fn new_batch_is_clean() {
        let batch = Batch::new(BatchId::new());
        assert!(!batch.is_dirty());
        assert_eq!(batch.len(), 0);
    }

    #[test]
    fn mutations_mark_dirty() {
        let mut batch = Batch::new(BatchId::new());
        batch.insert("a".to_string(), doc! { "x": 1 });
        assert!(batch.is_dirty());

        let revision = batch.revision();
        batch.mark_persisted(revision);
        assert!(!batch.is_dirty());

        // removing a missing document changes nothing
        assert!(batch.remove("missing").is_none());
        assert!(!batch.is_dirty());

        assert!(batch.remove("a").is_some());
        assert!(batch.is_dirty());
    }

    #[test]
    fn change_during_flush_keeps_batch_dirty() {
        let mut batch = Batch::new(BatchId::new());
        batch.insert("a".to_string(), doc! { "x": 1 });
        let snapshot_revision = batch.revision();

        batch.insert("b".to_string(), doc! { "x": 2 });
        batch.mark_persisted(snapshot_revision);
        assert!(batch.is_dirty());
    }
}
