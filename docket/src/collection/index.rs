use std::collections::{HashMap, HashSet};

use indexmap::IndexSet;

use crate::collection::Document;

type Bucket = HashSet<String>;
type Entries = HashMap<String, HashMap<String, Bucket>>;

/// Equality index over a fixed set of top level fields.
///
/// For every declared field it maps the canonical key of a value
/// (see [crate::common::Value::index_key]) to the ids of the documents
/// holding that value. Empty buckets and empty fields are dropped so the
/// structure never grows with deleted data.
#[derive(Clone, Debug, Default)]
pub(crate) struct SecondaryIndex {
    keys: IndexSet<String>,
    entries: Entries,
}

impl SecondaryIndex {
    pub(crate) fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SecondaryIndex {
            keys: keys.into_iter().map(Into::into).collect(),
            entries: HashMap::new(),
        }
    }

    pub(crate) fn keys(&self) -> impl Iterator<Item = &String> {
        self.keys.iter()
    }

    pub(crate) fn is_indexed(&self, field: &str) -> bool {
        self.keys.contains(field)
    }

    pub(crate) fn on_create(&mut self, id: &str, document: &Document) {
        for field in self.keys.iter() {
            if let Some(value) = document.get(field) {
                insert(&mut self.entries, field, value.index_key(), id);
            }
        }
    }

    /// Moves `id` between buckets for every declared field whose key changed.
    /// A declared field absent before and present now is indexed for the
    /// first time, one removed by the update is dropped.
    pub(crate) fn on_update(&mut self, id: &str, old: &Document, new: &Document) {
        for field in self.keys.iter() {
            let old_key = old.get(field).map(|v| v.index_key());
            let new_key = new.get(field).map(|v| v.index_key());
            if old_key == new_key {
                continue;
            }
            if let Some(key) = old_key {
                remove(&mut self.entries, field, &key, id);
            }
            if let Some(key) = new_key {
                insert(&mut self.entries, field, key, id);
            }
        }
    }

    pub(crate) fn on_delete(&mut self, id: &str, document: &Document) {
        for field in self.keys.iter() {
            if let Some(value) = document.get(field) {
                remove(&mut self.entries, field, &value.index_key(), id);
            }
        }
    }

    pub(crate) fn bucket(&self, field: &str, key: &str) -> Option<&Bucket> {
        self.entries.get(field).and_then(|values| values.get(key))
    }

    /// Number of distinct keys held for `field`.
    pub(crate) fn cardinality(&self, field: &str) -> usize {
        self.entries.get(field).map_or(0, HashMap::len)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

fn insert(entries: &mut Entries, field: &str, key: String, id: &str) {
    entries
        .entry(field.to_string())
        .or_default()
        .entry(key)
        .or_default()
        .insert(id.to_string());
}

fn remove(entries: &mut Entries, field: &str, key: &str, id: &str) {
    let Some(values) = entries.get_mut(field) else {
        return;
    };
    if let Some(bucket) = values.get_mut(key) {
        bucket.remove(id);
        if bucket.is_empty() {
            values.remove(key);
        }
    }
    if values.is_empty() {
        entries.remove(field);
    }
}
