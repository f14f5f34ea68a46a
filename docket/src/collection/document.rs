use im::OrdMap;
use smallvec::SmallVec;

use crate::common::{write_json_string, Value, DOC_CREATED, DOC_ID, DOC_INDEX, RESERVED_FIELDS};
use std::fmt::{Debug, Display};

type FieldVec = SmallVec<[String; 8]>;

/// A schemaless document: a mapping from field name to [Value].
///
/// The store owns three reserved fields:
///
/// * `id` - globally unique identifier, generated on create if absent.
/// * `index` - per-collection sequence number assigned on create.
/// * `created` - RFC 3339 creation time derived from the id.
///
/// Documents are backed by `im::OrdMap`, so cloning one for a reader is O(1)
/// and does not copy field data.
#[derive(Clone, PartialEq, Default, serde::Deserialize, serde::Serialize)]
pub struct Document {
    data: OrdMap<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Document {
            data: OrdMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Associates `value` with `key`, replacing any previous value.
    pub fn put<T: Into<Value>>(&mut self, key: &str, value: T) {
        self.data.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Top level field names in key order.
    pub fn fields(&self) -> FieldVec {
        self.data.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter()
    }

    /// Shallow merge: every field of `other` overwrites the field of the same
    /// name here, fields only present here are kept.
    pub fn merge(&mut self, other: &Document) {
        for (key, value) in other.data.iter() {
            self.data.insert(key.clone(), value.clone());
        }
    }

    /// The document id, if one has been assigned.
    pub fn id(&self) -> Option<&str> {
        self.data.get(DOC_ID).and_then(Value::as_str)
    }

    /// The per-collection sequence number, if one has been assigned.
    pub fn index(&self) -> Option<u64> {
        self.data
            .get(DOC_INDEX)
            .and_then(Value::as_i64)
            .and_then(|v| u64::try_from(v).ok())
    }

    pub fn created(&self) -> Option<&str> {
        self.data.get(DOC_CREATED).and_then(Value::as_str)
    }

    pub(crate) fn set_id(&mut self, id: &str) {
        self.data.insert(DOC_ID.to_string(), Value::String(id.to_string()));
    }

    pub(crate) fn set_index(&mut self, index: u64) {
        self.data.insert(DOC_INDEX.to_string(), Value::from(index));
    }

    pub(crate) fn set_created(&mut self, created: &str) {
        self.data
            .insert(DOC_CREATED.to_string(), Value::String(created.to_string()));
    }

    /// Returns a copy without the store-managed fields.
    pub fn without_reserved(&self) -> Document {
        let mut data = self.data.clone();
        for field in RESERVED_FIELDS {
            data.remove(field);
        }
        Document { data }
    }

    pub fn to_json(&self) -> String {
        let mut out = String::new();
        self.write_json(&mut out);
        out
    }

    pub(crate) fn write_json(&self, out: &mut String) {
        out.push('{');
        for (i, (key, value)) in self.data.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            write_json_string(key, out);
            out.push(':');
            value.write_json(out);
        }
        out.push('}');
    }
}

impl Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl Display for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Document {
            data: iter.into_iter().collect(),
        }
    }
}

/// Strips the quotes `stringify!` leaves around string literal keys.
#[doc(hidden)]
pub fn normalize(key: &str) -> String {
    key.trim_matches('"').to_string()
}

/// Creates a [Document] from key value pairs.
///
/// ```rust,ignore
/// let doc = doc!{
///     "name": "Alice",
///     "city": "Chennai",
///     "address": { "zip": 600001 },
///     "tags": ["a", "b"]
/// };
/// ```
#[macro_export]
macro_rules! doc {
    () => {
        $crate::collection::Document::new()
    };

    ({}) => {
        $crate::collection::Document::new()
    };

    ($($key:tt : $value:tt),* $(,)?) => {
        {
            let mut doc = $crate::collection::Document::new();
            $(
                doc.put(&$crate::collection::normalize(stringify!($key)), $crate::doc_value!($value));
            )*
            doc
        }
    };
}

/// Helper macro to convert values for the doc! macro.
#[macro_export]
macro_rules! doc_value {
    ({ $($key:tt : $value:tt),* $(,)? }) => {
        $crate::common::Value::Document($crate::doc!{ $($key : $value),* })
    };

    ([ $($value:tt),* $(,)? ]) => {
        $crate::common::Value::Array(vec![$($crate::doc_value!($value)),*])
    };

    ($value:expr) => {
        $crate::common::Value::from($value)
    };
}
