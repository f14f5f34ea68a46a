use std::collections::BTreeMap;

use crate::collection::Document;
use crate::common::Value;
use crate::errors::{DocketError, DocketResult, ErrorKind};

/// A conjunction of field equality conditions with a result limit.
///
/// Operands are compared by their canonical key (see [Value::index_key]), so
/// `60000`, `60000.0` and `"60000"` are equal. Only scalar operands are
/// accepted. An invalid operand is remembered and reported as
/// [ErrorKind::InvalidFilter] when the filter is executed.
///
/// ```rust,ignore
/// let filter = FilterSpec::new()
///     .eq("city", "Chennai")
///     .eq("salary", 60000)
///     .with_limit(10);
/// ```
#[derive(Clone, Debug, Default)]
pub struct FilterSpec {
    conditions: BTreeMap<String, String>,
    limit: Option<usize>,
    error: Option<DocketError>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a filter from a document of `field: value` pairs.
    pub fn from_document(document: &Document) -> DocketResult<Self> {
        let spec = document
            .iter()
            .fold(FilterSpec::new(), |spec, (field, value)| spec.eq(field, value.clone()));
        spec.validate()?;
        Ok(spec)
    }

    /// Adds the condition `field == value`. A later condition on the same
    /// field replaces the earlier one.
    pub fn eq<V: Into<Value>>(mut self, field: &str, value: V) -> Self {
        let value = value.into();
        if !value.is_scalar() {
            self.error.get_or_insert_with(|| {
                DocketError::new(
                    &format!("Filter value for '{}' must be a scalar, found {}", field, value),
                    ErrorKind::InvalidFilter,
                )
            });
            return self;
        }
        self.conditions.insert(field.to_string(), value.index_key());
        self
    }

    /// Caps the number of returned documents. Zero selects the default limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = if limit == 0 { None } else { Some(limit) };
        self
    }

    pub fn conditions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.conditions.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn validate(&self) -> DocketResult<()> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Whether `document` satisfies every condition.
    pub fn matches(&self, document: &Document) -> bool {
        self.conditions.iter().all(|(field, key)| {
            document
                .get(field)
                .is_some_and(|value| value.index_key() == *key)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn matches_all_conditions() {
        let filter = FilterSpec::new().eq("city", "Chennai").eq("salary", 60000);
        assert!(filter.matches(&doc! { "city": "Chennai", "salary": 60000, "x": 1 }));
        assert!(!filter.matches(&doc! { "city": "Chennai", "salary": 50000 }));
        assert!(!filter.matches(&doc! { "city": "Chennai" }));
    }

    #[test]
    fn numeric_equality_is_type_insensitive() {
        let filter = FilterSpec::new().eq("salary", "60000");
        assert!(filter.matches(&doc! { "salary": 60000 }));
        assert!(filter.matches(&doc! { "salary": 60000.0 }));
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = FilterSpec::new();
        assert!(filter.is_empty());
        assert!(filter.matches(&doc! { "a": 1 }));
        assert!(filter.matches(&Document::new()));
    }

    #[test]
    fn non_scalar_operand_is_rejected() {
        let filter = FilterSpec::new().eq("address", doc! { "city": "Chennai" });
        let err = filter.validate().unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidFilter);

        let err = FilterSpec::from_document(&doc! { "tags": ["a"] }).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidFilter);
    }

    #[test]
    fn from_document_builds_conditions() {
        let filter = FilterSpec::from_document(&doc! { "city": "Pune", "age": 30 }).unwrap();
        let conditions: Vec<(&str, &str)> = filter.conditions().collect();
        assert_eq!(conditions, vec![("age", "30"), ("city", "Pune")]);
    }

    #[test]
    fn zero_limit_means_default() {
        assert_eq!(FilterSpec::new().with_limit(0).limit(), None);
        assert_eq!(FilterSpec::new().with_limit(5).limit(), Some(5));
    }
}
