use crate::collection::SnowflakeIdGenerator;
use crate::common::{get_current_time_or_zero, millis_to_rfc3339, now_rfc3339, Value};
use crate::ID_GENERATOR;

// generated ids are 19 digit decimals
const MIN_GENERATED_ID: u64 = 1_000_000_000_000_000_000;

/// Generates a new globally unique document id in its decimal string form.
pub fn generate_id() -> String {
    ID_GENERATOR.get_id().to_string()
}

/// Resolves the id a created document will be stored under.
///
/// A caller supplied string is kept verbatim, any other non-null scalar is
/// converted with [Value::index_key]. Missing, null, empty or nested values
/// are replaced by a freshly generated id.
pub(crate) fn resolve_id(supplied: Option<&Value>) -> String {
    match supplied {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(value) if value.is_scalar() && !value.is_null() => value.index_key(),
        _ => generate_id(),
    }
}

/// The creation instant encoded in a generated id.
///
/// Returns `None` when `id` does not look like an id produced by the
/// generator, or when its embedded time lies in the future.
pub fn created_millis(id: &str) -> Option<u64> {
    let raw = id.parse::<u64>().ok()?;
    if raw < MIN_GENERATED_ID {
        return None;
    }
    let millis = SnowflakeIdGenerator::timestamp_of(raw);
    // one minute of slack for clock drift between nodes
    if millis > get_current_time_or_zero() as u64 + 60_000 {
        return None;
    }
    Some(millis)
}

/// The `created` field value for a document stored under `id`.
pub(crate) fn created_timestamp(id: &str) -> String {
    created_millis(id)
        .and_then(millis_to_rfc3339)
        .unwrap_or_else(now_rfc3339)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    #[test]
    fn generated_ids_are_unique_decimals() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 19);
        assert!(a.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn resolve_keeps_supplied_string() {
        assert_eq!(resolve_id(Some(&Value::from("user-1"))), "user-1");
    }

    #[test]
    fn resolve_converts_numbers() {
        assert_eq!(resolve_id(Some(&Value::from(42))), "42");
    }

    #[test]
    fn resolve_generates_when_missing_or_unusable() {
        assert_eq!(resolve_id(None).len(), 19);
        assert_eq!(resolve_id(Some(&Value::Null)).len(), 19);
        assert_eq!(resolve_id(Some(&Value::from(""))).len(), 19);
        assert_eq!(resolve_id(Some(&Value::from(vec![1]))).len(), 19);
    }

    #[test]
    fn created_time_matches_generation_time() {
        let before = get_current_time_or_zero() as u64;
        let id = generate_id();
        let millis = created_millis(&id).unwrap();
        assert!(millis >= before);

        let created = created_timestamp(&id);
        let parsed = DateTime::parse_from_rfc3339(&created).unwrap();
        assert_eq!(parsed.timestamp_millis() as u64, millis);
    }

    #[test]
    fn foreign_ids_have_no_embedded_time() {
        assert!(created_millis("user-1").is_none());
        assert!(created_millis("42").is_none());
        assert!(created_millis(&u64::MAX.to_string()).is_none());

        // falls back to the current time
        let created = created_timestamp("user-1");
        assert!(DateTime::parse_from_rfc3339(&created).is_ok());
    }
}
