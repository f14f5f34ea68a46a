use crate::common::MAX_NAME_LENGTH;
use crate::errors::{DocketError, DocketResult, ErrorKind};
use once_cell::sync::Lazy;
use regex::Regex;

// database and collection names become folder names on disk
static VALID_NAME: Lazy<Option<Regex>> = Lazy::new(|| Regex::new("^[A-Za-z0-9_-]+$").ok());

/// Validates a database or collection name.
///
/// `kind` is only used to build the error message ("database", "collection").
pub fn validate_name(kind: &str, name: &str) -> DocketResult<()> {
    if name.is_empty() {
        log::error!("Empty {} name rejected", kind);
        return Err(DocketError::new(
            &format!("{} name cannot be empty", kind),
            ErrorKind::InvalidName,
        ));
    }

    if name.len() > MAX_NAME_LENGTH {
        log::error!("{} name '{}' is too long", kind, name);
        return Err(DocketError::new(
            &format!("{} name '{}' exceeds {} characters", kind, name, MAX_NAME_LENGTH),
            ErrorKind::InvalidName,
        ));
    }

    let valid = match VALID_NAME.as_ref() {
        Some(pattern) => pattern.is_match(name),
        None => name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
    };

    if !valid {
        log::error!("{} name '{}' contains invalid characters", kind, name);
        return Err(DocketError::new(
            &format!(
                "{} name '{}' may only contain letters, digits, '_' and '-'",
                kind, name
            ),
            ErrorKind::InvalidName,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_names() {
        assert!(validate_name("database", "shop").is_ok());
        assert!(validate_name("collection", "user_profiles-2").is_ok());
    }

    #[test]
    fn rejects_empty_name() {
        let err = validate_name("database", "").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidName);
    }

    #[test]
    fn rejects_path_like_names() {
        assert!(validate_name("collection", "../etc").is_err());
        assert!(validate_name("collection", "a/b").is_err());
        assert!(validate_name("collection", "has space").is_err());
    }

    #[test]
    fn rejects_long_names() {
        let name = "x".repeat(MAX_NAME_LENGTH + 1);
        assert!(validate_name("database", &name).is_err());
        assert!(validate_name("database", &"x".repeat(MAX_NAME_LENGTH)).is_ok());
    }
}
