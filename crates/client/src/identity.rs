//! Identity resolution.
//!
//! The session store (an upstream collaborator) keeps a serialized identity
//! record for the signed-in user. This module turns that record into the
//! [`ActorKey`] used to partition persisted state. Resolution never fails:
//! anything unreadable is treated exactly like "nobody is signed in".

use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use cartsync_core::ActorKey;
use serde_json::Value;

/// Fields consulted, in order, for the actor key.
const IDENTITY_FIELDS: &[&str] = &["id", "user_id", "email"];

/// Prefix applied to a signed-in identifier that spells the guest sentinel.
const RESERVED_PREFIX: &str = "user-";

/// Source of the ambient identity record.
pub trait IdentitySource: Send + Sync {
    /// The raw serialized identity record, if any.
    fn identity_record(&self) -> Option<String>;
}

/// In-memory identity record that can be swapped at runtime (login/logout).
#[derive(Debug, Default)]
pub struct StaticIdentity {
    record: RwLock<Option<String>>,
}

impl StaticIdentity {
    /// No one signed in.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Start with the given raw record.
    #[must_use]
    pub fn with_record(record: impl Into<String>) -> Self {
        Self {
            record: RwLock::new(Some(record.into())),
        }
    }

    /// Replace the record (`None` signs out).
    pub fn set_record(&self, record: Option<String>) {
        *self.record.write().unwrap_or_else(PoisonError::into_inner) = record;
    }
}

impl IdentitySource for StaticIdentity {
    fn identity_record(&self) -> Option<String> {
        self.record
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Identity record stored as a JSON file.
#[derive(Debug, Clone)]
pub struct FileIdentity {
    path: PathBuf,
}

impl FileIdentity {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl IdentitySource for FileIdentity {
    fn identity_record(&self) -> Option<String> {
        std::fs::read_to_string(&self.path).ok()
    }
}

/// Derive the actor key from the ambient identity record.
///
/// Falls back to [`ActorKey::guest`] when the record is missing, is not a JSON
/// object, or carries no usable identifier. An identifier that is literally
/// `guest` is prefixed with `user-` so a signed-in account never lands in the
/// anonymous partition.
#[must_use]
pub fn resolve_actor_key(source: &dyn IdentitySource) -> ActorKey {
    source
        .identity_record()
        .and_then(|raw| actor_from_record(&raw))
        .unwrap_or_else(ActorKey::guest)
}

fn actor_from_record(raw: &str) -> Option<ActorKey> {
    let record: Value = serde_json::from_str(raw).ok()?;
    let object = record.as_object()?;
    IDENTITY_FIELDS.iter().find_map(|field| {
        let key = match object.get(*field)? {
            Value::String(s) if !s.trim().is_empty() => s.trim().to_owned(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        if key == ActorKey::GUEST {
            return Some(ActorKey::new(format!("{RESERVED_PREFIX}{key}")));
        }
        Some(ActorKey::new(key))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(record: Option<&str>) -> ActorKey {
        let source = StaticIdentity::anonymous();
        source.set_record(record.map(str::to_owned));
        resolve_actor_key(&source)
    }

    #[test]
    fn test_numeric_id() {
        assert_eq!(resolve(Some(r#"{"id": 42, "name": "A"}"#)).as_str(), "42");
    }

    #[test]
    fn test_string_id_and_fallbacks() {
        assert_eq!(resolve(Some(r#"{"id": "u-1"}"#)).as_str(), "u-1");
        assert_eq!(resolve(Some(r#"{"user_id": 9}"#)).as_str(), "9");
        assert_eq!(
            resolve(Some(r#"{"id": null, "email": "a@b.com"}"#)).as_str(),
            "a@b.com"
        );
    }

    #[test]
    fn test_missing_or_malformed_is_guest() {
        assert!(resolve(None).is_guest());
        assert!(resolve(Some("")).is_guest());
        assert!(resolve(Some("{not json")).is_guest());
        assert!(resolve(Some("[1, 2]")).is_guest());
        assert!(resolve(Some("null")).is_guest());
        assert!(resolve(Some(r#"{"id": ""}"#)).is_guest());
        assert!(resolve(Some(r#"{"id": {"nested": 1}}"#)).is_guest());
    }

    #[test]
    fn test_signed_in_guest_identifier_is_not_the_guest_partition() {
        for record in [
            r#"{"id": "guest"}"#,
            r#"{"user_id": " guest "}"#,
            r#"{"email": "guest"}"#,
        ] {
            let actor = resolve(Some(record));
            assert!(!actor.is_guest(), "{record}");
            assert_eq!(actor.as_str(), "user-guest");
        }
        assert_eq!(resolve(Some(r#"{"id": "Guest"}"#)).as_str(), "Guest");
    }

    #[test]
    fn test_missing_file_is_guest() {
        let source = FileIdentity::new("/nonexistent/cartsync/identity.json");
        assert!(resolve_actor_key(&source).is_guest());
    }
}
