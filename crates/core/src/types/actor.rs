//! Actor key type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Identifies whose data a persisted key belongs to.
///
/// Every persisted key is suffixed with an actor key so that the cart,
/// wishlist and orders of one account are never visible to another.
/// Anonymous visitors share the [`ActorKey::GUEST`] partition.
///
/// # Examples
///
/// ```
/// use cartsync_core::ActorKey;
///
/// assert!(ActorKey::guest().is_guest());
/// assert!(ActorKey::new("   ").is_guest());
/// assert_eq!(ActorKey::new("42").as_str(), "42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorKey(String);

impl ActorKey {
    /// Sentinel key for visitors without an identity.
    pub const GUEST: &'static str = "guest";

    /// Create an actor key, falling back to the guest key for blank input.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        let trimmed = key.trim();
        if trimmed.is_empty() {
            Self::guest()
        } else if trimmed.len() == key.len() {
            Self(key)
        } else {
            Self(trimmed.to_owned())
        }
    }

    /// The guest actor key.
    #[must_use]
    pub fn guest() -> Self {
        Self(Self::GUEST.to_owned())
    }

    /// Whether this is the guest partition.
    #[must_use]
    pub fn is_guest(&self) -> bool {
        self.0 == Self::GUEST
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ActorKey {
    fn default() -> Self {
        Self::guest()
    }
}

impl fmt::Display for ActorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ActorKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_is_guest() {
        assert!(ActorKey::new("").is_guest());
        assert!(ActorKey::new(" \t").is_guest());
        assert_eq!(ActorKey::default(), ActorKey::guest());
    }

    #[test]
    fn test_trims_whitespace() {
        assert_eq!(ActorKey::new(" user-1 ").as_str(), "user-1");
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", ActorKey::new("7")), "7");
    }
}
