//! Newtype IDs for type-safe entity references.
//!
//! Use the `define_key!` macro to create type-safe string key wrappers that
//! prevent accidentally mixing identifiers from different entity types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Macro to define a type-safe string key wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`
/// - Conversion methods: `new()`, `as_str()`
/// - `Display`, `From<&str>` and `From<String>` implementations
///
/// # Example
///
/// ```rust
/// # use cartsync_core::define_key;
/// define_key!(SkuKey);
/// define_key!(CouponKey);
///
/// let sku = SkuKey::new("abc");
/// let coupon = CouponKey::new("abc");
///
/// // These are different types, so this won't compile:
/// // let _: SkuKey = coupon;
/// ```
#[macro_export]
macro_rules! define_key {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new key from a string.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

define_key!(LineId);
define_key!(OrderKey);

impl LineId {
    /// Read a line id from a loosely typed JSON value.
    ///
    /// Numbers and non-blank strings are accepted; everything else is not an id.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        json_key(value).map(Self)
    }
}

impl OrderKey {
    /// Read an order id from a loosely typed JSON value.
    ///
    /// `7` and `"7"` produce the same key so that server pushes match
    /// locally recorded entries regardless of how the id was encoded.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        json_key(value).map(Self)
    }
}

impl From<LocalOrderId> for OrderKey {
    fn from(id: LocalOrderId) -> Self {
        Self(id.to_string())
    }
}

fn json_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Locally generated identifier of an order awaiting server confirmation.
///
/// The value is an epoch-millisecond timestamp, bumped when needed so that
/// ids issued for one actor are strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalOrderId(i64);

impl LocalOrderId {
    /// Create a local order id from epoch milliseconds.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Get the underlying millisecond value.
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }

    /// The smallest id strictly after `self`.
    #[must_use]
    pub const fn successor(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl ::core::fmt::Display for LocalOrderId {
    fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for LocalOrderId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<LocalOrderId> for i64 {
    fn from(id: LocalOrderId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_order_key_number_and_string_match() {
        assert_eq!(
            OrderKey::from_json(&json!(7)),
            OrderKey::from_json(&json!("7"))
        );
    }

    #[test]
    fn test_blank_and_structured_values_are_not_keys() {
        assert_eq!(LineId::from_json(&json!("  ")), None);
        assert_eq!(LineId::from_json(&json!(null)), None);
        assert_eq!(LineId::from_json(&json!({"id": 1})), None);
        assert_eq!(LineId::from_json(&json!(true)), None);
    }

    #[test]
    fn test_local_order_id_successor() {
        let id = LocalOrderId::from_millis(1_700_000_000_000);
        assert!(id.successor() > id);
        assert_eq!(OrderKey::from(id).as_str(), "1700000000000");
    }
}
