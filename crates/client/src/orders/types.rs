//! Order bookkeeping types.

use std::str::FromStr;

use cartsync_core::{LocalOrderId, OrderKey, OrderStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Checkout form data submitted by the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutPayload {
    pub shipping_address: Value,
    pub items: Vec<Value>,
    pub delivery_method: String,
    pub payment_method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon: Option<String>,
    pub total: Decimal,
}

/// An order placed locally that the backend has not (knowingly) confirmed.
///
/// Pending orders are never retried or expired; they remain as local
/// evidence that the order was placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub local_id: LocalOrderId,
    pub created_at: DateTime<Utc>,
    pub payload: CheckoutPayload,
}

/// Body of the confirmation call: `{local_id, ...payload}`.
#[derive(Debug, Serialize)]
pub struct ConfirmationRequest<'a> {
    pub local_id: LocalOrderId,
    #[serde(flatten)]
    pub payload: &'a CheckoutPayload,
}

/// One entry of the order history, newest first.
///
/// Entries are open records: push updates may add fields this client does
/// not know about, and those are kept verbatim. Typed accessors cover the
/// fields the client relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderHistoryEntry(Map<String, Value>);

impl OrderHistoryEntry {
    /// Wrap a record. Returns `None` if it has no usable `id`.
    #[must_use]
    pub fn from_fields(fields: Map<String, Value>) -> Option<Self> {
        fields.get("id").and_then(OrderKey::from_json)?;
        Some(Self(fields))
    }

    /// Wrap a JSON value. Returns `None` unless it is an object with an `id`.
    #[must_use]
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Self::from_fields(fields),
            _ => None,
        }
    }

    /// Entry recorded when an order is submitted.
    ///
    /// `ack` is the confirmation response, if one arrived. A server-assigned
    /// `id` or `status` in it (top level or under `order`) takes precedence
    /// over the local values.
    #[must_use]
    pub fn placed(
        local_id: LocalOrderId,
        created_at: DateTime<Utc>,
        payload: &CheckoutPayload,
        ack: Option<&Value>,
    ) -> Self {
        let id = ack
            .and_then(|ack| ack_field(ack, "id"))
            .filter(|id| OrderKey::from_json(id).is_some())
            .unwrap_or_else(|| json!(local_id.as_i64()));
        let status = ack
            .and_then(|ack| ack_field(ack, "status"))
            .and_then(|status| status.as_str().map(str::to_owned))
            .unwrap_or_else(|| OrderStatus::Pending.to_string());

        let mut fields = Map::new();
        fields.insert("id".into(), id);
        fields.insert("local_id".into(), json!(local_id.as_i64()));
        fields.insert("status".into(), Value::String(status));
        fields.insert("total".into(), Value::String(payload.total.to_string()));
        fields.insert("items".into(), Value::Array(payload.items.clone()));
        fields.insert("created_at".into(), json!(created_at.to_rfc3339()));
        fields.insert("shipping_address".into(), payload.shipping_address.clone());
        fields.insert(
            "delivery_method".into(),
            Value::String(payload.delivery_method.clone()),
        );
        fields.insert(
            "payment_method".into(),
            Value::String(payload.payment_method.clone()),
        );
        if let Some(coupon) = &payload.coupon {
            fields.insert("coupon".into(), Value::String(coupon.clone()));
        }
        Self(fields)
    }

    #[must_use]
    pub fn id(&self) -> Option<OrderKey> {
        self.0.get("id").and_then(OrderKey::from_json)
    }

    #[must_use]
    pub fn local_id(&self) -> Option<LocalOrderId> {
        self.0
            .get("local_id")
            .and_then(Value::as_i64)
            .map(LocalOrderId::from_millis)
    }

    #[must_use]
    pub fn status(&self) -> OrderStatus {
        self.0
            .get("status")
            .and_then(Value::as_str)
            .map(OrderStatus::from)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn total(&self) -> Option<Decimal> {
        match self.0.get("total")? {
            Value::String(s) => Decimal::from_str(s.trim()).ok(),
            Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn items(&self) -> &[Value] {
        self.0
            .get("items")
            .and_then(Value::as_array)
            .map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.0.get("created_at")?.as_str()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|at| at.with_timezone(&Utc))
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Shallow-merge `update` into this entry; absent fields are preserved.
    pub fn merge(&mut self, update: &Map<String, Value>) {
        for (field, value) in update {
            self.0.insert(field.clone(), value.clone());
        }
    }
}

fn ack_field(ack: &Value, field: &str) -> Option<Value> {
    ack.get(field)
        .or_else(|| ack.get("order").and_then(|order| order.get(field)))
        .filter(|value| !value.is_null())
        .cloned()
}
