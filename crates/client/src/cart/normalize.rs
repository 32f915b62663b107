//! Cart normalization.
//!
//! Line items reach the cart from several upstream shapes (product pages,
//! search results, carts persisted by older builds) that disagree on field
//! names and on whether numbers are numbers or strings. All of that tolerance
//! lives here: [`FIELD_MAP`] lists the accepted spellings, and
//! [`normalize_cart`] turns any raw value into a canonical [`CartState`] with
//! freshly computed totals.

use std::str::FromStr;

use cartsync_core::LineId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Accepted upstream spellings for each canonical line field, in priority order.
#[derive(Debug, Clone, Copy)]
pub struct FieldMap {
    pub id: &'static [&'static str],
    pub title: &'static [&'static str],
    pub thumbnail: &'static [&'static str],
    pub unit_price: &'static [&'static str],
    pub quantity: &'static [&'static str],
}

/// Field-mapping table used by every normalization path.
pub const FIELD_MAP: FieldMap = FieldMap {
    id: &["id", "product_id", "productId", "_id", "sku"],
    title: &["title", "name", "product_name", "productName"],
    thumbnail: &["thumbnail", "image", "image_url", "imageUrl", "img"],
    unit_price: &[
        "unit_price",
        "unitPrice",
        "price",
        "sale_price",
        "salePrice",
        "amount",
    ],
    quantity: &["quantity", "qty", "count"],
};

impl FieldMap {
    /// Line id, if any spelling carries a usable one.
    #[must_use]
    pub fn id(&self, line: &Map<String, Value>) -> Option<LineId> {
        first_present(line, self.id).and_then(LineId::from_json)
    }

    /// Title, empty when absent.
    #[must_use]
    pub fn title(&self, line: &Map<String, Value>) -> String {
        match first_present(line, self.title) {
            Some(Value::String(s)) => s.trim().to_owned(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        }
    }

    /// Thumbnail URL. Accepts a plain string or an object with a `url` field.
    #[must_use]
    pub fn thumbnail(&self, line: &Map<String, Value>) -> Option<String> {
        let url = match first_present(line, self.thumbnail)? {
            Value::String(s) => s.trim(),
            Value::Object(image) => image.get("url")?.as_str()?.trim(),
            _ => return None,
        };
        (!url.is_empty()).then(|| url.to_owned())
    }

    /// Unit price, `0` when absent, unparsable or negative.
    #[must_use]
    pub fn unit_price(&self, line: &Map<String, Value>) -> Decimal {
        first_present(line, self.unit_price)
            .and_then(coerce_decimal)
            .filter(|price| !price.is_sign_negative())
            .map_or(Decimal::ZERO, |price| price.normalize())
    }

    /// Quantity, `1` when absent or unparsable, never below `1`.
    #[must_use]
    pub fn quantity(&self, line: &Map<String, Value>) -> u32 {
        first_present(line, self.quantity)
            .and_then(coerce_quantity)
            .unwrap_or(1)
    }
}

fn first_present<'a>(line: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|name| line.get(*name))
        .find(|value| !value.is_null())
}

/// Parse a decimal from a number, a numeric string (`"$10.50"`), or a
/// money object (`{"amount": "10.50", "currency_code": "USD"}`).
fn coerce_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => parse_decimal(&n.to_string()),
        Value::String(s) => parse_decimal(s.trim().trim_start_matches('$').trim()),
        Value::Object(money) => money.get("amount").and_then(coerce_decimal),
        _ => None,
    }
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

fn coerce_quantity(value: &Value) -> Option<u32> {
    let whole = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(truncate_float))?,
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(truncate_float))?
        }
        _ => return None,
    };
    Some(u32::try_from(whole.max(1)).unwrap_or(u32::MAX))
}

#[allow(clippy::cast_possible_truncation)] // Clamped to the u32 range first
fn truncate_float(f: f64) -> Option<i64> {
    f.is_finite()
        .then(|| f.trunc().clamp(0.0, f64::from(u32::MAX)) as i64)
}

/// Persisted shape of a cart line: only the raw facts, never derived totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: LineId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl CartItem {
    /// Create an item with quantity 1.
    #[must_use]
    pub fn new(id: impl Into<LineId>, title: impl Into<String>, unit_price: Decimal) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            thumbnail: None,
            unit_price,
            quantity: 1,
        }
    }

    #[must_use]
    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity.max(1);
        self
    }

    #[must_use]
    pub fn with_thumbnail(mut self, url: impl Into<String>) -> Self {
        self.thumbnail = Some(url.into());
        self
    }

    /// Build an item from any upstream line shape.
    ///
    /// Returns `None` when the line is not an object or has no usable id.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        let line = value.as_object()?;
        Some(Self {
            id: FIELD_MAP.id(line)?,
            title: FIELD_MAP.title(line),
            thumbnail: FIELD_MAP.thumbnail(line),
            unit_price: FIELD_MAP.unit_price(line),
            quantity: FIELD_MAP.quantity(line),
        })
    }
}

/// A cart line with its derived subtotal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLine {
    pub id: LineId,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub subtotal: Decimal,
}

impl From<CartItem> for CartLine {
    fn from(item: CartItem) -> Self {
        let subtotal = item
            .unit_price
            .checked_mul(Decimal::from(item.quantity))
            .unwrap_or(Decimal::MAX);
        Self {
            id: item.id,
            title: item.title,
            thumbnail: item.thumbnail,
            unit_price: item.unit_price,
            quantity: item.quantity,
            subtotal,
        }
    }
}

impl From<&CartLine> for CartItem {
    fn from(line: &CartLine) -> Self {
        Self {
            id: line.id.clone(),
            title: line.title.clone(),
            thumbnail: line.thumbnail.clone(),
            unit_price: line.unit_price,
            quantity: line.quantity,
        }
    }
}

/// How shipping is charged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShippingPolicy {
    /// Shipping is always free.
    #[default]
    Free,
    /// A flat fee, waived when the subtotal reaches `free_over`.
    Flat {
        fee: Decimal,
        free_over: Option<Decimal>,
    },
}

impl ShippingPolicy {
    /// Shipping charged for a cart with the given subtotal.
    #[must_use]
    pub fn shipping_for(&self, subtotal: Decimal, is_empty: bool) -> Decimal {
        match *self {
            Self::Free => Decimal::ZERO,
            Self::Flat { .. } if is_empty => Decimal::ZERO,
            Self::Flat {
                free_over: Some(threshold),
                ..
            } if subtotal >= threshold => Decimal::ZERO,
            Self::Flat { fee, .. } => fee,
        }
    }
}

/// Totals are non-negative, so overflow can only go up.
fn saturating_add(a: Decimal, b: Decimal) -> Decimal {
    a.checked_add(b).unwrap_or(Decimal::MAX)
}

/// Canonical cart view with totals computed from the current lines.
///
/// There is no `Deserialize`: a cart is always rebuilt through
/// [`normalize_cart`] so persisted totals are never trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartState {
    items: Vec<CartLine>,
    subtotal: Decimal,
    shipping: Decimal,
    grand_total: Decimal,
}

impl CartState {
    /// Empty cart.
    #[must_use]
    pub fn empty() -> Self {
        Self::from_items(Vec::new(), &ShippingPolicy::Free)
    }

    /// Build a cart from raw items, merging duplicate ids and computing totals.
    #[must_use]
    pub fn from_items(items: Vec<CartItem>, shipping: &ShippingPolicy) -> Self {
        let mut merged: Vec<CartItem> = Vec::with_capacity(items.len());
        for mut item in items {
            item.quantity = item.quantity.max(1);
            item.unit_price = item.unit_price.max(Decimal::ZERO);
            match merged.iter_mut().find(|existing| existing.id == item.id) {
                Some(existing) => {
                    existing.quantity = existing.quantity.saturating_add(item.quantity);
                }
                None => merged.push(item),
            }
        }

        let items: Vec<CartLine> = merged.into_iter().map(CartLine::from).collect();
        let subtotal = items
            .iter()
            .fold(Decimal::ZERO, |sum, line| saturating_add(sum, line.subtotal));
        let shipping = shipping.shipping_for(subtotal, items.is_empty());
        Self {
            items,
            subtotal,
            shipping,
            grand_total: saturating_add(subtotal, shipping),
        }
    }

    #[must_use]
    pub fn items(&self) -> &[CartLine] {
        &self.items
    }

    #[must_use]
    pub const fn subtotal(&self) -> Decimal {
        self.subtotal
    }

    #[must_use]
    pub const fn shipping(&self) -> Decimal {
        self.shipping
    }

    #[must_use]
    pub const fn grand_total(&self) -> Decimal {
        self.grand_total
    }

    /// Total quantity across lines, for badge views.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.items.iter().map(|line| u64::from(line.quantity)).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn line(&self, id: &LineId) -> Option<&CartLine> {
        self.items.iter().find(|line| &line.id == id)
    }

    /// Raw items to persist.
    #[must_use]
    pub fn to_items(&self) -> Vec<CartItem> {
        self.items.iter().map(CartItem::from).collect()
    }
}

impl Default for CartState {
    fn default() -> Self {
        Self::empty()
    }
}

/// Extract raw items from any persisted or upstream cart value.
///
/// Accepts an array of lines or an object with an `items` array. Lines that
/// are not objects or have no id are dropped.
#[must_use]
pub fn parse_items(raw: &Value) -> Vec<CartItem> {
    let lines = match raw {
        Value::Array(lines) => lines.as_slice(),
        Value::Object(cart) => match cart.get("items") {
            Some(Value::Array(lines)) => lines.as_slice(),
            _ => &[],
        },
        _ => &[],
    };

    lines
        .iter()
        .filter_map(|line| {
            let item = CartItem::from_json(line);
            if item.is_none() {
                tracing::debug!(line = %line, "Dropping cart line without an id");
            }
            item
        })
        .collect()
}

/// Normalize a raw cart with free shipping.
#[must_use]
pub fn normalize_cart(raw: &Value) -> CartState {
    normalize_cart_with(raw, &ShippingPolicy::Free)
}

/// Normalize a raw cart under a shipping policy.
#[must_use]
pub fn normalize_cart_with(raw: &Value, shipping: &ShippingPolicy) -> CartState {
    CartState::from_items(parse_items(raw), shipping)
}
