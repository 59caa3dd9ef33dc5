//! Entries of the two user-owned collections: cart lines and favorites.
//!
//! Both carry a denormalized display snapshot (name, slug, image, prices)
//! taken when the shopper added the item. The snapshot is opaque here: it is
//! stored and echoed back, never re-validated against the catalog.

use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::money::Money;
use super::variant::VariantKey;

/// One line of a shopping cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: ProductId,
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub image: Option<String>,
    /// Unit price at the time the line was added.
    pub price: Money,
    #[serde(default)]
    pub original_price: Option<Money>,
    pub color: String,
    pub size: String,
    pub quantity: u32,
    /// Stock available for this variant when the line was displayed.
    pub max_quantity: u32,
}

impl CartLine {
    /// Variant identity of this line.
    #[must_use]
    pub fn key(&self) -> VariantKey {
        VariantKey::new(self.product_id.clone(), self.color.clone(), self.size.clone())
    }

    /// Textual identity (`"{product}-{color}-{size}"`).
    #[must_use]
    pub fn identity(&self) -> String {
        self.key().to_string()
    }

    /// Clamp a requested quantity into `[1, max_quantity]`.
    ///
    /// A line whose stock snapshot is zero still keeps one unit; availability
    /// is enforced at checkout, not here.
    #[must_use]
    pub fn clamp_quantity(&self, requested: u32) -> u32 {
        requested.clamp(1, self.max_quantity.max(1))
    }

    /// `price × quantity`.
    #[must_use]
    pub fn line_total(&self) -> Money {
        self.price * self.quantity
    }
}

/// A product the shopper marked as a favorite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteEntry {
    pub product_id: ProductId,
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub image: Option<String>,
    pub price: Money,
    #[serde(default)]
    pub original_price: Option<Money>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn line(quantity: u32, max_quantity: u32) -> CartLine {
        CartLine {
            product_id: ProductId::new("robe-lin"),
            name: "Robe en lin".to_owned(),
            slug: "robe-en-lin".to_owned(),
            image: None,
            price: Money::new(Decimal::new(4990, 2)),
            original_price: None,
            color: "Sable".to_owned(),
            size: "M".to_owned(),
            quantity,
            max_quantity,
        }
    }

    #[test]
    fn test_identity_format() {
        assert_eq!(line(1, 3).identity(), "robe-lin-Sable-M");
    }

    #[test]
    fn test_clamp_quantity() {
        let l = line(1, 3);
        assert_eq!(l.clamp_quantity(0), 1);
        assert_eq!(l.clamp_quantity(2), 2);
        assert_eq!(l.clamp_quantity(10), 3);
        assert_eq!(line(1, 0).clamp_quantity(5), 1);
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let json = serde_json::to_value(line(2, 5)).unwrap();
        assert_eq!(json["productId"], "robe-lin");
        assert_eq!(json["maxQuantity"], 5);
        assert!(json.get("originalPrice").is_some());
    }

    #[test]
    fn test_favorite_defaults_optional_snapshot_fields() {
        let fav: FavoriteEntry =
            serde_json::from_str(r#"{"productId":"p1","name":"Foulard","price":"19.90"}"#).unwrap();
        assert_eq!(fav.slug, "");
        assert!(fav.image.is_none());
    }
}
