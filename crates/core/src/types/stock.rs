//! Stock check request and response shapes.

use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::variant::VariantKey;

/// A requested quantity of one variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLine {
    pub product_id: ProductId,
    pub color: String,
    pub size: String,
    pub quantity: u32,
}

impl StockLine {
    #[must_use]
    pub fn new(key: VariantKey, quantity: u32) -> Self {
        Self {
            product_id: key.product_id,
            color: key.color,
            size: key.size,
            quantity,
        }
    }

    #[must_use]
    pub fn key(&self) -> VariantKey {
        VariantKey::new(self.product_id.clone(), self.color.clone(), self.size.clone())
    }
}

/// Availability of one requested line.
///
/// `message` is set only when the line cannot be fulfilled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAvailability {
    pub product_id: ProductId,
    pub color: String,
    pub size: String,
    pub requested: u32,
    pub available: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StockAvailability {
    /// Compare a request against the quantity on hand. `None` means the
    /// variant has no inventory record at all.
    #[must_use]
    pub fn evaluate(line: &StockLine, on_hand: Option<u32>) -> Self {
        let available = on_hand.unwrap_or(0);
        let message = match on_hand {
            None => Some("Variante introuvable".to_owned()),
            Some(0) => Some("Rupture de stock".to_owned()),
            Some(n) if n < line.quantity => Some(format!("Stock insuffisant ({n} disponible(s))")),
            Some(_) => None,
        };
        Self {
            product_id: line.product_id.clone(),
            color: line.color.clone(),
            size: line.size.clone(),
            requested: line.quantity,
            available,
            message,
        }
    }

    /// Whether the requested quantity can be fulfilled.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.message.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(quantity: u32) -> StockLine {
        StockLine::new(VariantKey::new("p1", "Noir", "S"), quantity)
    }

    #[test]
    fn test_evaluate() {
        assert!(StockAvailability::evaluate(&req(2), Some(2)).is_available());
        let short = StockAvailability::evaluate(&req(3), Some(2));
        assert!(!short.is_available());
        assert_eq!(short.available, 2);
        assert_eq!(short.requested, 3);
        assert!(!StockAvailability::evaluate(&req(1), Some(0)).is_available());
        let missing = StockAvailability::evaluate(&req(1), None);
        assert_eq!(missing.available, 0);
        assert!(!missing.is_available());
    }
}
