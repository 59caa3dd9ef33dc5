//! Order domain types.
//!
//! An order is written once by the checkout or payment path and then only
//! moves through status transitions. Monetary fields and line snapshots are
//! never rewritten.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use haya_core::{
    AddressId, Email, Money, OrderId, OrderStatus, PaymentStatus, ProductId, PromoCodeId,
    StockLine, UserId, VariantKey,
};

/// Prefix of every human-readable order number.
pub const ORDER_NUMBER_PREFIX: &str = "CMD";

const BASE36: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Generate an order number of the form `CMD-{unix millis}-{6 base36 chars}`.
#[must_use]
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..6)
        .map(|_| char::from(BASE36[rng.random_range(0..BASE36.len())]))
        .collect();
    format!("{ORDER_NUMBER_PREFIX}-{}-{suffix}", now.timestamp_millis())
}

/// Immutable snapshot of one purchased variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: ProductId,
    pub name: String,
    pub color: String,
    pub size: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub total_price: Money,
}

impl OrderLine {
    /// Build a line, computing `total_price = unit_price × quantity`.
    #[must_use]
    pub fn new(
        product_id: ProductId,
        name: String,
        color: String,
        size: String,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            product_id,
            name,
            color,
            size,
            quantity,
            unit_price,
            total_price: unit_price * quantity,
        }
    }

    #[must_use]
    pub fn key(&self) -> VariantKey {
        VariantKey::new(self.product_id.clone(), self.color.clone(), self.size.clone())
    }

    #[must_use]
    pub fn stock_line(&self) -> StockLine {
        StockLine::new(self.key(), self.quantity)
    }
}

/// Monetary summary of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTotals {
    pub subtotal: Money,
    pub tax: Money,
    pub shipping: Money,
    pub discount: Money,
    pub total: Money,
}

impl OrderTotals {
    /// `subtotal + tax + shipping − discount`.
    #[must_use]
    pub fn expected_total(&self) -> Money {
        self.subtotal + self.tax + self.shipping - self.discount
    }

    /// Check the totals against each other and against the line snapshots.
    ///
    /// # Errors
    ///
    /// Returns a description of the first inconsistency found.
    pub fn validate(&self, lines: &[OrderLine]) -> Result<(), String> {
        let parts = [
            ("subtotal", self.subtotal),
            ("tax", self.tax),
            ("shipping", self.shipping),
            ("discount", self.discount),
            ("total", self.total),
        ];
        if let Some((name, _)) = parts.iter().find(|(_, amount)| amount.is_negative()) {
            return Err(format!("{name} must not be negative"));
        }

        let lines_total: Money = lines.iter().map(|l| l.total_price).sum();
        if !lines_total.approx_eq(self.subtotal) {
            return Err(format!(
                "line totals ({lines_total}) do not match subtotal ({})",
                self.subtotal
            ));
        }

        let expected = self.expected_total();
        if !expected.approx_eq(self.total) {
            return Err(format!(
                "total ({}) does not match subtotal + tax + shipping - discount ({expected})",
                self.total
            ));
        }
        Ok(())
    }
}

/// A persisted order with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    #[serde(flatten)]
    pub totals: OrderTotals,
    pub shipping_address_id: AddressId,
    pub promo_code_id: Option<PromoCodeId>,
    pub customer_email: Email,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub payment_method: String,
    pub delivery_method: String,
    pub payment_session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub notes: Option<String>,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub stock_reconciliation_required: bool,
    /// Charged amounts did not add up when the order was recorded.
    pub totals_review_required: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub lines: Vec<OrderLine>,
}

impl Order {
    /// Stock requests covering every line of the order.
    #[must_use]
    pub fn stock_lines(&self) -> Vec<StockLine> {
        self.lines.iter().map(OrderLine::stock_line).collect()
    }
}

/// An order ready to be inserted. New orders always start `PENDING`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub order_number: String,
    pub user_id: UserId,
    pub payment_status: PaymentStatus,
    pub totals: OrderTotals,
    pub shipping_address_id: AddressId,
    pub promo_code_id: Option<PromoCodeId>,
    pub customer_email: Email,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub payment_method: String,
    pub delivery_method: String,
    pub payment_session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub totals_review_required: bool,
    pub lines: Vec<OrderLine>,
}

/// The full set of mutable columns written by a status update.
///
/// Applied as a compare-and-set: the write only succeeds while the stored
/// status still equals `expected_status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusWrite {
    pub expected_status: OrderStatus,
    pub status: OrderStatus,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub notes: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::*;

    fn eur(s: &str) -> Money {
        Money::new(Decimal::from_str(s).unwrap())
    }

    fn line(quantity: u32, price: &str) -> OrderLine {
        OrderLine::new(
            ProductId::new("robe-lin"),
            "Robe en lin".to_owned(),
            "Sable".to_owned(),
            "M".to_owned(),
            quantity,
            eur(price),
        )
    }

    fn totals(subtotal: &str, shipping: &str, discount: &str, total: &str) -> OrderTotals {
        OrderTotals {
            subtotal: eur(subtotal),
            tax: Money::ZERO,
            shipping: eur(shipping),
            discount: eur(discount),
            total: eur(total),
        }
    }

    #[test]
    fn test_order_number_format() {
        let now = DateTime::from_timestamp_millis(1_718_000_000_123).unwrap();
        let number = generate_order_number(now);
        let parts: Vec<&str> = number.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "CMD");
        assert_eq!(parts[1], "1718000000123");
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2].chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_line_total() {
        assert_eq!(line(3, "19.90").total_price, eur("59.70"));
    }

    #[test]
    fn test_totals_validate_ok() {
        let lines = [line(2, "25.00"), line(1, "10.00")];
        assert!(totals("60.00", "4.90", "6.00", "58.90").validate(&lines).is_ok());
        // one cent of rounding slack
        assert!(totals("60.00", "4.90", "6.00", "58.91").validate(&lines).is_ok());
    }

    #[test]
    fn test_totals_validate_rejects_mismatch() {
        let lines = [line(2, "25.00")];
        let err = totals("60.00", "0", "0", "60.00").validate(&lines).unwrap_err();
        assert!(err.contains("line totals"));
        let err = totals("50.00", "4.90", "0", "50.00").validate(&lines).unwrap_err();
        assert!(err.contains("does not match"));
        let err = totals("50.00", "0", "-1", "51.00").validate(&lines).unwrap_err();
        assert!(err.contains("discount"));
    }
}
