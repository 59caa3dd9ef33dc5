//! Product variant identity.

use core::fmt;

use serde::{Deserialize, Serialize};

use super::id::ProductId;

/// A (product, color, size) triple: the unit of inventory and the identity of
/// a cart line.
///
/// Its textual form is `"{product}-{color}-{size}"`, which is what clients
/// use as a line id.
///
/// ```
/// use haya_core::VariantKey;
///
/// let key = VariantKey::new("robe-lin", "Sable", "M");
/// assert_eq!(key.to_string(), "robe-lin-Sable-M");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantKey {
    pub product_id: ProductId,
    pub color: String,
    pub size: String,
}

impl VariantKey {
    /// Build a key from its parts.
    #[must_use]
    pub fn new(
        product_id: impl Into<ProductId>,
        color: impl Into<String>,
        size: impl Into<String>,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            color: color.into(),
            size: size.into(),
        }
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.product_id, self.color, self.size)
    }
}
