//! Stock management.
//!
//! # Usage
//!
//! ```bash
//! haya-cli stock restock -p robe-lin -c Ecru -s M -q 5
//! ```

use haya_core::{StockLine, VariantKey};
use haya_storefront::db::Repositories;
use haya_storefront::services::InventoryService;

use super::{CommandError, connect};

/// Add `quantity` units to a variant, creating its record if needed.
///
/// Returns the quantity on hand afterwards.
///
/// # Errors
///
/// Returns error if the quantity is zero or the stock cannot be written.
pub async fn restock(
    product_id: &str,
    color: &str,
    size: &str,
    quantity: u32,
) -> Result<u32, CommandError> {
    if quantity == 0 {
        return Err(CommandError::InvalidArgument(
            "quantity must be at least 1".to_owned(),
        ));
    }
    if [product_id, color, size].iter().any(|part| part.trim().is_empty()) {
        return Err(CommandError::InvalidArgument(
            "product, color and size are required".to_owned(),
        ));
    }

    let pool = connect().await?;
    let inventory = InventoryService::new(Repositories::postgres(&pool).inventory);

    let key = VariantKey::new(product_id, color, size);
    tracing::info!(variant = %key, quantity, "Restocking variant");
    let on_hand = inventory
        .restock(StockLine::new(key, quantity))
        .await
        .map_err(|e| CommandError::Service(e.to_string()))?;

    tracing::info!(on_hand, "Restock complete");
    Ok(on_hand)
}
