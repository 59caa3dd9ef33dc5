//! Per-variant stock records.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;

use haya_core::{ProductId, StockLine, VariantKey};

use super::{RepositoryError, quantity_param, stored_quantity};

/// Storage of per-variant stock quantities.
///
/// Quantities never go below zero: every decrement is conditional on the
/// current quantity covering the request.
#[async_trait]
pub trait InventoryRepository: Send + Sync {
    /// Current quantities for `keys`. Variants without a record are absent
    /// from the map.
    async fn quantities(
        &self,
        keys: &[VariantKey],
    ) -> Result<HashMap<VariantKey, u32>, RepositoryError>;

    /// Decrement every line or none of them.
    ///
    /// Returns `false` (and changes nothing) when any line is not covered.
    async fn reserve(&self, lines: &[StockLine]) -> Result<bool, RepositoryError>;

    /// Decrement each line independently where stock allows.
    ///
    /// Returns the lines that could not be decremented.
    async fn decrement(&self, lines: &[StockLine]) -> Result<Vec<StockLine>, RepositoryError>;

    /// Add each line's quantity back, creating missing records.
    async fn increment(&self, lines: &[StockLine]) -> Result<(), RepositoryError>;
}

/// `PostgreSQL` implementation over `product_variants`.
pub struct PgInventoryRepository {
    pool: PgPool,
}

impl PgInventoryRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct VariantRow {
    product_id: ProductId,
    color: String,
    size: String,
    quantity: i32,
}

const DECREMENT_SQL: &str = r"
    UPDATE product_variants
    SET quantity = quantity - $4, updated_at = NOW()
    WHERE product_id = $1 AND color = $2 AND size = $3 AND quantity >= $4
";

#[async_trait]
impl InventoryRepository for PgInventoryRepository {
    async fn quantities(
        &self,
        keys: &[VariantKey],
    ) -> Result<HashMap<VariantKey, u32>, RepositoryError> {
        let product_ids: Vec<String> = keys.iter().map(|k| k.product_id.to_string()).collect();
        let colors: Vec<String> = keys.iter().map(|k| k.color.clone()).collect();
        let sizes: Vec<String> = keys.iter().map(|k| k.size.clone()).collect();

        let rows = sqlx::query_as::<_, VariantRow>(
            r"
            SELECT v.product_id, v.color, v.size, v.quantity
            FROM product_variants v
            JOIN UNNEST($1::text[], $2::text[], $3::text[]) AS k(product_id, color, size)
              ON v.product_id = k.product_id AND v.color = k.color AND v.size = k.size
            ",
        )
        .bind(&product_ids)
        .bind(&colors)
        .bind(&sizes)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                let quantity = stored_quantity(r.quantity, "stock quantity")?;
                Ok((VariantKey::new(r.product_id, r.color, r.size), quantity))
            })
            .collect()
    }

    async fn reserve(&self, lines: &[StockLine]) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for line in lines {
            let result = sqlx::query(DECREMENT_SQL)
                .bind(&line.product_id)
                .bind(&line.color)
                .bind(&line.size)
                .bind(quantity_param(line.quantity)?)
                .execute(&mut *tx)
                .await?;

            if result.rows_affected() == 0 {
                tx.rollback().await?;
                return Ok(false);
            }
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn decrement(&self, lines: &[StockLine]) -> Result<Vec<StockLine>, RepositoryError> {
        let mut shortfalls = Vec::new();
        for line in lines {
            let result = sqlx::query(DECREMENT_SQL)
                .bind(&line.product_id)
                .bind(&line.color)
                .bind(&line.size)
                .bind(quantity_param(line.quantity)?)
                .execute(&self.pool)
                .await?;

            if result.rows_affected() == 0 {
                shortfalls.push(line.clone());
            }
        }
        Ok(shortfalls)
    }

    async fn increment(&self, lines: &[StockLine]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        for line in lines {
            sqlx::query(
                r"
                INSERT INTO product_variants (product_id, color, size, quantity)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (product_id, color, size)
                DO UPDATE SET quantity = product_variants.quantity + EXCLUDED.quantity,
                              updated_at = NOW()
                ",
            )
            .bind(&line.product_id)
            .bind(&line.color)
            .bind(&line.size)
            .bind(quantity_param(line.quantity)?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
