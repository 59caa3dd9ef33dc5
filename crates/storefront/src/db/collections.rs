//! Authoritative copies of the per-user cart and favorites.
//!
//! Collections are written wholesale: each save replaces the stored rows and
//! records insertion order in a `position` column.

use async_trait::async_trait;
use sqlx::PgPool;

use haya_core::{CartLine, FavoriteEntry, Money, ProductId, UserId};

use super::{RepositoryError, quantity_param, stored_quantity};

#[async_trait]
pub trait CollectionRepository: Send + Sync {
    async fn load_cart(&self, user_id: UserId) -> Result<Vec<CartLine>, RepositoryError>;

    async fn save_cart(&self, user_id: UserId, lines: &[CartLine]) -> Result<(), RepositoryError>;

    async fn clear_cart(&self, user_id: UserId) -> Result<(), RepositoryError>;

    async fn load_favorites(&self, user_id: UserId)
    -> Result<Vec<FavoriteEntry>, RepositoryError>;

    async fn save_favorites(
        &self,
        user_id: UserId,
        entries: &[FavoriteEntry],
    ) -> Result<(), RepositoryError>;

    /// Remove one favorite. Returns whether it was present.
    async fn remove_favorite(
        &self,
        user_id: UserId,
        product_id: &ProductId,
    ) -> Result<bool, RepositoryError>;
}

/// `PostgreSQL` implementation over `cart_lines` and `favorites`.
pub struct PgCollectionRepository {
    pool: PgPool,
}

impl PgCollectionRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CartLineRow {
    product_id: ProductId,
    name: String,
    slug: String,
    image: Option<String>,
    price: Money,
    original_price: Option<Money>,
    color: String,
    size: String,
    quantity: i32,
    max_quantity: i32,
}

impl TryFrom<CartLineRow> for CartLine {
    type Error = RepositoryError;

    fn try_from(r: CartLineRow) -> Result<Self, Self::Error> {
        Ok(Self {
            product_id: r.product_id,
            name: r.name,
            slug: r.slug,
            image: r.image,
            price: r.price,
            original_price: r.original_price,
            color: r.color,
            size: r.size,
            quantity: stored_quantity(r.quantity, "cart quantity")?,
            max_quantity: stored_quantity(r.max_quantity, "cart max quantity")?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct FavoriteRow {
    product_id: ProductId,
    name: String,
    slug: String,
    image: Option<String>,
    price: Money,
    original_price: Option<Money>,
}

impl From<FavoriteRow> for FavoriteEntry {
    fn from(r: FavoriteRow) -> Self {
        Self {
            product_id: r.product_id,
            name: r.name,
            slug: r.slug,
            image: r.image,
            price: r.price,
            original_price: r.original_price,
        }
    }
}

#[async_trait]
impl CollectionRepository for PgCollectionRepository {
    async fn load_cart(&self, user_id: UserId) -> Result<Vec<CartLine>, RepositoryError> {
        let rows = sqlx::query_as::<_, CartLineRow>(
            r"
            SELECT product_id, name, slug, image, price, original_price,
                   color, size, quantity, max_quantity
            FROM cart_lines
            WHERE user_id = $1
            ORDER BY position
            ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CartLine::try_from).collect()
    }

    async fn save_cart(&self, user_id: UserId, lines: &[CartLine]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM cart_lines WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        for (position, line) in (0_i32..).zip(lines) {
            sqlx::query(
                r"
                INSERT INTO cart_lines
                    (user_id, position, product_id, name, slug, image, price, original_price,
                     color, size, quantity, max_quantity)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                ",
            )
            .bind(user_id)
            .bind(position)
            .bind(&line.product_id)
            .bind(&line.name)
            .bind(&line.slug)
            .bind(&line.image)
            .bind(line.price)
            .bind(line.original_price)
            .bind(&line.color)
            .bind(&line.size)
            .bind(quantity_param(line.quantity)?)
            .bind(quantity_param(line.max_quantity)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn clear_cart(&self, user_id: UserId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM cart_lines WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load_favorites(
        &self,
        user_id: UserId,
    ) -> Result<Vec<FavoriteEntry>, RepositoryError> {
        let rows = sqlx::query_as::<_, FavoriteRow>(
            r"
            SELECT product_id, name, slug, image, price, original_price
            FROM favorites
            WHERE user_id = $1
            ORDER BY position
            ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(FavoriteEntry::from).collect())
    }

    async fn save_favorites(
        &self,
        user_id: UserId,
        entries: &[FavoriteEntry],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM favorites WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        for (position, entry) in (0_i32..).zip(entries) {
            sqlx::query(
                r"
                INSERT INTO favorites
                    (user_id, position, product_id, name, slug, image, price, original_price)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ",
            )
            .bind(user_id)
            .bind(position)
            .bind(&entry.product_id)
            .bind(&entry.name)
            .bind(&entry.slug)
            .bind(&entry.image)
            .bind(entry.price)
            .bind(entry.original_price)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn remove_favorite(
        &self,
        user_id: UserId,
        product_id: &ProductId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND product_id = $2")
            .bind(user_id)
            .bind(product_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
