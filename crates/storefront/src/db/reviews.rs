//! Review request records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use haya_core::{Email, OrderId, ProductId, ReviewId, UserId};

use super::RepositoryError;
use crate::models::{NewReview, Review, ReviewStatus};

#[async_trait]
pub trait ReviewRepository: Send + Sync {
    /// Whether any review record exists for the order.
    async fn exists_for_order(&self, order_id: OrderId) -> Result<bool, RepositoryError>;

    /// Insert all records in one write.
    async fn insert_batch(&self, reviews: &[NewReview]) -> Result<Vec<Review>, RepositoryError>;
}

/// `PostgreSQL` implementation over `reviews`.
pub struct PgReviewRepository {
    pool: PgPool,
}

impl PgReviewRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ReviewRow {
    id: ReviewId,
    order_id: OrderId,
    user_id: UserId,
    product_id: ProductId,
    product_name: String,
    customer_name: String,
    customer_email: Email,
    status: String,
    email_token: String,
    email_sent_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ReviewRow> for Review {
    type Error = RepositoryError;

    fn try_from(r: ReviewRow) -> Result<Self, Self::Error> {
        let status = r
            .status
            .parse::<ReviewStatus>()
            .map_err(RepositoryError::DataCorruption)?;

        Ok(Self {
            id: r.id,
            order_id: r.order_id,
            user_id: r.user_id,
            product_id: r.product_id,
            product_name: r.product_name,
            customer_name: r.customer_name,
            customer_email: r.customer_email,
            status,
            email_token: r.email_token,
            email_sent_at: r.email_sent_at,
            created_at: r.created_at,
        })
    }
}

#[async_trait]
impl ReviewRepository for PgReviewRepository {
    async fn exists_for_order(&self, order_id: OrderId) -> Result<bool, RepositoryError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM reviews WHERE order_id = $1)")
                .bind(order_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn insert_batch(&self, reviews: &[NewReview]) -> Result<Vec<Review>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::with_capacity(reviews.len());

        for review in reviews {
            let row = sqlx::query_as::<_, ReviewRow>(
                r"
                INSERT INTO reviews
                    (order_id, user_id, product_id, product_name, customer_name,
                     customer_email, status, email_token, email_sent_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING id, order_id, user_id, product_id, product_name, customer_name,
                          customer_email, status, email_token, email_sent_at, created_at
                ",
            )
            .bind(review.order_id)
            .bind(review.user_id)
            .bind(&review.product_id)
            .bind(&review.product_name)
            .bind(&review.customer_name)
            .bind(&review.customer_email)
            .bind(ReviewStatus::Pending.as_str())
            .bind(&review.email_token)
            .bind(review.email_sent_at)
            .fetch_one(&mut *tx)
            .await?;

            inserted.push(Review::try_from(row)?);
        }

        tx.commit().await?;
        Ok(inserted)
    }
}
