//! Order persistence.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use haya_core::{
    AddressId, Email, Money, OrderId, OrderStatus, PaymentStatus, ProductId, PromoCodeId, UserId,
};

use super::{RepositoryError, conflict_on_unique, quantity_param, stored_quantity};
use crate::models::{NewOrder, Order, OrderLine, OrderTotals, StatusWrite};

/// Durable storage for orders and their lines. No business rules live here
/// beyond uniqueness of the order number and of the payment session id.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert an order and all of its lines in one write.
    ///
    /// Returns [`RepositoryError::Conflict`] when the order number or the
    /// payment session id is already taken.
    async fn insert(&self, order: &NewOrder) -> Result<Order, RepositoryError>;

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    async fn find_by_payment_session(
        &self,
        session_id: &str,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Orders of one customer, newest first.
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError>;

    /// Apply a status write if the stored status still equals
    /// `write.expected_status`. Returns `None` when it does not (or the
    /// order is gone).
    async fn update_status(
        &self,
        id: OrderId,
        write: &StatusWrite,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Mark an order whose stock could not be decremented after payment.
    async fn flag_stock_reconciliation(&self, id: OrderId) -> Result<(), RepositoryError>;

    /// Delivered orders whose `delivered_at` is at or after `since`.
    async fn delivered_since(&self, since: DateTime<Utc>) -> Result<Vec<Order>, RepositoryError>;

    /// Cheap connectivity check for readiness probes.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// `PostgreSQL` implementation over `orders` and `order_lines`.
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_lines(
        &self,
        ids: &[OrderId],
    ) -> Result<Vec<(OrderId, OrderLine)>, RepositoryError> {
        let ids: Vec<i32> = ids.iter().map(OrderId::as_i32).collect();
        let rows = sqlx::query_as::<_, OrderLineRow>(
            r"
            SELECT order_id, product_id, product_name, color, size, quantity, unit_price, total_price
            FROM order_lines
            WHERE order_id = ANY($1)
            ORDER BY order_id, position
            ",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| Ok((r.order_id, r.into_line()?)))
            .collect()
    }

    async fn hydrate(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>, RepositoryError> {
        let ids: Vec<OrderId> = rows.iter().map(|r| r.id).collect();
        let mut by_order: HashMap<OrderId, Vec<OrderLine>> = HashMap::new();
        for (order_id, line) in self.load_lines(&ids).await? {
            by_order.entry(order_id).or_default().push(line);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let lines = by_order.remove(&row.id).unwrap_or_default();
                row.into_order(lines)
            })
            .collect())
    }

    async fn hydrate_one(&self, row: Option<OrderRow>) -> Result<Option<Order>, RepositoryError> {
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}

const ORDER_COLUMNS: &str = r"
    id, order_number, user_id, status, payment_status,
    subtotal, tax_amount, shipping_amount, discount_amount, total_amount,
    shipping_address_id, promo_code_id, customer_email, customer_name, customer_phone,
    payment_method, delivery_method, payment_session_id, payment_intent_id,
    notes, tracking_number, carrier, shipped_at, delivered_at,
    stock_reconciliation_required, totals_review_required, created_at, updated_at
";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    order_number: String,
    user_id: UserId,
    status: OrderStatus,
    payment_status: PaymentStatus,
    subtotal: Money,
    tax_amount: Money,
    shipping_amount: Money,
    discount_amount: Money,
    total_amount: Money,
    shipping_address_id: AddressId,
    promo_code_id: Option<PromoCodeId>,
    customer_email: Email,
    customer_name: String,
    customer_phone: Option<String>,
    payment_method: String,
    delivery_method: String,
    payment_session_id: Option<String>,
    payment_intent_id: Option<String>,
    notes: Option<String>,
    tracking_number: Option<String>,
    carrier: Option<String>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    stock_reconciliation_required: bool,
    totals_review_required: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, lines: Vec<OrderLine>) -> Order {
        Order {
            id: self.id,
            order_number: self.order_number,
            user_id: self.user_id,
            status: self.status,
            payment_status: self.payment_status,
            totals: OrderTotals {
                subtotal: self.subtotal,
                tax: self.tax_amount,
                shipping: self.shipping_amount,
                discount: self.discount_amount,
                total: self.total_amount,
            },
            shipping_address_id: self.shipping_address_id,
            promo_code_id: self.promo_code_id,
            customer_email: self.customer_email,
            customer_name: self.customer_name,
            customer_phone: self.customer_phone,
            payment_method: self.payment_method,
            delivery_method: self.delivery_method,
            payment_session_id: self.payment_session_id,
            payment_intent_id: self.payment_intent_id,
            notes: self.notes,
            tracking_number: self.tracking_number,
            carrier: self.carrier,
            shipped_at: self.shipped_at,
            delivered_at: self.delivered_at,
            stock_reconciliation_required: self.stock_reconciliation_required,
            totals_review_required: self.totals_review_required,
            created_at: self.created_at,
            updated_at: self.updated_at,
            lines,
        }
    }
}

#[derive(sqlx::FromRow)]
struct OrderLineRow {
    order_id: OrderId,
    product_id: ProductId,
    product_name: String,
    color: String,
    size: String,
    quantity: i32,
    unit_price: Money,
    total_price: Money,
}

impl OrderLineRow {
    fn into_line(self) -> Result<OrderLine, RepositoryError> {
        Ok(OrderLine {
            product_id: self.product_id,
            name: self.product_name,
            color: self.color,
            size: self.size,
            quantity: stored_quantity(self.quantity, "order line quantity")?,
            unit_price: self.unit_price,
            total_price: self.total_price,
        })
    }
}

async fn insert_lines(
    tx: &mut Transaction<'_, Postgres>,
    order_id: OrderId,
    lines: &[OrderLine],
) -> Result<(), RepositoryError> {
    for (position, line) in (0_i32..).zip(lines) {
        sqlx::query(
            r"
            INSERT INTO order_lines
                (order_id, position, product_id, product_name, color, size,
                 quantity, unit_price, total_price)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(order_id)
        .bind(position)
        .bind(&line.product_id)
        .bind(&line.name)
        .bind(&line.color)
        .bind(&line.size)
        .bind(quantity_param(line.quantity)?)
        .bind(line.unit_price)
        .bind(line.total_price)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn insert(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            INSERT INTO orders (
                order_number, user_id, status, payment_status,
                subtotal, tax_amount, shipping_amount, discount_amount, total_amount,
                shipping_address_id, promo_code_id, customer_email, customer_name, customer_phone,
                payment_method, delivery_method, payment_session_id, payment_intent_id,
                totals_review_required
            )
            VALUES ($1, $2, 'PENDING', $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(&order.order_number)
        .bind(order.user_id)
        .bind(order.payment_status)
        .bind(order.totals.subtotal)
        .bind(order.totals.tax)
        .bind(order.totals.shipping)
        .bind(order.totals.discount)
        .bind(order.totals.total)
        .bind(order.shipping_address_id)
        .bind(order.promo_code_id)
        .bind(&order.customer_email)
        .bind(&order.customer_name)
        .bind(&order.customer_phone)
        .bind(&order.payment_method)
        .bind(&order.delivery_method)
        .bind(&order.payment_session_id)
        .bind(&order.payment_intent_id)
        .bind(order.totals_review_required)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "order number or payment session"))?;

        insert_lines(&mut tx, row.id, &order.lines).await?;
        tx.commit().await?;

        Ok(row.into_order(order.lines.clone()))
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        self.hydrate_one(row).await
    }

    async fn find_by_payment_session(
        &self,
        session_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE payment_session_id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        self.hydrate_one(row).await
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn update_status(
        &self,
        id: OrderId,
        write: &StatusWrite,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            UPDATE orders
            SET status = $3, shipped_at = $4, delivered_at = $5,
                tracking_number = $6, carrier = $7, notes = $8, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(write.expected_status)
        .bind(write.status)
        .bind(write.shipped_at)
        .bind(write.delivered_at)
        .bind(&write.tracking_number)
        .bind(&write.carrier)
        .bind(&write.notes)
        .fetch_optional(&self.pool)
        .await?;

        self.hydrate_one(row).await
    }

    async fn flag_stock_reconciliation(&self, id: OrderId) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE orders SET stock_reconciliation_required = TRUE, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn delivered_since(&self, since: DateTime<Utc>) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE status = 'DELIVERED' AND delivered_at >= $1
            ORDER BY delivered_at
            "
        ))
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
