//! Order creation: synchronous checkout and confirmed gateway payments.
//!
//! # Checkout
//!
//! ```text
//! rate limit → validate → customer → address → check stock → reserve
//!   → persist (release reservation on failure)
//!   → clear cart (soft) → notifications + newsletter (soft)
//! ```
//!
//! # Gateway payment
//!
//! The payment was already captured, so the order is persisted first and
//! stock is decremented afterwards. A shortfall flags the order for manual
//! stock reconciliation instead of failing it. Charged amounts that do not
//! add up are recorded as charged and flagged for review.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use haya_core::{
    AddressId, Email, Money, OrderId, PaymentStatus, ProductId, PromoCodeId, StockAvailability,
    StockLine, UserId,
};

use crate::db::{
    CollectionRepository, CustomerRepository, OrderRepository, Repositories, RepositoryError,
};
use crate::middleware::rate_limit::UserRateLimiter;
use crate::models::{Customer, NewOrder, Order, OrderLine, OrderTotals, generate_order_number};
use crate::services::inventory::{InventoryError, InventoryService};
use crate::services::notifications::{
    Notification, NotificationDispatcher, NotificationLine, dispatch_best_effort,
};

/// Attempts at finding an unused order number.
const ORDER_NUMBER_ATTEMPTS: usize = 3;

/// Errors from order creation.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("too many orders, try again later")]
    RateLimited,

    /// The authenticated identity has no customer record.
    #[error("unknown customer")]
    UnknownCustomer,

    #[error("address not found")]
    AddressNotFound,

    #[error("insufficient stock for {} line(s)", .0.len())]
    InsufficientStock(Vec<StockAvailability>),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<InventoryError> for OrderError {
    fn from(e: InventoryError) -> Self {
        match e {
            InventoryError::InsufficientStock(lines) => Self::InsufficientStock(lines),
            InventoryError::Repository(e) => Self::Repository(e),
        }
    }
}

/// One line of a checkout submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutItem {
    pub product_id: ProductId,
    pub name: String,
    pub color: String,
    pub size: String,
    pub quantity: u32,
    /// Unit price.
    pub price: Money,
}

/// Body of `POST /api/orders`. Totals are computed by the checkout UI and
/// verified here.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub items: Vec<CheckoutItem>,
    pub subtotal: Money,
    pub shipping_cost: Money,
    #[serde(default)]
    pub tax_amount: Money,
    #[serde(default)]
    pub discount_amount: Money,
    pub total_amount: Money,
    pub address_id: AddressId,
    pub delivery_method: String,
    pub payment_method: String,
    #[serde(default)]
    pub promo_code_id: Option<PromoCodeId>,
    #[serde(default)]
    pub subscribe_newsletter: bool,
}

impl CheckoutRequest {
    fn totals(&self) -> OrderTotals {
        OrderTotals {
            subtotal: self.subtotal,
            tax: self.tax_amount,
            shipping: self.shipping_cost,
            discount: self.discount_amount,
            total: self.total_amount,
        }
    }
}

/// Result of a successful checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedOrder {
    pub order_id: OrderId,
    pub order_number: String,
}

/// A payment confirmed by the gateway, decoded from its checkout metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfirmation {
    /// Gateway checkout session id (idempotency key).
    pub session_id: String,
    pub payment_intent_id: Option<String>,
    pub user_id: UserId,
    pub address_id: AddressId,
    pub delivery_method: String,
    pub payment_method: String,
    pub promo_code_id: Option<PromoCodeId>,
    pub subscribe_newsletter: bool,
    pub items: Vec<CheckoutItem>,
    pub totals: OrderTotals,
}

/// Result of processing a confirmed payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Created(Order),
    /// An order already exists for this payment session.
    Duplicate,
}

/// Builds orders from checkout submissions and gateway confirmations.
#[derive(Clone)]
pub struct OrderOrchestrator {
    orders: Arc<dyn OrderRepository>,
    customers: Arc<dyn CustomerRepository>,
    collections: Arc<dyn CollectionRepository>,
    inventory: InventoryService,
    notifier: Arc<dyn NotificationDispatcher>,
    rate_limiter: Arc<UserRateLimiter>,
    operator_email: Email,
}

impl OrderOrchestrator {
    #[must_use]
    pub fn new(
        repos: &Repositories,
        inventory: InventoryService,
        notifier: Arc<dyn NotificationDispatcher>,
        rate_limiter: Arc<UserRateLimiter>,
        operator_email: Email,
    ) -> Self {
        Self {
            orders: repos.orders.clone(),
            customers: repos.customers.clone(),
            collections: repos.collections.clone(),
            inventory,
            notifier,
            rate_limiter,
            operator_email,
        }
    }

    /// Create an order from a checkout submission.
    ///
    /// Nothing is written unless every check passes and the stock
    /// reservation succeeds.
    ///
    /// # Errors
    ///
    /// Returns `RateLimited`, `Validation`, `UnknownCustomer`,
    /// `AddressNotFound` or `InsufficientStock` before anything is written,
    /// and `Repository` if the order cannot be persisted.
    #[instrument(skip(self, request), fields(user_id = %user_id, lines = request.items.len()))]
    pub async fn place_order(
        &self,
        user_id: UserId,
        request: CheckoutRequest,
    ) -> Result<PlacedOrder, OrderError> {
        if !self.rate_limiter.check(user_id) {
            return Err(OrderError::RateLimited);
        }

        require_non_empty("deliveryMethod", &request.delivery_method)?;
        require_non_empty("paymentMethod", &request.payment_method)?;
        let totals = request.totals();
        let lines = snapshot_lines(&request.items)?;
        totals.validate(&lines).map_err(OrderError::Validation)?;

        let customer = self.resolve_customer(user_id).await?;
        self.customers
            .address(user_id, request.address_id)
            .await?
            .ok_or(OrderError::AddressNotFound)?;

        let stock_lines: Vec<StockLine> = lines.iter().map(OrderLine::stock_line).collect();
        let unavailable: Vec<StockAvailability> = self
            .inventory
            .check_availability(&stock_lines)
            .await?
            .into_iter()
            .filter(|line| !line.is_available())
            .collect();
        if !unavailable.is_empty() {
            return Err(OrderError::InsufficientStock(unavailable));
        }

        self.inventory.reserve(&stock_lines).await?;

        let draft = NewOrder {
            order_number: generate_order_number(Utc::now()),
            user_id,
            payment_status: PaymentStatus::Paid,
            totals,
            shipping_address_id: request.address_id,
            promo_code_id: request.promo_code_id,
            customer_email: customer.email.clone(),
            customer_name: customer.display_name(),
            customer_phone: customer.phone.clone(),
            payment_method: request.payment_method.trim().to_owned(),
            delivery_method: request.delivery_method.trim().to_owned(),
            payment_session_id: None,
            payment_intent_id: None,
            totals_review_required: false,
            lines,
        };

        let order = match self.insert_with_fresh_number(draft).await {
            Ok(order) => order,
            Err(e) => {
                if let Err(release) = self.inventory.increment(&stock_lines).await {
                    tracing::error!(
                        error = %release,
                        "Failed to release stock reservation after order insert failure"
                    );
                }
                return Err(e.into());
            }
        };

        tracing::info!(order_number = %order.order_number, "Order created from checkout");

        self.after_create(&order, request.subscribe_newsletter)
            .await;

        Ok(PlacedOrder {
            order_id: order.id,
            order_number: order.order_number,
        })
    }

    /// Create the order for a payment confirmed by the gateway.
    ///
    /// Idempotent on the payment session id.
    ///
    /// # Errors
    ///
    /// Returns `Validation` when there are no usable lines,
    /// `UnknownCustomer` or `AddressNotFound` for unusable confirmations,
    /// `Repository` if the order cannot be persisted.
    #[instrument(skip(self, payment), fields(session_id = %payment.session_id, user_id = %payment.user_id))]
    pub async fn create_from_payment(
        &self,
        payment: PaymentConfirmation,
    ) -> Result<PaymentOutcome, OrderError> {
        if self
            .orders
            .find_by_payment_session(&payment.session_id)
            .await?
            .is_some()
        {
            tracing::info!("Order already exists for payment session");
            return Ok(PaymentOutcome::Duplicate);
        }

        let lines = snapshot_lines(&payment.items)?;
        let (totals, mismatch) = charged_totals(payment.totals, &lines);
        if let Some(reason) = &mismatch {
            tracing::error!(reason = %reason, "Charged amounts do not match the order lines");
        }
        let customer = self.resolve_customer(payment.user_id).await?;
        self.customers
            .address(payment.user_id, payment.address_id)
            .await?
            .ok_or(OrderError::AddressNotFound)?;

        let draft = NewOrder {
            order_number: generate_order_number(Utc::now()),
            user_id: payment.user_id,
            payment_status: PaymentStatus::Paid,
            totals,
            shipping_address_id: payment.address_id,
            promo_code_id: payment.promo_code_id,
            customer_email: customer.email.clone(),
            customer_name: customer.display_name(),
            customer_phone: customer.phone.clone(),
            payment_method: payment.payment_method.clone(),
            delivery_method: payment.delivery_method.clone(),
            payment_session_id: Some(payment.session_id.clone()),
            payment_intent_id: payment.payment_intent_id.clone(),
            totals_review_required: mismatch.is_some(),
            lines,
        };

        let order = match self.insert_with_fresh_number(draft).await {
            Ok(order) => order,
            Err(RepositoryError::Conflict(what)) => {
                if self
                    .orders
                    .find_by_payment_session(&payment.session_id)
                    .await?
                    .is_some()
                {
                    tracing::info!("Concurrent delivery already created the order");
                    return Ok(PaymentOutcome::Duplicate);
                }
                return Err(RepositoryError::Conflict(what).into());
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(order_number = %order.order_number, "Order created from payment");

        self.decrement_after_payment(&order).await;
        self.after_create(&order, payment.subscribe_newsletter)
            .await;

        Ok(PaymentOutcome::Created(order))
    }

    async fn resolve_customer(&self, user_id: UserId) -> Result<Customer, OrderError> {
        self.customers
            .get(user_id)
            .await?
            .ok_or(OrderError::UnknownCustomer)
    }

    /// Insert, drawing a new order number on collision. A conflict on the
    /// payment session id is returned as-is.
    async fn insert_with_fresh_number(&self, mut draft: NewOrder) -> Result<Order, RepositoryError> {
        let mut attempt = 1;
        loop {
            match self.orders.insert(&draft).await {
                Err(RepositoryError::Conflict(what)) if attempt < ORDER_NUMBER_ATTEMPTS => {
                    if let Some(session) = &draft.payment_session_id
                        && self.orders.find_by_payment_session(session).await?.is_some()
                    {
                        return Err(RepositoryError::Conflict(what));
                    }
                    tracing::warn!(order_number = %draft.order_number, "Order number collision");
                    draft.order_number = generate_order_number(Utc::now());
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn decrement_after_payment(&self, order: &Order) {
        let flag = match self.inventory.decrement(&order.stock_lines()).await {
            Ok(shortfalls) if shortfalls.is_empty() => false,
            Ok(shortfalls) => {
                let variants: Vec<String> =
                    shortfalls.iter().map(|l| l.key().to_string()).collect();
                tracing::error!(
                    order_number = %order.order_number,
                    variants = ?variants,
                    "Stock shortfall on paid order"
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    order_number = %order.order_number,
                    error = %e,
                    "Failed to decrement stock for paid order"
                );
                true
            }
        };

        if flag && let Err(e) = self.orders.flag_stock_reconciliation(order.id).await {
            tracing::error!(
                order_number = %order.order_number,
                error = %e,
                "Failed to flag order for stock reconciliation"
            );
        }
    }

    /// Post-commit steps. Failures are logged only.
    async fn after_create(&self, order: &Order, subscribe_newsletter: bool) {
        if let Err(e) = self.collections.clear_cart(order.user_id).await {
            tracing::warn!(order_number = %order.order_number, error = %e, "Failed to clear cart");
        }

        let confirmation = Notification::OrderConfirmation {
            to: order.customer_email.clone(),
            customer_name: order.customer_name.clone(),
            order_number: order.order_number.clone(),
            total: order.totals.total,
            lines: order
                .lines
                .iter()
                .map(|l| NotificationLine {
                    name: l.name.clone(),
                    color: l.color.clone(),
                    size: l.size.clone(),
                    quantity: l.quantity,
                    total_price: l.total_price,
                })
                .collect(),
        };
        let operator = Notification::OperatorNewOrder {
            to: self.operator_email.clone(),
            order_number: order.order_number.clone(),
            customer_name: order.customer_name.clone(),
            customer_email: order.customer_email.clone(),
            total: order.totals.total,
            delivery_method: order.delivery_method.clone(),
        };
        let newsletter = async {
            if !subscribe_newsletter {
                return;
            }
            if let Err(e) = self.customers.set_newsletter(order.user_id, true).await {
                tracing::warn!(user_id = %order.user_id, error = %e, "Newsletter subscription failed");
            }
        };

        tokio::join!(
            dispatch_best_effort(self.notifier.as_ref(), &confirmation),
            dispatch_best_effort(self.notifier.as_ref(), &operator),
            newsletter,
        );
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), OrderError> {
    if value.trim().is_empty() {
        return Err(OrderError::Validation(format!("{field} is required")));
    }
    Ok(())
}

/// Snapshot the submitted lines.
fn snapshot_lines(items: &[CheckoutItem]) -> Result<Vec<OrderLine>, OrderError> {
    if items.is_empty() {
        return Err(OrderError::Validation("order has no items".to_owned()));
    }

    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        if item.quantity == 0 {
            return Err(OrderError::Validation(format!(
                "quantity must be at least 1 for {}",
                item.product_id
            )));
        }
        if item.price.is_negative() {
            return Err(OrderError::Validation(format!(
                "price must not be negative for {}",
                item.product_id
            )));
        }
        lines.push(OrderLine::new(
            item.product_id.clone(),
            item.name.clone(),
            item.color.clone(),
            item.size.clone(),
            item.quantity,
            item.price,
        ));
    }

    Ok(lines)
}

/// Totals to record for a captured payment.
///
/// Shipping billed as a gateway line item arrives inside the subtotal with
/// no separate shipping amount; it is moved back to `shipping`. If the
/// amounts still do not add up they are kept as charged and the reason is
/// returned.
fn charged_totals(charged: OrderTotals, lines: &[OrderLine]) -> (OrderTotals, Option<String>) {
    let lines_total: Money = lines.iter().map(|l| l.total_price).sum();
    let mut totals = charged;
    if totals.shipping == Money::ZERO && totals.subtotal > lines_total {
        totals.shipping = totals.subtotal - lines_total;
        totals.subtotal = lines_total;
    }
    match totals.validate(lines) {
        Ok(()) => (totals, None),
        Err(reason) => (charged, Some(reason)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::num::NonZeroU32;

    use haya_core::{CartLine, OrderStatus, VariantKey};

    use super::*;
    use crate::db::InMemoryStore;
    use crate::services::notifications::MemoryNotificationDispatcher;

    struct Fixture {
        store: Arc<InMemoryStore>,
        notifier: Arc<MemoryNotificationDispatcher>,
        orchestrator: OrderOrchestrator,
        user: UserId,
        address: AddressId,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let repos = Repositories::in_memory(&store);
        let notifier = Arc::new(MemoryNotificationDispatcher::new());
        let orchestrator = OrderOrchestrator::new(
            &repos,
            InventoryService::new(repos.inventory.clone()),
            notifier.clone(),
            Arc::new(UserRateLimiter::orders(NonZeroU32::new(5).unwrap())),
            Email::parse("boutique@haya.test").unwrap(),
        );
        let user = store.add_customer(Email::parse("lea@haya.test").unwrap(), "Léa", "Morel");
        let address = store.add_address(user, "12 rue des Lilas", "Lyon");
        store.set_stock(key(), 2);
        Fixture {
            store,
            notifier,
            orchestrator,
            user,
            address,
        }
    }

    fn key() -> VariantKey {
        VariantKey::new("pull-laine", "Écru", "M")
    }

    fn item(quantity: u32) -> CheckoutItem {
        CheckoutItem {
            product_id: ProductId::new("pull-laine"),
            name: "Pull en laine".to_owned(),
            color: "Écru".to_owned(),
            size: "M".to_owned(),
            quantity,
            price: Money::from_minor_units(8900),
        }
    }

    fn checkout(address: AddressId, quantity: u32) -> CheckoutRequest {
        let subtotal = Money::from_minor_units(8900) * quantity;
        let shipping = Money::from_minor_units(490);
        CheckoutRequest {
            items: vec![item(quantity)],
            subtotal,
            shipping_cost: shipping,
            tax_amount: Money::ZERO,
            discount_amount: Money::ZERO,
            total_amount: subtotal + shipping,
            address_id: address,
            delivery_method: "colissimo".to_owned(),
            payment_method: "card".to_owned(),
            promo_code_id: None,
            subscribe_newsletter: true,
        }
    }

    #[tokio::test]
    async fn test_place_order_reserves_stock_and_clears_cart() {
        let f = fixture();
        let repos = Repositories::in_memory(&f.store);
        repos
            .collections
            .save_cart(
                f.user,
                &[CartLine {
                    product_id: ProductId::new("pull-laine"),
                    name: "Pull en laine".to_owned(),
                    slug: "pull-laine".to_owned(),
                    image: None,
                    price: Money::from_minor_units(8900),
                    original_price: None,
                    color: "Écru".to_owned(),
                    size: "M".to_owned(),
                    quantity: 2,
                    max_quantity: 2,
                }],
            )
            .await
            .unwrap();

        let placed = f
            .orchestrator
            .place_order(f.user, checkout(f.address, 2))
            .await
            .unwrap();

        assert!(placed.order_number.starts_with("CMD-"));
        assert_eq!(f.store.stock(&key()), Some(0));
        assert!(repos.collections.load_cart(f.user).await.unwrap().is_empty());

        let order = &f.store.orders()[0];
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.customer_name, "Léa Morel");
        assert!(f.store.customer(f.user).unwrap().newsletter);
        assert_eq!(f.notifier.sent_with_template("order_confirmation").len(), 1);
        assert_eq!(f.notifier.sent_with_template("operator_new_order").len(), 1);
    }

    #[tokio::test]
    async fn test_place_order_rejects_foreign_address() {
        let f = fixture();
        let other = f
            .store
            .add_customer(Email::parse("marc@haya.test").unwrap(), "Marc", "Petit");
        let foreign = f.store.add_address(other, "3 quai Perrache", "Lyon");

        let err = f
            .orchestrator
            .place_order(f.user, checkout(foreign, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::AddressNotFound));
        assert_eq!(f.store.stock(&key()), Some(2));
    }

    #[tokio::test]
    async fn test_place_order_validates_totals_before_anything() {
        let f = fixture();
        let mut request = checkout(f.address, 1);
        request.total_amount = Money::from_minor_units(100);

        let err = f.orchestrator.place_order(f.user, request).await.unwrap_err();
        assert!(matches!(err, OrderError::Validation(_)));
        assert!(f.store.orders().is_empty());
    }

    #[tokio::test]
    async fn test_place_order_reports_unavailable_lines() {
        let f = fixture();
        let err = f
            .orchestrator
            .place_order(f.user, checkout(f.address, 3))
            .await
            .unwrap_err();

        let OrderError::InsufficientStock(lines) = err else {
            panic!("expected insufficient stock");
        };
        assert_eq!(lines[0].available, 2);
        assert_eq!(f.store.stock(&key()), Some(2));
    }

    #[tokio::test]
    async fn test_failed_insert_releases_reservation() {
        let f = fixture();
        f.store.fail_order_writes(true);

        let err = f
            .orchestrator
            .place_order(f.user, checkout(f.address, 2))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Repository(_)));
        assert_eq!(f.store.stock(&key()), Some(2));
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_order() {
        let f = fixture();
        f.notifier.set_failing(true);
        assert!(
            f.orchestrator
                .place_order(f.user, checkout(f.address, 1))
                .await
                .is_ok()
        );
        assert_eq!(f.store.orders().len(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit() {
        let f = fixture();
        f.store.set_stock(key(), 100);
        for _ in 0..5 {
            f.orchestrator
                .place_order(f.user, checkout(f.address, 1))
                .await
                .unwrap();
        }
        let err = f
            .orchestrator
            .place_order(f.user, checkout(f.address, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::RateLimited));
    }

    fn payment(f: &Fixture, session: &str, quantity: u32) -> PaymentConfirmation {
        let request = checkout(f.address, quantity);
        PaymentConfirmation {
            session_id: session.to_owned(),
            payment_intent_id: Some("pi_123".to_owned()),
            user_id: f.user,
            address_id: f.address,
            delivery_method: "colissimo".to_owned(),
            payment_method: "card".to_owned(),
            promo_code_id: None,
            subscribe_newsletter: false,
            totals: request.totals(),
            items: request.items,
        }
    }

    #[tokio::test]
    async fn test_payment_is_idempotent() {
        let f = fixture();
        let first = f
            .orchestrator
            .create_from_payment(payment(&f, "cs_test_1", 1))
            .await
            .unwrap();
        assert!(matches!(first, PaymentOutcome::Created(_)));

        let second = f
            .orchestrator
            .create_from_payment(payment(&f, "cs_test_1", 1))
            .await
            .unwrap();
        assert_eq!(second, PaymentOutcome::Duplicate);
        assert_eq!(f.store.orders().len(), 1);
        assert_eq!(f.store.stock(&key()), Some(1));
    }

    #[tokio::test]
    async fn test_concurrent_redelivery_creates_one_order() {
        let f = fixture();
        let (first, second) = tokio::join!(
            f.orchestrator
                .create_from_payment(payment(&f, "cs_test_race", 1)),
            f.orchestrator
                .create_from_payment(payment(&f, "cs_test_race", 1)),
        );

        let outcomes = [first.unwrap(), second.unwrap()];
        let created = outcomes
            .iter()
            .filter(|o| matches!(o, PaymentOutcome::Created(_)))
            .count();
        let duplicates = outcomes
            .iter()
            .filter(|o| **o == PaymentOutcome::Duplicate)
            .count();
        assert_eq!((created, duplicates), (1, 1));
        assert_eq!(f.store.orders().len(), 1);
        assert_eq!(f.store.stock(&key()), Some(1));
    }

    #[tokio::test]
    async fn test_payment_with_shipping_inside_subtotal() {
        let f = fixture();
        let mut confirmation = payment(&f, "cs_test_3", 1);
        confirmation.totals.subtotal = Money::from_minor_units(9390);
        confirmation.totals.shipping = Money::ZERO;

        let PaymentOutcome::Created(order) = f
            .orchestrator
            .create_from_payment(confirmation)
            .await
            .unwrap()
        else {
            panic!("expected a new order");
        };
        assert_eq!(order.totals.subtotal, Money::from_minor_units(8900));
        assert_eq!(order.totals.shipping, Money::from_minor_units(490));
        assert_eq!(order.totals.total, Money::from_minor_units(9390));
        assert!(!order.totals_review_required);
    }

    #[tokio::test]
    async fn test_payment_with_mismatched_totals_is_kept_and_flagged() {
        let f = fixture();
        let mut confirmation = payment(&f, "cs_test_4", 1);
        confirmation.totals.total = Money::from_minor_units(100);

        let outcome = f
            .orchestrator
            .create_from_payment(confirmation)
            .await
            .unwrap();
        assert!(matches!(outcome, PaymentOutcome::Created(_)));

        let stored = f.store.orders();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].totals_review_required);
        assert_eq!(stored[0].totals.total, Money::from_minor_units(100));
        assert_eq!(f.store.stock(&key()), Some(1));
    }

    #[tokio::test]
    async fn test_payment_shortfall_flags_order() {
        let f = fixture();
        let outcome = f
            .orchestrator
            .create_from_payment(payment(&f, "cs_test_2", 3))
            .await
            .unwrap();

        let PaymentOutcome::Created(order) = outcome else {
            panic!("expected a new order");
        };
        assert_eq!(f.store.stock(&key()), Some(2));
        let stored = f.store.orders();
        assert_eq!(stored[0].id, order.id);
        assert!(stored[0].stock_reconciliation_required);
    }
}
