//! Review requests for delivered orders.
//!
//! The first time an order reaches `DELIVERED`, one pending review is created
//! per order line and the buyer gets a single email linking to all of them.
//! A periodic sweep catches delivered orders that were missed.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::Rng;
use serde::Serialize;
use tracing::instrument;

use haya_core::OrderStatus;

use crate::db::{OrderRepository, Repositories, RepositoryError, ReviewRepository};
use crate::models::{NewReview, Order};
use crate::services::notifications::{Notification, NotificationDispatcher, dispatch_best_effort};

/// Default look-back of the sweep.
pub const DEFAULT_SWEEP_WINDOW_HOURS: i64 = 72;

/// What `trigger_for_order` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewTrigger {
    /// Records created; `notified` tells whether the email went out.
    Requested { reviews: usize, notified: bool },
    /// The order already has review records.
    AlreadyRequested,
    /// The order is not delivered.
    NotDelivered,
}

/// Counts from one sweep run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// Delivered orders inside the window.
    pub processed: usize,
    /// Orders for which a review request went out.
    pub sent: usize,
    /// Orders that could not be processed or notified.
    pub failed: usize,
}

#[derive(Clone)]
pub struct ReviewService {
    reviews: Arc<dyn ReviewRepository>,
    orders: Arc<dyn OrderRepository>,
    notifier: Arc<dyn NotificationDispatcher>,
    base_url: String,
}

impl ReviewService {
    #[must_use]
    pub fn new(
        repos: &Repositories,
        notifier: Arc<dyn NotificationDispatcher>,
        base_url: &str,
    ) -> Self {
        Self {
            reviews: repos.reviews.clone(),
            orders: repos.orders.clone(),
            notifier,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Create the pending reviews of a delivered order and ask the buyer for
    /// them. Does nothing if the order already has reviews.
    ///
    /// # Errors
    ///
    /// Returns error if the review records cannot be read or written.
    #[instrument(skip(self, order), fields(order_number = %order.order_number))]
    pub async fn trigger_for_order(&self, order: &Order) -> Result<ReviewTrigger, RepositoryError> {
        if order.status != OrderStatus::Delivered {
            return Ok(ReviewTrigger::NotDelivered);
        }
        if self.reviews.exists_for_order(order.id).await? {
            tracing::debug!("Reviews already requested");
            return Ok(ReviewTrigger::AlreadyRequested);
        }

        let token = generate_token();
        let now = Utc::now();
        let records: Vec<NewReview> = order
            .lines
            .iter()
            .map(|line| NewReview {
                order_id: order.id,
                user_id: order.user_id,
                product_id: line.product_id.clone(),
                product_name: line.name.clone(),
                customer_name: order.customer_name.clone(),
                customer_email: order.customer_email.clone(),
                email_token: token.clone(),
                email_sent_at: now,
            })
            .collect();
        let created = self.reviews.insert_batch(&records).await?;

        let notification = Notification::ReviewRequest {
            to: order.customer_email.clone(),
            customer_name: order.customer_name.clone(),
            order_number: order.order_number.clone(),
            review_url: format!("{}/review?token={token}", self.base_url),
            products: order.lines.iter().map(|l| l.name.clone()).collect(),
        };
        let notified = dispatch_best_effort(self.notifier.as_ref(), &notification).await;

        tracing::info!(reviews = created.len(), notified, "Review request created");
        Ok(ReviewTrigger::Requested {
            reviews: created.len(),
            notified,
        })
    }

    /// Request reviews for every order delivered within `window` that has
    /// none yet.
    ///
    /// # Errors
    ///
    /// Returns error if the delivered orders cannot be listed. Failures on
    /// individual orders are counted, not returned.
    #[instrument(skip(self))]
    pub async fn sweep(&self, window: Duration) -> Result<SweepReport, RepositoryError> {
        let since = Utc::now() - window;
        let orders = self.orders.delivered_since(since).await?;
        let mut report = SweepReport::default();

        for order in &orders {
            match self.trigger_for_order(order).await {
                Ok(ReviewTrigger::Requested { notified: true, .. }) => {
                    report.processed += 1;
                    report.sent += 1;
                }
                Ok(ReviewTrigger::Requested { notified: false, .. }) => {
                    report.processed += 1;
                    report.failed += 1;
                }
                Ok(ReviewTrigger::AlreadyRequested | ReviewTrigger::NotDelivered) => {
                    report.processed += 1;
                }
                Err(e) => {
                    tracing::error!(
                        order_number = %order.order_number,
                        error = %e,
                        "Review request failed"
                    );
                    report.processed += 1;
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            processed = report.processed,
            sent = report.sent,
            failed = report.failed,
            "Review sweep finished"
        );
        Ok(report)
    }
}

/// 32 random bytes, hex encoded.
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use haya_core::{Email, Money, PaymentStatus, ProductId};

    use super::*;
    use crate::db::InMemoryStore;
    use crate::models::{NewOrder, OrderLine, OrderTotals, StatusWrite};
    use crate::services::notifications::MemoryNotificationDispatcher;

    async fn delivered_order(store: &Arc<InMemoryStore>) -> Order {
        let repos = Repositories::in_memory(store);
        let user = store.add_customer(Email::parse("nora@haya.test").unwrap(), "Nora", "Lef");
        let address = store.add_address(user, "5 rue Sainte", "Marseille");
        let lines = vec![
            OrderLine::new(
                ProductId::new("jupe"),
                "Jupe plissée".to_owned(),
                "Vert".to_owned(),
                "S".to_owned(),
                1,
                Money::from_minor_units(5500),
            ),
            OrderLine::new(
                ProductId::new("foulard"),
                "Foulard soie".to_owned(),
                "Rouge".to_owned(),
                "TU".to_owned(),
                1,
                Money::from_minor_units(3000),
            ),
        ];
        let order = repos
            .orders
            .insert(&NewOrder {
                order_number: "CMD-1-AAAAAA".to_owned(),
                user_id: user,
                payment_status: PaymentStatus::Paid,
                totals: OrderTotals {
                    subtotal: Money::from_minor_units(8500),
                    tax: Money::ZERO,
                    shipping: Money::ZERO,
                    discount: Money::ZERO,
                    total: Money::from_minor_units(8500),
                },
                shipping_address_id: address,
                promo_code_id: None,
                customer_email: Email::parse("nora@haya.test").unwrap(),
                customer_name: "Nora Lef".to_owned(),
                customer_phone: None,
                payment_method: "card".to_owned(),
                delivery_method: "colissimo".to_owned(),
                payment_session_id: None,
                payment_intent_id: None,
                totals_review_required: false,
                lines,
            })
            .await
            .unwrap();

        repos
            .orders
            .update_status(
                order.id,
                &StatusWrite {
                    expected_status: OrderStatus::Pending,
                    status: OrderStatus::Delivered,
                    shipped_at: None,
                    delivered_at: Some(Utc::now()),
                    tracking_number: None,
                    carrier: None,
                    notes: None,
                },
            )
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_trigger_creates_one_review_per_line_once() {
        let store = Arc::new(InMemoryStore::new());
        let notifier = Arc::new(MemoryNotificationDispatcher::new());
        let service = ReviewService::new(
            &Repositories::in_memory(&store),
            notifier.clone(),
            "https://haya.test/",
        );
        let order = delivered_order(&store).await;

        let first = service.trigger_for_order(&order).await.unwrap();
        assert_eq!(
            first,
            ReviewTrigger::Requested {
                reviews: 2,
                notified: true
            }
        );
        let second = service.trigger_for_order(&order).await.unwrap();
        assert_eq!(second, ReviewTrigger::AlreadyRequested);

        let reviews = store.reviews();
        assert_eq!(reviews.len(), 2);
        assert_eq!(reviews[0].email_token, reviews[1].email_token);
        assert_eq!(reviews[0].email_token.len(), 64);

        let sent = notifier.sent_with_template("review_request");
        assert_eq!(sent.len(), 1);
        let Notification::ReviewRequest { review_url, .. } = &sent[0] else {
            panic!("expected a review request");
        };
        assert_eq!(
            review_url,
            &format!("https://haya.test/review?token={}", reviews[0].email_token)
        );
    }

    #[tokio::test]
    async fn test_sweep_skips_old_and_already_requested_orders() {
        let store = Arc::new(InMemoryStore::new());
        let notifier = Arc::new(MemoryNotificationDispatcher::new());
        let service =
            ReviewService::new(&Repositories::in_memory(&store), notifier, "https://haya.test");
        let order = delivered_order(&store).await;

        let report = service
            .sweep(Duration::hours(DEFAULT_SWEEP_WINDOW_HOURS))
            .await
            .unwrap();
        assert_eq!(
            report,
            SweepReport {
                processed: 1,
                sent: 1,
                failed: 0
            }
        );

        let again = service
            .sweep(Duration::hours(DEFAULT_SWEEP_WINDOW_HOURS))
            .await
            .unwrap();
        assert_eq!(again.sent, 0);

        store.set_delivered_at(order.id, Utc::now() - Duration::days(10));
        let outside = service
            .sweep(Duration::hours(DEFAULT_SWEEP_WINDOW_HOURS))
            .await
            .unwrap();
        assert_eq!(outside.processed, 0);
    }
}
