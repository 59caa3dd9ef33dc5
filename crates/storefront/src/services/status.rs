//! Order status transitions and their side effects.
//!
//! ```text
//! PENDING → PROCESSING → SHIPPED → DELIVERED
//!     └──────────┴───────────┴─────────┴──→ CANCELLED | REFUNDED
//! ```
//!
//! The status write is a compare-and-set on the status that was read, so two
//! concurrent updates cannot both apply side effects. Side effects (stock
//! release, review request, buyer email) run after the write and never undo
//! it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

use haya_core::{OrderId, OrderStatus};

use crate::db::{OrderRepository, Repositories, RepositoryError};
use crate::models::{Order, StatusWrite};
use crate::services::inventory::InventoryService;
use crate::services::notifications::{Notification, NotificationDispatcher, dispatch_best_effort};
use crate::services::reviews::ReviewService;

/// Errors from status updates.
#[derive(Debug, Error)]
pub enum StatusError {
    #[error("order not found")]
    NotFound,

    #[error("validation error: {0}")]
    Validation(String),

    /// The order changed between read and write.
    #[error("order was modified concurrently")]
    Conflict,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Body of `PUT /api/admin/orders/{id}`.
///
/// Absent fields are left unchanged; an empty string clears a text field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default = "default_send_email")]
    pub send_email: bool,
}

const fn default_send_email() -> bool {
    true
}

impl Default for StatusUpdate {
    fn default() -> Self {
        Self {
            status: None,
            notes: None,
            tracking_number: None,
            carrier: None,
            send_email: true,
        }
    }
}

impl StatusUpdate {
    #[must_use]
    pub fn to(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// The write and side effects derived from an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    pub write: StatusWrite,
    pub release_stock: bool,
    pub trigger_reviews: bool,
    pub notify: bool,
}

/// Work out the write for `update` applied to `order`.
///
/// # Errors
///
/// Returns `Validation` when leaving a terminal status for a non-terminal one.
pub fn plan_transition(
    order: &Order,
    update: &StatusUpdate,
    now: DateTime<Utc>,
) -> Result<TransitionPlan, StatusError> {
    let old = order.status;
    let new = update.status.unwrap_or(old);

    if old.is_terminal() && !new.is_terminal() {
        return Err(StatusError::Validation(format!(
            "a {old} order cannot move back to {new}"
        )));
    }

    let changed = new != old;
    let (mut shipped_at, mut delivered_at) = (order.shipped_at, order.delivered_at);
    if changed {
        match new {
            OrderStatus::Pending => {
                shipped_at = None;
                delivered_at = None;
            }
            OrderStatus::Shipped => {
                shipped_at = shipped_at.or(Some(now));
                delivered_at = None;
            }
            OrderStatus::Delivered => delivered_at = delivered_at.or(Some(now)),
            OrderStatus::Processing | OrderStatus::Cancelled | OrderStatus::Refunded => {}
        }
    }

    Ok(TransitionPlan {
        write: StatusWrite {
            expected_status: old,
            status: new,
            shipped_at,
            delivered_at,
            tracking_number: updated_text(update.tracking_number.as_deref(), &order.tracking_number),
            carrier: updated_text(update.carrier.as_deref(), &order.carrier),
            notes: updated_text(update.notes.as_deref(), &order.notes),
        },
        release_stock: changed && new.is_terminal() && !old.is_terminal(),
        trigger_reviews: changed && new == OrderStatus::Delivered,
        notify: changed && update.send_email,
    })
}

fn updated_text(update: Option<&str>, current: &Option<String>) -> Option<String> {
    match update.map(str::trim) {
        None => current.clone(),
        Some("") => None,
        Some(value) => Some(value.to_owned()),
    }
}

/// Public tracking page of a shipment, for the supported carriers.
#[must_use]
pub fn tracking_url(carrier: &str, tracking_number: &str) -> Option<String> {
    let number = tracking_number.trim();
    if number.is_empty() {
        return None;
    }

    let carrier = carrier.trim().to_lowercase().replace([' ', '_'], "-");
    let url = match carrier.as_str() {
        "colissimo" => format!("https://www.laposte.fr/outils/suivre-vos-envois?code={number}"),
        "chronopost" => {
            format!("https://www.chronopost.fr/tracking-colis?listeNumerosLT={number}")
        }
        "mondial-relay" => {
            format!("https://www.mondialrelay.fr/suivi-de-colis?numeroExpedition={number}")
        }
        "dpd" => format!("https://www.dpd.fr/tracer/{number}"),
        "ups" => format!("https://www.ups.com/track?tracknum={number}"),
        "fedex" => format!("https://www.fedex.com/fr-fr/tracking.html?tracknumbers={number}"),
        _ => return None,
    };
    Some(url)
}

/// Applies status updates to orders.
#[derive(Clone)]
pub struct StatusMachine {
    orders: Arc<dyn OrderRepository>,
    inventory: InventoryService,
    reviews: ReviewService,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl StatusMachine {
    #[must_use]
    pub fn new(
        repos: &Repositories,
        inventory: InventoryService,
        reviews: ReviewService,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            orders: repos.orders.clone(),
            inventory,
            reviews,
            notifier,
        }
    }

    /// Apply `update` to an order and run the resulting side effects.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `Validation` for forbidden transitions, `Conflict`
    /// when another update won the race, `Repository` if the write fails.
    #[instrument(skip(self, update), fields(order_id = %order_id, status = ?update.status))]
    pub async fn update(&self, order_id: OrderId, update: StatusUpdate) -> Result<Order, StatusError> {
        let order = self.orders.get(order_id).await?.ok_or(StatusError::NotFound)?;
        let plan = plan_transition(&order, &update, Utc::now())?;

        let updated = self
            .orders
            .update_status(order_id, &plan.write)
            .await?
            .ok_or(StatusError::Conflict)?;

        if plan.write.status != order.status {
            tracing::info!(
                order_number = %updated.order_number,
                from = %order.status,
                to = %updated.status,
                "Order status changed"
            );
        }

        if plan.release_stock {
            self.release_stock(&updated).await;
        }
        if plan.trigger_reviews
            && let Err(e) = self.reviews.trigger_for_order(&updated).await
        {
            tracing::warn!(
                order_number = %updated.order_number,
                error = %e,
                "Failed to request reviews"
            );
        }
        if plan.notify {
            self.notify_buyer(&updated).await;
        }

        Ok(updated)
    }

    async fn release_stock(&self, order: &Order) {
        match self.inventory.increment(&order.stock_lines()).await {
            Ok(()) => tracing::info!(order_number = %order.order_number, "Stock released"),
            Err(e) => tracing::error!(
                order_number = %order.order_number,
                error = %e,
                "Failed to release stock"
            ),
        }
    }

    async fn notify_buyer(&self, order: &Order) {
        let url = match (&order.carrier, &order.tracking_number) {
            (Some(carrier), Some(number)) => tracking_url(carrier, number),
            _ => None,
        };
        let notification = Notification::StatusUpdate {
            to: order.customer_email.clone(),
            customer_name: order.customer_name.clone(),
            order_number: order.order_number.clone(),
            status: order.status,
            status_label: order.status.label().to_owned(),
            tracking_number: order.tracking_number.clone(),
            carrier: order.carrier.clone(),
            tracking_url: url,
        };
        dispatch_best_effort(self.notifier.as_ref(), &notification).await;
    }
}
