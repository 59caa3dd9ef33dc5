//! Payment gateway webhook processing.
//!
//! Events are signed with HMAC-SHA256 over `"{timestamp}.{raw body}"` and the
//! signature is sent as `t={timestamp},v1={hex}`. Only
//! `checkout.session.completed` is acted upon; everything else is
//! acknowledged and ignored.
//!
//! Redeliveries are expected. The payment session id is the idempotency key:
//! a short-lived cache answers recent repeats, and the unique index on
//! `orders.payment_session_id` settles the rest.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use hmac::{Hmac, Mac};
use moka::future::Cache;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::instrument;

use haya_core::{AddressId, Money, PromoCodeId, UserId};

use crate::config::PaymentConfig;
use crate::models::OrderTotals;
use crate::services::orders::{
    CheckoutItem, OrderError, OrderOrchestrator, PaymentConfirmation, PaymentOutcome,
};

/// Header carrying the event signature.
pub const SIGNATURE_HEADER: &str = "payment-signature";

/// Event type that creates an order.
pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

/// Payment method recorded on orders created from the gateway.
const GATEWAY_PAYMENT_METHOD: &str = "card";

type HmacSha256 = Hmac<Sha256>;

/// Errors from webhook processing.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Missing, stale or wrong signature.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Payload could not be turned into an order.
    #[error("malformed event: {0}")]
    Malformed(String),

    /// The order could not be persisted.
    #[error("processing failed: {0}")]
    Processing(String),
}

/// What happened to a verified event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Created { order_number: String },
    Duplicate,
    Ignored,
}

#[derive(Debug, Deserialize)]
struct Event {
    #[serde(rename = "type")]
    kind: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CheckoutSession {
    id: String,
    #[serde(default)]
    payment_intent: Option<String>,
    amount_subtotal: Option<i64>,
    amount_total: Option<i64>,
    #[serde(default)]
    total_details: Option<TotalDetails>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct TotalDetails {
    #[serde(default)]
    amount_shipping: i64,
    #[serde(default)]
    amount_tax: i64,
    #[serde(default)]
    amount_discount: i64,
}

/// Verifies and processes gateway events.
#[derive(Clone)]
pub struct WebhookHandler {
    secret: SecretString,
    tolerance: Duration,
    orchestrator: OrderOrchestrator,
    processed: Cache<String, ()>,
}

impl WebhookHandler {
    #[must_use]
    pub fn new(config: &PaymentConfig, orchestrator: OrderOrchestrator) -> Self {
        let processed = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(60 * 60))
            .build();

        Self {
            secret: config.webhook_secret.clone(),
            tolerance: config.signature_tolerance,
            orchestrator,
            processed,
        }
    }

    /// Verify, decode and process one event.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSignature` or `Malformed` for events that must not be
    /// retried as-is, `Processing` when the order could not be persisted.
    #[instrument(skip_all)]
    pub async fn handle(
        &self,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<WebhookOutcome, WebhookError> {
        let signature = signature
            .ok_or_else(|| WebhookError::InvalidSignature("missing signature header".to_owned()))?;
        self.verify_signature(signature, body, unix_now()?)?;

        let event: Event = serde_json::from_slice(body)
            .map_err(|e| WebhookError::Malformed(format!("invalid event: {e}")))?;

        if event.kind != CHECKOUT_COMPLETED {
            tracing::debug!(event_type = %event.kind, "Ignoring webhook event");
            return Ok(WebhookOutcome::Ignored);
        }

        let session: CheckoutSession = serde_json::from_value(event.data.object)
            .map_err(|e| WebhookError::Malformed(format!("invalid checkout session: {e}")))?;

        if self.processed.contains_key(&session.id) {
            tracing::info!(session_id = %session.id, "Payment session already processed");
            return Ok(WebhookOutcome::Duplicate);
        }

        let session_id = session.id.clone();
        let confirmation = decode_confirmation(session)?;

        let outcome = match self.orchestrator.create_from_payment(confirmation).await {
            Ok(PaymentOutcome::Created(order)) => WebhookOutcome::Created {
                order_number: order.order_number,
            },
            Ok(PaymentOutcome::Duplicate) => WebhookOutcome::Duplicate,
            Err(e @ (OrderError::Repository(_) | OrderError::RateLimited)) => {
                return Err(WebhookError::Processing(e.to_string()));
            }
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Unusable paid checkout");
                return Err(WebhookError::Malformed(e.to_string()));
            }
        };

        self.processed.insert(session_id, ()).await;
        Ok(outcome)
    }

    /// Check a `t=…,v1=…` signature header against the raw body.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSignature` if the header is malformed, the timestamp
    /// is outside the tolerance, or no `v1` signature matches.
    pub fn verify_signature(&self, header: &str, body: &[u8], now: i64) -> Result<(), WebhookError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = Some(value),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| WebhookError::InvalidSignature("missing timestamp".to_owned()))?;
        let ts: i64 = timestamp
            .parse()
            .map_err(|_| WebhookError::InvalidSignature("invalid timestamp".to_owned()))?;

        if now.abs_diff(ts) > self.tolerance.as_secs() {
            return Err(WebhookError::InvalidSignature(
                "timestamp outside tolerance".to_owned(),
            ));
        }

        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|e| WebhookError::InvalidSignature(e.to_string()))?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);
        let expected = hex::encode(mac.finalize().into_bytes());

        if !signatures
            .iter()
            .any(|candidate| constant_time_compare(&expected, candidate))
        {
            return Err(WebhookError::InvalidSignature("signature mismatch".to_owned()));
        }

        tracing::debug!("Webhook signature verified");
        Ok(())
    }
}

/// Build the signature header for `body` at `timestamp`.
#[must_use]
pub fn sign_payload(secret: &str, timestamp: i64, body: &[u8]) -> String {
    HmacSha256::new_from_slice(secret.as_bytes())
        .map(|mut mac| {
            mac.update(timestamp.to_string().as_bytes());
            mac.update(b".");
            mac.update(body);
            format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
        })
        .unwrap_or_default()
}

fn unix_now() -> Result<i64, WebhookError> {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| WebhookError::InvalidSignature(e.to_string()))?
        .as_secs();
    i64::try_from(secs).map_err(|_| WebhookError::InvalidSignature("system time overflow".to_owned()))
}

/// Constant-time string comparison to prevent timing attacks.
pub(crate) fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

fn decode_confirmation(session: CheckoutSession) -> Result<PaymentConfirmation, WebhookError> {
    let meta = &session.metadata;
    let required = |key: &str| {
        meta.get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| WebhookError::Malformed(format!("missing metadata {key}")))
    };
    let parse_id = |key: &str| -> Result<i32, WebhookError> {
        required(key)?
            .parse()
            .map_err(|_| WebhookError::Malformed(format!("invalid metadata {key}")))
    };

    let user_id = UserId::new(parse_id("userId")?);
    let address_id = AddressId::new(parse_id("selectedAddressId")?);
    let delivery_method = required("selectedDelivery")?.to_owned();
    let promo_code_id = match meta.get("promoCodeId").map(|v| v.trim()) {
        None | Some("") => None,
        Some(_) => Some(PromoCodeId::new(parse_id("promoCodeId")?)),
    };
    let subscribe_newsletter = meta
        .get("subscribeNewsletter")
        .is_some_and(|v| v.trim() == "true");
    let items: Vec<CheckoutItem> = serde_json::from_str(required("cartItems")?)
        .map_err(|e| WebhookError::Malformed(format!("invalid metadata cartItems: {e}")))?;

    let subtotal = session
        .amount_subtotal
        .ok_or_else(|| WebhookError::Malformed("missing amount_subtotal".to_owned()))?;
    let total = session
        .amount_total
        .ok_or_else(|| WebhookError::Malformed("missing amount_total".to_owned()))?;
    let details = session.total_details.unwrap_or_default();

    let discount = if details.amount_discount > 0 {
        Money::from_minor_units(details.amount_discount)
    } else {
        meta.get("promoDiscount")
            .and_then(|v| Decimal::from_str(v.trim()).ok())
            .map_or(Money::ZERO, |d| Money::new(d).round_to_cents())
    };

    Ok(PaymentConfirmation {
        session_id: session.id,
        payment_intent_id: session.payment_intent,
        user_id,
        address_id,
        delivery_method,
        payment_method: GATEWAY_PAYMENT_METHOD.to_owned(),
        promo_code_id,
        subscribe_newsletter,
        items,
        totals: OrderTotals {
            subtotal: Money::from_minor_units(subtotal),
            tax: Money::from_minor_units(details.amount_tax),
            shipping: Money::from_minor_units(details.amount_shipping),
            discount,
            total: Money::from_minor_units(total),
        },
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::num::NonZeroU32;
    use std::sync::Arc;

    use haya_core::{Email, VariantKey};
    use serde_json::json;

    use super::*;
    use crate::db::{InMemoryStore, Repositories};
    use crate::middleware::rate_limit::UserRateLimiter;
    use crate::services::inventory::InventoryService;
    use crate::services::notifications::MemoryNotificationDispatcher;

    const SECRET: &str = "whsec_Q8v2Lm1xN4";

    fn handler(store: &Arc<InMemoryStore>) -> WebhookHandler {
        let repos = Repositories::in_memory(store);
        let orchestrator = OrderOrchestrator::new(
            &repos,
            InventoryService::new(repos.inventory.clone()),
            Arc::new(MemoryNotificationDispatcher::new()),
            Arc::new(UserRateLimiter::orders(NonZeroU32::new(5).unwrap())),
            Email::parse("boutique@haya.test").unwrap(),
        );
        WebhookHandler::new(
            &PaymentConfig {
                webhook_secret: SecretString::from(SECRET.to_string()),
                signature_tolerance: Duration::from_secs(300),
            },
            orchestrator,
        )
    }

    fn completed_event(user: UserId, address: AddressId, session: &str) -> Vec<u8> {
        event_with_amounts(user, address, session, 12000, 490)
    }

    fn event_with_amounts(
        user: UserId,
        address: AddressId,
        session: &str,
        subtotal: i64,
        shipping: i64,
    ) -> Vec<u8> {
        let items = json!([{
            "productId": "veste", "name": "Veste", "color": "Kaki", "size": "M",
            "quantity": 1, "price": 120
        }]);
        serde_json::to_vec(&json!({
            "id": "evt_1",
            "type": CHECKOUT_COMPLETED,
            "data": { "object": {
                "id": session,
                "payment_intent": "pi_1",
                "amount_subtotal": subtotal,
                "amount_total": subtotal + shipping,
                "total_details": { "amount_shipping": shipping, "amount_tax": 0, "amount_discount": 0 },
                "metadata": {
                    "userId": user.to_string(),
                    "selectedAddressId": address.to_string(),
                    "selectedDelivery": "colissimo",
                    "promoCodeId": "",
                    "promoDiscount": "0",
                    "subscribeNewsletter": "false",
                    "cartItems": items.to_string(),
                }
            }}
        }))
        .unwrap()
    }

    #[test]
    fn test_signature_roundtrip_and_tampering() {
        let store = Arc::new(InMemoryStore::new());
        let handler = handler(&store);
        let now = 1_718_000_000;
        let header = sign_payload(SECRET, now, b"{}");

        assert!(handler.verify_signature(&header, b"{}", now).is_ok());
        assert!(handler.verify_signature(&header, b"{ }", now).is_err());
        assert!(handler.verify_signature(&header, b"{}", now + 301).is_err());
        assert!(
            handler
                .verify_signature(&sign_payload("other", now, b"{}"), b"{}", now)
                .is_err()
        );
        assert!(handler.verify_signature("v1=abc", b"{}", now).is_err());
    }

    #[test]
    fn test_extreme_timestamps_are_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let handler = handler(&store);
        let now = 1_718_000_000;

        for header in [
            "t=-9223372036854775808,v1=00",
            "t=9223372036854775807,v1=00",
        ] {
            assert!(matches!(
                handler.verify_signature(header, b"{}", now),
                Err(WebhookError::InvalidSignature(_))
            ));
        }
        assert!(matches!(
            handler.verify_signature("t=0,v1=00", b"{}", i64::MAX),
            Err(WebhookError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("hello", "hello"));
        assert!(!constant_time_compare("hello", "hell"));
        assert!(!constant_time_compare("hello", "world"));
    }

    #[tokio::test]
    async fn test_completed_checkout_creates_one_order() {
        let store = Arc::new(InMemoryStore::new());
        let handler = handler(&store);
        let user = store.add_customer(Email::parse("ana@haya.test").unwrap(), "Ana", "Roy");
        let address = store.add_address(user, "8 rue Paradis", "Marseille");
        store.set_stock(VariantKey::new("veste", "Kaki", "M"), 1);

        let body = completed_event(user, address, "cs_live_1");
        let header = sign_payload(SECRET, unix_now().unwrap(), &body);

        let first = handler.handle(Some(&header), &body).await.unwrap();
        assert!(matches!(first, WebhookOutcome::Created { .. }));
        let second = handler.handle(Some(&header), &body).await.unwrap();
        assert_eq!(second, WebhookOutcome::Duplicate);

        let orders = store.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].totals.total, Money::from_minor_units(12490));
        assert_eq!(orders[0].payment_session_id.as_deref(), Some("cs_live_1"));
        assert_eq!(orders[0].customer_name, "Ana Roy");
        assert_eq!(store.stock(&VariantKey::new("veste", "Kaki", "M")), Some(0));
    }

    #[tokio::test]
    async fn test_shipping_billed_inside_subtotal_creates_order() {
        let store = Arc::new(InMemoryStore::new());
        let handler = handler(&store);
        let user = store.add_customer(Email::parse("ana@haya.test").unwrap(), "Ana", "Roy");
        let address = store.add_address(user, "8 rue Paradis", "Marseille");
        store.set_stock(VariantKey::new("veste", "Kaki", "M"), 1);

        let body = event_with_amounts(user, address, "cs_live_2", 12490, 0);
        let header = sign_payload(SECRET, unix_now().unwrap(), &body);
        let outcome = handler.handle(Some(&header), &body).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Created { .. }));

        let orders = store.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].totals.subtotal, Money::from_minor_units(12000));
        assert_eq!(orders[0].totals.shipping, Money::from_minor_units(490));
        assert_eq!(orders[0].totals.total, Money::from_minor_units(12490));
        assert!(!orders[0].totals_review_required);
    }

    #[tokio::test]
    async fn test_inconsistent_amounts_still_create_a_flagged_order() {
        let store = Arc::new(InMemoryStore::new());
        let handler = handler(&store);
        let user = store.add_customer(Email::parse("ana@haya.test").unwrap(), "Ana", "Roy");
        let address = store.add_address(user, "8 rue Paradis", "Marseille");
        store.set_stock(VariantKey::new("veste", "Kaki", "M"), 1);

        let body = event_with_amounts(user, address, "cs_live_3", 9000, 490);
        let header = sign_payload(SECRET, unix_now().unwrap(), &body);
        let outcome = handler.handle(Some(&header), &body).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Created { .. }));

        let orders = store.orders();
        assert_eq!(orders.len(), 1);
        assert!(orders[0].totals_review_required);
        assert_eq!(orders[0].totals.subtotal, Money::from_minor_units(9000));
        assert_eq!(orders[0].totals.total, Money::from_minor_units(9490));
    }

    #[tokio::test]
    async fn test_other_events_are_ignored() {
        let store = Arc::new(InMemoryStore::new());
        let handler = handler(&store);
        let body = br#"{"type":"payment_intent.created","data":{"object":{}}}"#;
        let header = sign_payload(SECRET, unix_now().unwrap(), body);
        assert_eq!(
            handler.handle(Some(&header), body).await.unwrap(),
            WebhookOutcome::Ignored
        );
    }

    #[tokio::test]
    async fn test_missing_metadata_is_malformed() {
        let store = Arc::new(InMemoryStore::new());
        let handler = handler(&store);
        let body = serde_json::to_vec(&json!({
            "type": CHECKOUT_COMPLETED,
            "data": { "object": { "id": "cs_2", "amount_subtotal": 100, "amount_total": 100 } }
        }))
        .unwrap();
        let header = sign_payload(SECRET, unix_now().unwrap(), &body);
        let err = handler.handle(Some(&header), &body).await.unwrap_err();
        assert!(matches!(err, WebhookError::Malformed(_)));
        assert!(matches!(
            handler.handle(None, &body).await.unwrap_err(),
            WebhookError::InvalidSignature(_)
        ));
    }
}
