//! Integration tests for Haya.
//!
//! Scenarios run the real services over the in-memory repositories, and the
//! client sync tests drive a live server on a loopback port through the
//! `haya-client` HTTP transport. No database is required.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p haya-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `checkout_flow` - Concurrent checkouts against finite stock
//! - `payment_webhook` - Signed gateway events and replays
//! - `status_transitions` - Cancellation, refunds and delivery side effects
//! - `client_sync` - Optimistic client against a running storefront

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, extract::Path, http::StatusCode, routing::post};
use secrecy::SecretString;
use serde_json::json;
use tower_sessions::{MemoryStore, Session};

use haya_core::{AddressId, Email, Money, ProductId, UserId, VariantKey};
use haya_storefront::config::{NotificationConfig, PaymentConfig, StorefrontConfig};
use haya_storefront::db::{InMemoryStore, Repositories};
use haya_storefront::middleware::{session_layer, set_current_user};
use haya_storefront::models::CurrentUser;
use haya_storefront::services::webhook::{CHECKOUT_COMPLETED, sign_payload};
use haya_storefront::services::{CheckoutItem, CheckoutRequest, MemoryNotificationDispatcher};
use haya_storefront::state::AppState;

/// Webhook signing secret used by [`test_config`].
pub const WEBHOOK_SECRET: &str = "whsec_Q8v2Lm1xN4";

/// Admin bearer token used by [`test_config`].
pub const ADMIN_TOKEN: &str = "adm_7Hq2pZ9w";

/// Configuration with test secrets and no outbound notifications.
///
/// # Panics
///
/// Never in practice: every literal parses.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn test_config() -> StorefrontConfig {
    StorefrontConfig {
        database_url: SecretString::from("postgres://localhost/haya_test"),
        host: "127.0.0.1".parse().unwrap(),
        port: 0,
        base_url: "http://haya.test".to_owned(),
        session_secret: SecretString::from("k".repeat(32)),
        payment: PaymentConfig {
            webhook_secret: SecretString::from(WEBHOOK_SECRET),
            signature_tolerance: Duration::from_secs(300),
        },
        admin_api_token: SecretString::from(ADMIN_TOKEN),
        cron_secret: SecretString::from("cron_K3m8Vt1y"),
        notifications: NotificationConfig {
            endpoint: None,
            api_key: None,
            operator_email: Email::parse("boutique@haya.test").unwrap(),
        },
        order_rate_limit: NonZeroU32::new(5).unwrap(),
        sentry_dsn: None,
        sentry_environment: None,
    }
}

/// A storefront wired over in-memory repositories.
pub struct TestContext {
    pub store: Arc<InMemoryStore>,
    pub notifier: Arc<MemoryNotificationDispatcher>,
    pub state: AppState,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    #[must_use]
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let notifier = Arc::new(MemoryNotificationDispatcher::new());
        let state = AppState::new(
            test_config(),
            Repositories::in_memory(&store),
            notifier.clone(),
        );
        Self {
            store,
            notifier,
            state,
        }
    }

    /// Register a customer with one shipping address.
    ///
    /// # Panics
    ///
    /// Panics if `email` is not a valid address.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn customer(&self, email: &str) -> (UserId, AddressId) {
        let user = self
            .store
            .add_customer(Email::parse(email).unwrap(), "Lina", "Benali");
        let address = self.store.add_address(user, "12 rue Oberkampf", "Paris");
        (user, address)
    }

    /// Serve the full application plus a `/test/login/{id}` route on a
    /// loopback port. Returns the base URL.
    ///
    /// # Panics
    ///
    /// Panics if no loopback port can be bound.
    #[allow(clippy::unwrap_used)]
    pub async fn serve(&self) -> String {
        let config = test_config();
        let routes = haya_storefront::routes::routes().route("/test/login/{id}", post(login));
        let app: Router = haya_storefront::with_middleware(
            routes,
            self.state.clone(),
            session_layer(MemoryStore::default(), &config),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        format!("http://{addr}/")
    }
}

async fn login(session: Session, Path(id): Path<i32>) -> StatusCode {
    let user = CurrentUser {
        id: UserId::new(id),
        email: match Email::parse("lina@haya.test") {
            Ok(email) => email,
            Err(_) => return StatusCode::INTERNAL_SERVER_ERROR,
        },
    };
    match set_current_user(&session, &user).await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Log `user` in on a server started by [`TestContext::serve`] and return the
/// `name=value` session cookie.
///
/// # Panics
///
/// Panics if the server does not answer with a session cookie.
#[allow(clippy::unwrap_used)]
pub async fn login_cookie(base_url: &str, user: UserId) -> String {
    let response = reqwest::Client::new()
        .post(format!("{base_url}test/login/{user}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);
    let cookie = response.headers()[reqwest::header::SET_COOKIE]
        .to_str()
        .unwrap();
    cookie.split(';').next().unwrap().to_owned()
}

/// Key of the variant used by [`checkout_request`].
#[must_use]
pub fn dress() -> VariantKey {
    VariantKey::new("robe-lin", "Sable", "M")
}

/// A checkout of `quantity` linen dresses at 49.90 with 4.90 shipping.
#[must_use]
pub fn checkout_request(address: AddressId, quantity: u32) -> CheckoutRequest {
    let unit = Money::from_minor_units(4990);
    let subtotal = Money::from_minor_units(4990 * i64::from(quantity));
    let shipping = Money::from_minor_units(490);
    CheckoutRequest {
        items: vec![CheckoutItem {
            product_id: ProductId::new("robe-lin"),
            name: "Robe en lin".to_owned(),
            color: "Sable".to_owned(),
            size: "M".to_owned(),
            quantity,
            price: unit,
        }],
        subtotal,
        shipping_cost: shipping,
        tax_amount: Money::ZERO,
        discount_amount: Money::ZERO,
        total_amount: subtotal + shipping,
        address_id: address,
        delivery_method: "colissimo".to_owned(),
        payment_method: "card".to_owned(),
        promo_code_id: None,
        subscribe_newsletter: false,
    }
}

/// Body of a completed checkout event for one linen dress.
///
/// # Panics
///
/// Never in practice: the event is built from JSON literals.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn completed_event(user: UserId, address: AddressId, session_id: &str) -> Vec<u8> {
    let items = json!([{
        "productId": "robe-lin", "name": "Robe en lin", "color": "Sable", "size": "M",
        "quantity": 1, "price": "49.90"
    }]);
    serde_json::to_vec(&json!({
        "id": format!("evt_{session_id}"),
        "type": CHECKOUT_COMPLETED,
        "data": { "object": {
            "id": session_id,
            "payment_intent": "pi_test",
            "amount_subtotal": 4990,
            "amount_total": 5480,
            "total_details": { "amount_shipping": 490, "amount_tax": 0, "amount_discount": 0 },
            "metadata": {
                "userId": user.to_string(),
                "selectedAddressId": address.to_string(),
                "selectedDelivery": "colissimo",
                "subscribeNewsletter": "true",
                "cartItems": items.to_string(),
            }
        }}
    }))
    .unwrap()
}

/// Signature header for `body`, timestamped now.
#[must_use]
pub fn signature_for(body: &[u8]) -> String {
    sign_payload(WEBHOOK_SECRET, chrono::Utc::now().timestamp(), body)
}
