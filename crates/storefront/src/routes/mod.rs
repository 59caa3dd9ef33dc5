//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                     - Liveness check
//! GET    /health/ready               - Readiness check (repository ping)
//!
//! # Collections (requires user session)
//! POST   /api/cart/sync              - Reconcile the cart, returns the stored cart
//! POST   /api/favorites/sync         - Reconcile favorites
//! DELETE /api/favorites/remove       - Remove one favorite
//!
//! # Stock
//! POST   /api/stock/check            - Per-line availability
//!
//! # Orders (requires user session)
//! POST   /api/orders                 - Place an order
//! GET    /api/user/orders            - Caller's orders, newest first
//!
//! # Admin (bearer ADMIN_API_TOKEN)
//! GET    /api/admin/orders/{id}      - Order detail
//! PUT    /api/admin/orders/{id}      - Status / tracking / notes update
//!
//! # Integrations
//! POST   /api/payments/webhook       - Payment gateway events (signed)
//! GET    /api/cron/review-requests   - Review sweep (bearer CRON_SECRET)
//! POST   /api/contact                - Contact form to the operator
//! ```

pub mod admin;
pub mod cart;
pub mod contact;
pub mod cron;
pub mod favorites;
pub mod orders;
pub mod stock;
pub mod webhook;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
};

use crate::state::AppState;

/// Create the `/api` routes router.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/cart/sync", post(cart::sync))
        .route("/favorites/sync", post(favorites::sync))
        .route("/favorites/remove", delete(favorites::remove))
        .route("/stock/check", post(stock::check))
        .route("/orders", post(orders::create))
        .route("/user/orders", get(orders::list_mine))
        .route("/admin/orders/{id}", get(admin::show).put(admin::update))
        .route("/payments/webhook", post(webhook::receive))
        .route("/cron/review-requests", get(cron::review_requests))
        .route("/contact", post(contact::submit))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/api", api_routes())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the order store is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.repos().orders.ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        extract::Path,
        http::{Method, Request, header},
        response::Response,
    };
    use haya_core::{Email, Money, OrderStatus, UserId, VariantKey};
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use tower_sessions::{MemoryStore, Session};

    use super::*;
    use crate::config::tests::test_config;
    use crate::db::{InMemoryStore, Repositories};
    use crate::middleware::{SESSION_COOKIE_NAME, set_current_user, session_layer};
    use crate::models::CurrentUser;
    use crate::services::MemoryNotificationDispatcher;
    use crate::services::webhook::{SIGNATURE_HEADER, sign_payload};

    struct Harness {
        store: Arc<InMemoryStore>,
        notifier: Arc<MemoryNotificationDispatcher>,
        app: Router,
    }

    async fn login(session: Session, Path(id): Path<i32>) -> StatusCode {
        let user = CurrentUser {
            id: UserId::new(id),
            email: Email::parse("lina@haya.test").unwrap(),
        };
        set_current_user(&session, &user).await.unwrap();
        StatusCode::NO_CONTENT
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let notifier = Arc::new(MemoryNotificationDispatcher::new());
        let config = test_config();
        let layer = session_layer(MemoryStore::default(), &config);
        let state = AppState::new(config, Repositories::in_memory(&store), notifier.clone());
        let app = routes()
            .route("/test/login/{id}", post(login))
            .layer(layer)
            .with_state(state);
        Harness {
            store,
            notifier,
            app,
        }
    }

    async fn send(app: &Router, request: Request<Body>) -> Response {
        app.clone().oneshot(request).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn session_cookie(app: &Router, user: UserId) -> String {
        let response = send(
            app,
            Request::builder()
                .method(Method::POST)
                .uri(format!("/test/login/{user}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with(SESSION_COOKIE_NAME));
        cookie.split(';').next().unwrap().to_owned()
    }

    fn json_request(method: Method, uri: &str, cookie: Option<&str>, body: &Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn cart_line(product: &str, quantity: u32, max_quantity: u32) -> Value {
        json!({
            "productId": product,
            "name": "Robe en lin",
            "slug": "robe-en-lin",
            "price": "49.90",
            "color": "Sable",
            "size": "M",
            "quantity": quantity,
            "maxQuantity": max_quantity
        })
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let h = harness();
        let response = send(&h.app, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let response =
            send(&h.app, Request::get("/health/ready").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cart_sync_requires_session() {
        let h = harness();
        let body = json!({ "items": [], "mode": "replace" });
        let response = send(
            &h.app,
            json_request(Method::POST, "/api/cart/sync", None, &body),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_cart_sync_merge_returns_authoritative_cart() {
        let h = harness();
        let user = h
            .store
            .add_customer(Email::parse("lina@haya.test").unwrap(), "Lina", "Roux");
        let cookie = session_cookie(&h.app, user).await;

        let stored = json!({ "items": [cart_line("robe", 1, 5)], "mode": "replace" });
        let response = send(
            &h.app,
            json_request(Method::POST, "/api/cart/sync", Some(&cookie), &stored),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let local = json!({
            "items": [cart_line("robe", 3, 5), cart_line("jupe", 1, 2)],
            "mode": "merge"
        });
        let response = send(
            &h.app,
            json_request(Method::POST, "/api/cart/sync", Some(&cookie), &local),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let items = body["items"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["productId"], "robe");
        assert_eq!(items[0]["quantity"], 3);
        assert_eq!(items[1]["productId"], "jupe");
    }

    #[tokio::test]
    async fn test_stock_check_reports_per_line() {
        let h = harness();
        h.store.set_stock(VariantKey::new("robe", "Sable", "M"), 2);
        let body = json!([
            { "productId": "robe", "color": "Sable", "size": "M", "quantity": 3 },
            { "productId": "robe", "color": "Sable", "size": "L", "quantity": 1 }
        ]);
        let response = send(
            &h.app,
            json_request(Method::POST, "/api/stock/check", None, &body),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body[0]["available"], 2);
        assert!(body[0]["message"].is_string());
        assert_eq!(body[1]["available"], 0);
    }

    fn checkout_body(address_id: i32, quantity: u32) -> Value {
        let subtotal = Money::from_minor_units(4990) * quantity;
        json!({
            "items": [{
                "productId": "robe",
                "name": "Robe en lin",
                "color": "Sable",
                "size": "M",
                "quantity": quantity,
                "price": "49.90"
            }],
            "subtotal": subtotal,
            "shippingCost": "0",
            "totalAmount": subtotal,
            "addressId": address_id,
            "deliveryMethod": "colissimo",
            "paymentMethod": "card",
            "subscribeNewsletter": false
        })
    }

    #[tokio::test]
    async fn test_checkout_then_list_and_stock_conflict() {
        let h = harness();
        let user = h
            .store
            .add_customer(Email::parse("lina@haya.test").unwrap(), "Lina", "Roux");
        let address = h.store.add_address(user, "12 rue Oberkampf", "Paris");
        let key = VariantKey::new("robe", "Sable", "M");
        h.store.set_stock(key.clone(), 2);
        let cookie = session_cookie(&h.app, user).await;

        let response = send(
            &h.app,
            json_request(
                Method::POST,
                "/api/orders",
                Some(&cookie),
                &checkout_body(address.as_i32(), 2),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let placed = json_body(response).await;
        assert!(placed["orderNumber"].as_str().unwrap().starts_with("CMD-"));
        assert_eq!(h.store.stock(&key), Some(0));

        let response = send(
            &h.app,
            json_request(
                Method::POST,
                "/api/orders",
                Some(&cookie),
                &checkout_body(address.as_i32(), 1),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = json_body(response).await;
        assert_eq!(body["unavailableItems"][0]["available"], 0);

        let response = send(
            &h.app,
            Request::get("/api/user/orders")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        let orders = json_body(response).await;
        assert_eq!(orders.as_array().unwrap().len(), 1);
        assert_eq!(orders[0]["status"], "PENDING");
    }

    #[tokio::test]
    async fn test_admin_requires_bearer_and_cancels_once() {
        let h = harness();
        let user = h
            .store
            .add_customer(Email::parse("lina@haya.test").unwrap(), "Lina", "Roux");
        let address = h.store.add_address(user, "12 rue Oberkampf", "Paris");
        let key = VariantKey::new("robe", "Sable", "M");
        h.store.set_stock(key.clone(), 3);
        let cookie = session_cookie(&h.app, user).await;
        let placed = json_body(
            send(
                &h.app,
                json_request(
                    Method::POST,
                    "/api/orders",
                    Some(&cookie),
                    &checkout_body(address.as_i32(), 1),
                ),
            )
            .await,
        )
        .await;
        let uri = format!("/api/admin/orders/{}", placed["orderId"]);

        let response = send(&h.app, Request::get(&uri).body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let cancel = || {
            Request::builder()
                .method(Method::PUT)
                .uri(&uri)
                .header(header::AUTHORIZATION, "Bearer adm_7Hq2pZ9w")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "status": "CANCELLED" }).to_string()))
                .unwrap()
        };
        let response = send(&h.app, cancel()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let response = send(&h.app, cancel()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(h.store.stock(&key), Some(3));

        let response = send(
            &h.app,
            Request::get(&uri)
                .header(header::AUTHORIZATION, "Bearer adm_7Hq2pZ9w")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        let order = json_body(response).await;
        assert_eq!(order["status"], OrderStatus::Cancelled.as_str());
        assert_eq!(order["lines"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_webhook_rejects_bad_signature_and_ignores_other_events() {
        let h = harness();
        let body = json!({ "type": "payment_intent.created", "data": { "object": {} } }).to_string();

        let response = send(
            &h.app,
            Request::post("/api/payments/webhook")
                .header(SIGNATURE_HEADER, "t=1,v1=deadbeef")
                .body(Body::from(body.clone()))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let now = chrono::Utc::now().timestamp();
        let signature = sign_payload("whsec_Q8v2Lm1xN4", now, body.as_bytes());
        let response = send(
            &h.app,
            Request::post("/api/payments/webhook")
                .header(SIGNATURE_HEADER, format!("t={now},v1={signature}"))
                .body(Body::from(body))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(h.store.orders().is_empty());
    }

    #[tokio::test]
    async fn test_cron_requires_secret() {
        let h = harness();
        let response = send(
            &h.app,
            Request::get("/api/cron/review-requests")
                .header(header::AUTHORIZATION, "Bearer wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = send(
            &h.app,
            Request::get("/api/cron/review-requests")
                .header(header::AUTHORIZATION, "Bearer cron_K3m8Vt1y")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let report = json_body(response).await;
        assert_eq!(report["processed"], 0);
    }

    #[tokio::test]
    async fn test_contact_reaches_operator() {
        let h = harness();
        let body = json!({
            "name": "Inès",
            "email": "ines@haya.test",
            "message": "Ma commande n'est pas arrivée",
            "orderNumber": "CMD-1-ABCDEF"
        });
        let response = send(&h.app, json_request(Method::POST, "/api/contact", None, &body)).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let sent = h.notifier.sent_with_template("contact_message");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient().as_str(), "boutique@haya.test");

        let invalid = json!({ "name": "Inès", "email": "nope", "message": "?" });
        let response =
            send(&h.app, json_request(Method::POST, "/api/contact", None, &invalid)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_favorites_remove_is_idempotent() {
        let h = harness();
        let user = h
            .store
            .add_customer(Email::parse("lina@haya.test").unwrap(), "Lina", "Roux");
        let cookie = session_cookie(&h.app, user).await;
        let body = json!({ "productId": "robe" });
        for _ in 0..2 {
            let response = send(
                &h.app,
                json_request(Method::DELETE, "/api/favorites/remove", Some(&cookie), &body),
            )
            .await;
            assert_eq!(response.status(), StatusCode::NO_CONTENT);
        }
    }
}
