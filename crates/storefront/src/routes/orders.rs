//! Shopper order route handlers.

use axum::{Json, extract::State, http::StatusCode};
use tracing::instrument;

use crate::error::Result;
use crate::middleware::RequireUser;
use crate::models::Order;
use crate::services::{CheckoutRequest, PlacedOrder};
use crate::state::AppState;

/// Place an order from the checkout form.
///
/// POST /api/orders
///
/// Answers 201 with `{orderId, orderNumber}`, or 409 with
/// `unavailableItems` when stock is short.
#[instrument(skip(state, request), fields(user_id = %user.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<PlacedOrder>)> {
    let placed = state.orders().place_order(user.id, request).await?;
    Ok((StatusCode::CREATED, Json(placed)))
}

/// The caller's orders, newest first.
///
/// GET /api/user/orders
#[instrument(skip(state), fields(user_id = %user.id))]
pub async fn list_mine(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<Vec<Order>>> {
    let orders = state.repos().orders.list_for_user(user.id).await?;
    Ok(Json(orders))
}
