//! Operator order route handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::instrument;

use haya_core::OrderId;

use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::models::Order;
use crate::services::StatusUpdate;
use crate::state::AppState;

/// Order detail with its lines.
///
/// GET /api/admin/orders/{id}
#[instrument(skip(state, _admin))]
pub async fn show(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(id): Path<i32>,
) -> Result<Json<Order>> {
    let order = state
        .repos()
        .orders
        .get(OrderId::new(id))
        .await?
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;
    Ok(Json(order))
}

/// Apply a status, tracking or notes update.
///
/// PUT /api/admin/orders/{id}
#[instrument(skip(state, _admin, update), fields(status = ?update.status))]
pub async fn update(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(id): Path<i32>,
    Json(update): Json<StatusUpdate>,
) -> Result<Json<Order>> {
    let order = state.status().update(OrderId::new(id), update).await?;
    Ok(Json(order))
}
