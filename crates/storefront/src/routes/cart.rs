//! Cart sync route handler.

use axum::{Json, extract::State};
use tracing::instrument;

use haya_core::{CartLine, SyncRequest, SyncResponse};

use crate::error::Result;
use crate::middleware::RequireUser;
use crate::state::AppState;

/// Reconcile the caller's cart.
///
/// POST /api/cart/sync
///
/// `replace` stores the incoming cart as-is (deduplicated and clamped);
/// `merge` unions it with the stored cart. Returns the authoritative cart.
#[instrument(skip(state, request), fields(user_id = %user.id, mode = ?request.mode))]
pub async fn sync(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(request): Json<SyncRequest<CartLine>>,
) -> Result<Json<SyncResponse<CartLine>>> {
    let items = state
        .collections()
        .sync_cart(user.id, request.items, request.mode)
        .await?;
    Ok(Json(SyncResponse { items }))
}
