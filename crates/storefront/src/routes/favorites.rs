//! Favorites route handlers.

use axum::{Json, extract::State, http::StatusCode};
use tracing::instrument;

use haya_core::{FavoriteEntry, RemoveFavoriteRequest, SyncRequest, SyncResponse};

use crate::error::Result;
use crate::middleware::RequireUser;
use crate::state::AppState;

/// Reconcile the caller's favorites.
///
/// POST /api/favorites/sync
#[instrument(skip(state, request), fields(user_id = %user.id, mode = ?request.mode))]
pub async fn sync(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(request): Json<SyncRequest<FavoriteEntry>>,
) -> Result<Json<SyncResponse<FavoriteEntry>>> {
    let items = state
        .collections()
        .sync_favorites(user.id, request.items, request.mode)
        .await?;
    Ok(Json(SyncResponse { items }))
}

/// Remove one favorite.
///
/// DELETE /api/favorites/remove
#[instrument(skip(state), fields(user_id = %user.id))]
pub async fn remove(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(request): Json<RemoveFavoriteRequest>,
) -> Result<StatusCode> {
    state
        .collections()
        .remove_favorite(user.id, &request.product_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
