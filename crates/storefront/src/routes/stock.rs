//! Stock availability route handler.

use axum::{Json, extract::State};
use tracing::instrument;

use haya_core::{StockAvailability, StockLine};

use crate::error::{AppError, Result};
use crate::state::AppState;

/// Upper bound on lines per check.
const MAX_LINES: usize = 100;

/// Check requested quantities against current stock.
///
/// POST /api/stock/check
///
/// Read-only; always answers with one entry per requested line.
#[instrument(skip(state, lines), fields(lines = lines.len()))]
pub async fn check(
    State(state): State<AppState>,
    Json(lines): Json<Vec<StockLine>>,
) -> Result<Json<Vec<StockAvailability>>> {
    if lines.len() > MAX_LINES {
        return Err(AppError::Validation(format!(
            "at most {MAX_LINES} lines per check"
        )));
    }
    let report = state.inventory().check_availability(&lines).await?;
    Ok(Json(report))
}
