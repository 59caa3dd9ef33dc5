//! Scheduled job route handlers.

use axum::{
    Json,
    extract::{Query, State},
};
use chrono::Duration;
use serde::Deserialize;
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::middleware::RequireCron;
use crate::services::SweepReport;
use crate::services::reviews::DEFAULT_SWEEP_WINDOW_HOURS;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SweepParams {
    /// Look-back window in hours.
    hours: Option<i64>,
}

/// Send review requests for recently delivered orders.
///
/// GET /api/cron/review-requests
#[instrument(skip(state, _cron))]
pub async fn review_requests(
    State(state): State<AppState>,
    _cron: RequireCron,
    Query(params): Query<SweepParams>,
) -> Result<Json<SweepReport>> {
    let hours = params.hours.unwrap_or(DEFAULT_SWEEP_WINDOW_HOURS);
    if !(1..=24 * 30).contains(&hours) {
        return Err(AppError::Validation(
            "hours must be between 1 and 720".to_string(),
        ));
    }
    let report = state.reviews().sweep(Duration::hours(hours)).await?;
    Ok(Json(report))
}
