//! Review request sweep.
//!
//! Same job as `GET /api/cron/review-requests`, for running from a shell or
//! a system timer.
//!
//! # Usage
//!
//! ```bash
//! haya-cli reviews sweep --hours 72
//! ```

use chrono::Duration;

use haya_storefront::config::StorefrontConfig;
use haya_storefront::db::{Repositories, create_pool};
use haya_storefront::services::{ReviewService, SweepReport, build_dispatcher};

use super::CommandError;

/// Ask buyers of orders delivered in the last `hours` for reviews.
///
/// # Errors
///
/// Returns error if the configuration is invalid, the database is
/// unreachable, or delivered orders cannot be listed.
pub async fn sweep(hours: i64) -> Result<SweepReport, CommandError> {
    if !(1..=24 * 30).contains(&hours) {
        return Err(CommandError::InvalidArgument(
            "hours must be between 1 and 720".to_owned(),
        ));
    }

    let config = StorefrontConfig::from_env()?;
    let pool = create_pool(&config.database_url).await?;
    let notifier = build_dispatcher(&config.notifications)
        .map_err(|e| CommandError::Service(e.to_string()))?;

    let service = ReviewService::new(&Repositories::postgres(&pool), notifier, &config.base_url);
    let report = service
        .sweep(Duration::hours(hours))
        .await
        .map_err(|e| CommandError::Service(e.to_string()))?;

    tracing::info!(
        processed = report.processed,
        sent = report.sent,
        failed = report.failed,
        "Review sweep complete"
    );
    Ok(report)
}
