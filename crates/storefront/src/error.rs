//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//! Responses are JSON: `{"error": "..."}`, plus `unavailableItems` for stock
//! failures.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use haya_core::StockAvailability;

use crate::db::RepositoryError;
use crate::services::{
    InventoryError, NotificationError, OrderError, StatusError, WebhookError,
};

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Request failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// State changed underneath the request.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Requested quantities exceed stock.
    #[error("Insufficient stock")]
    InsufficientStock(Vec<StockAvailability>),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Downstream service failed.
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    unavailable_items: Option<Vec<StockAvailability>>,
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Database(RepositoryError::NotFound) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Database(RepositoryError::Conflict(_))
            | Self::Conflict(_)
            | Self::InsufficientStock(_) => StatusCode::CONFLICT,
            Self::Database(RepositoryError::OutOfRange(_))
            | Self::Validation(_)
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::ExternalService(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        // Don't expose internal error details to clients
        let (message, unavailable_items) = match self {
            Self::Database(RepositoryError::NotFound) => ("Not found".to_string(), None),
            Self::Database(RepositoryError::Conflict(_)) => {
                ("Resource already exists".to_string(), None)
            }
            Self::Database(RepositoryError::OutOfRange(msg)) => (msg, None),
            Self::Database(_) | Self::Internal(_) => ("Internal server error".to_string(), None),
            Self::ExternalService(_) => ("External service error".to_string(), None),
            Self::InsufficientStock(items) => {
                ("Stock insuffisant pour certains articles".to_string(), Some(items))
            }
            Self::Validation(msg)
            | Self::Unauthorized(msg)
            | Self::NotFound(msg)
            | Self::Conflict(msg)
            | Self::BadRequest(msg) => (msg, None),
            Self::RateLimited => ("Too many requests, try again later".to_string(), None),
        };

        (
            status,
            Json(ErrorBody {
                error: message,
                unavailable_items,
            }),
        )
            .into_response()
    }
}

impl From<InventoryError> for AppError {
    fn from(e: InventoryError) -> Self {
        match e {
            InventoryError::InsufficientStock(items) => Self::InsufficientStock(items),
            InventoryError::Repository(e) => Self::Database(e),
        }
    }
}

impl From<OrderError> for AppError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::Validation(msg) => Self::Validation(msg),
            OrderError::RateLimited => Self::RateLimited,
            OrderError::UnknownCustomer => Self::Unauthorized("Unknown customer".to_string()),
            OrderError::AddressNotFound => Self::NotFound("Address not found".to_string()),
            OrderError::InsufficientStock(items) => Self::InsufficientStock(items),
            OrderError::Repository(e) => Self::Database(e),
        }
    }
}

impl From<StatusError> for AppError {
    fn from(e: StatusError) -> Self {
        match e {
            StatusError::NotFound => Self::NotFound("Order not found".to_string()),
            StatusError::Validation(msg) => Self::Validation(msg),
            StatusError::Conflict => {
                Self::Conflict("Order was modified concurrently, reload and retry".to_string())
            }
            StatusError::Repository(e) => Self::Database(e),
        }
    }
}

impl From<WebhookError> for AppError {
    fn from(e: WebhookError) -> Self {
        match e {
            WebhookError::InvalidSignature(_) => Self::BadRequest("Invalid signature".to_string()),
            WebhookError::Malformed(msg) => Self::BadRequest(msg),
            WebhookError::Processing(msg) => Self::Internal(msg),
        }
    }
}

impl From<NotificationError> for AppError {
    fn from(e: NotificationError) -> Self {
        Self::ExternalService(e.to_string())
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use haya_core::{StockLine, VariantKey};

    use super::*;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("order 12".to_string());
        assert_eq!(err.to_string(), "Not found: order 12");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(get_status(AppError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(get_status(AppError::Unauthorized("x".into())), StatusCode::UNAUTHORIZED);
        assert_eq!(get_status(AppError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(get_status(AppError::RateLimited), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(get_status(AppError::Conflict("x".into())), StatusCode::CONFLICT);
        assert_eq!(get_status(AppError::ExternalService("x".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(
            get_status(AppError::Internal("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            get_status(AppError::Database(RepositoryError::Conflict("dup".into()))),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(AppError::Database(RepositoryError::OutOfRange("qty".into()))),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_service_errors_map_to_statuses() {
        assert_eq!(
            get_status(OrderError::AddressNotFound.into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(get_status(StatusError::Conflict.into()), StatusCode::CONFLICT);
        assert_eq!(
            get_status(WebhookError::InvalidSignature("x".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(WebhookError::Processing("x".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_insufficient_stock_body_lists_items() {
        let line = StockLine::new(VariantKey::new("robe", "Noir", "S"), 3);
        let item = StockAvailability::evaluate(&line, Some(1));
        let response = AppError::InsufficientStock(vec![item]).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["unavailableItems"][0]["available"], 1);
        assert_eq!(body["unavailableItems"][0]["requested"], 3);
    }

    #[tokio::test]
    async fn test_internal_details_are_hidden() {
        let response = AppError::Internal("pool exhausted at db-3".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Internal server error");
        assert!(body.get("unavailableItems").is_none());
    }
}
