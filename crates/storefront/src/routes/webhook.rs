//! Payment gateway webhook route handler.

use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use serde_json::{Value, json};
use tracing::instrument;

use crate::error::Result;
use crate::services::WebhookOutcome;
use crate::services::webhook::SIGNATURE_HEADER;
use crate::state::AppState;

/// Receive a gateway event.
///
/// POST /api/payments/webhook
///
/// The raw body is needed for signature verification, so it is taken as
/// bytes and parsed only after the signature checks out.
#[instrument(skip_all)]
pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok());

    let outcome = state.webhook().handle(signature, &body).await?;
    let body = match outcome {
        WebhookOutcome::Created { order_number } => {
            json!({ "received": true, "orderNumber": order_number })
        }
        WebhookOutcome::Duplicate => json!({ "received": true, "duplicate": true }),
        WebhookOutcome::Ignored => json!({ "received": true }),
    };
    Ok(Json(body))
}
