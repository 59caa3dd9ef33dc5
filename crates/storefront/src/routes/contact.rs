//! Contact form route handler.
//!
//! Messages are forwarded to the shop operator through the notification
//! dispatcher; nothing is stored.

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use tracing::instrument;

use haya_core::Email;

use crate::error::{AppError, Result};
use crate::services::Notification;
use crate::state::AppState;

const MAX_MESSAGE_LEN: usize = 5_000;

/// Contact form data.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactForm {
    pub name: String,
    pub email: String,
    pub message: String,
    #[serde(default)]
    pub order_number: Option<String>,
}

/// Forward a contact message to the operator.
///
/// POST /api/contact
#[instrument(skip(state, form))]
pub async fn submit(
    State(state): State<AppState>,
    Json(form): Json<ContactForm>,
) -> Result<StatusCode> {
    let reply_to = Email::parse(&form.email)
        .map_err(|_| AppError::Validation("Please enter a valid email address.".to_string()))?;

    let name = form.name.trim();
    let message = form.message.trim();
    if name.is_empty() || message.is_empty() {
        return Err(AppError::Validation(
            "Name and message are required.".to_string(),
        ));
    }
    if message.len() > MAX_MESSAGE_LEN {
        return Err(AppError::Validation(format!(
            "Message must be at most {MAX_MESSAGE_LEN} characters."
        )));
    }

    let notification = Notification::ContactMessage {
        to: state.config().notifications.operator_email.clone(),
        name: name.to_owned(),
        reply_to,
        message: message.to_owned(),
        order_number: form
            .order_number
            .map(|n| n.trim().to_owned())
            .filter(|n| !n.is_empty()),
    };
    state.notifier().dispatch(&notification).await?;

    tracing::info!("Contact message forwarded");
    Ok(StatusCode::ACCEPTED)
}
