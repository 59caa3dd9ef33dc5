//! Outbound notifications (buyer emails, operator alerts).
//!
//! Templates and delivery live in an external notification service; this
//! module only builds typed payloads and posts them as JSON. When no endpoint
//! is configured, notifications are written to the log instead.
//!
//! Every notification is a side effect of an already committed operation, so
//! callers go through [`dispatch_best_effort`] and never propagate failures.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use haya_core::{Email, Money, OrderStatus};

use crate::config::NotificationConfig;

/// Errors that can occur when delivering a notification.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Notification service returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Client could not be configured.
    #[error("configuration error: {0}")]
    Config(String),

    /// Delivery refused (test dispatcher).
    #[error("delivery refused: {0}")]
    Refused(String),
}

/// One purchased line, as shown in order emails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationLine {
    pub name: String,
    pub color: String,
    pub size: String,
    pub quantity: u32,
    pub total_price: Money,
}

/// A typed notification payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(
    tag = "template",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum Notification {
    /// Sent to the buyer once the order is persisted.
    OrderConfirmation {
        to: Email,
        customer_name: String,
        order_number: String,
        total: Money,
        lines: Vec<NotificationLine>,
    },
    /// Sent to the shop operator for every new order.
    OperatorNewOrder {
        to: Email,
        order_number: String,
        customer_name: String,
        customer_email: Email,
        total: Money,
        delivery_method: String,
    },
    /// Sent to the buyer on a status change.
    StatusUpdate {
        to: Email,
        customer_name: String,
        order_number: String,
        status: OrderStatus,
        status_label: String,
        tracking_number: Option<String>,
        carrier: Option<String>,
        tracking_url: Option<String>,
    },
    /// Asks the buyer to review the products of a delivered order.
    ReviewRequest {
        to: Email,
        customer_name: String,
        order_number: String,
        review_url: String,
        products: Vec<String>,
    },
    /// Contact form message forwarded to the operator.
    ContactMessage {
        to: Email,
        name: String,
        reply_to: Email,
        message: String,
        order_number: Option<String>,
    },
}

impl Notification {
    /// Template name, as sent in the `template` field.
    #[must_use]
    pub const fn template(&self) -> &'static str {
        match self {
            Self::OrderConfirmation { .. } => "order_confirmation",
            Self::OperatorNewOrder { .. } => "operator_new_order",
            Self::StatusUpdate { .. } => "status_update",
            Self::ReviewRequest { .. } => "review_request",
            Self::ContactMessage { .. } => "contact_message",
        }
    }

    #[must_use]
    pub const fn recipient(&self) -> &Email {
        match self {
            Self::OrderConfirmation { to, .. }
            | Self::OperatorNewOrder { to, .. }
            | Self::StatusUpdate { to, .. }
            | Self::ReviewRequest { to, .. }
            | Self::ContactMessage { to, .. } => to,
        }
    }
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Deliver one notification.
    async fn dispatch(&self, notification: &Notification) -> Result<(), NotificationError>;
}

/// Deliver a notification, logging instead of propagating failures.
///
/// Returns whether the notification was delivered.
pub async fn dispatch_best_effort(
    dispatcher: &dyn NotificationDispatcher,
    notification: &Notification,
) -> bool {
    match dispatcher.dispatch(notification).await {
        Ok(()) => {
            tracing::debug!(template = notification.template(), "Notification dispatched");
            true
        }
        Err(e) => {
            tracing::warn!(
                template = notification.template(),
                recipient = %notification.recipient(),
                error = %e,
                "Failed to dispatch notification"
            );
            false
        }
    }
}

/// Build the dispatcher described by the configuration.
///
/// # Errors
///
/// Returns error if the HTTP client cannot be built.
pub fn build_dispatcher(
    config: &NotificationConfig,
) -> Result<Arc<dyn NotificationDispatcher>, NotificationError> {
    match &config.endpoint {
        Some(endpoint) => Ok(Arc::new(HttpNotificationDispatcher::new(
            endpoint.clone(),
            config.api_key.as_ref(),
        )?)),
        None => {
            tracing::info!("No notification endpoint configured, notifications will be logged");
            Ok(Arc::new(LogNotificationDispatcher))
        }
    }
}

/// Posts notifications as JSON to the notification service.
#[derive(Clone)]
pub struct HttpNotificationDispatcher {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpNotificationDispatcher {
    /// Create a new dispatcher.
    ///
    /// # Errors
    ///
    /// Returns error if the API key is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(
        endpoint: Url,
        api_key: Option<&secrecy::SecretString>,
    ) -> Result<Self, NotificationError> {
        let mut headers = HeaderMap::new();

        if let Some(key) = api_key {
            let auth_value = format!("Bearer {}", key.expose_secret());
            let mut value = HeaderValue::from_str(&auth_value)
                .map_err(|e| NotificationError::Config(format!("Invalid API key format: {e}")))?;
            value.set_sensitive(true);
            headers.insert("Authorization", value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl NotificationDispatcher for HttpNotificationDispatcher {
    async fn dispatch(&self, notification: &Notification) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(notification)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(NotificationError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

/// Writes notifications to the log. Used when no endpoint is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotificationDispatcher;

#[async_trait]
impl NotificationDispatcher for LogNotificationDispatcher {
    async fn dispatch(&self, notification: &Notification) -> Result<(), NotificationError> {
        tracing::info!(
            template = notification.template(),
            recipient = %notification.recipient(),
            payload = %serde_json::to_string(notification).unwrap_or_default(),
            "Notification (not sent, no endpoint configured)"
        );
        Ok(())
    }
}

/// Records notifications in memory; can be told to refuse deliveries.
#[derive(Debug, Default)]
pub struct MemoryNotificationDispatcher {
    sent: Mutex<Vec<Notification>>,
    failing: Mutex<bool>,
}

impl MemoryNotificationDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every notification delivered so far.
    #[must_use]
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }

    /// Delivered notifications using the given template.
    #[must_use]
    pub fn sent_with_template(&self, template: &str) -> Vec<Notification> {
        self.sent
            .lock()
            .iter()
            .filter(|n| n.template() == template)
            .cloned()
            .collect()
    }

    /// Refuse (`true`) or accept (`false`) subsequent deliveries.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }
}

#[async_trait]
impl NotificationDispatcher for MemoryNotificationDispatcher {
    async fn dispatch(&self, notification: &Notification) -> Result<(), NotificationError> {
        if *self.failing.lock() {
            return Err(NotificationError::Refused(notification.template().to_owned()));
        }
        self.sent.lock().push(notification.clone());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn contact() -> Notification {
        Notification::ContactMessage {
            to: Email::parse("boutique@haya.test").unwrap(),
            name: "Inès".to_owned(),
            reply_to: Email::parse("ines@haya.test").unwrap(),
            message: "Bonjour".to_owned(),
            order_number: None,
        }
    }

    #[test]
    fn test_payload_is_tagged_with_template() {
        let json = serde_json::to_value(contact()).unwrap();
        assert_eq!(json["template"], "contact_message");
        assert_eq!(json["replyTo"], "ines@haya.test");
        assert_eq!(json["orderNumber"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_best_effort_swallows_failures() {
        let dispatcher = MemoryNotificationDispatcher::new();
        dispatcher.set_failing(true);
        assert!(!dispatch_best_effort(&dispatcher, &contact()).await);
        assert!(dispatcher.sent().is_empty());

        dispatcher.set_failing(false);
        assert!(dispatch_best_effort(&dispatcher, &contact()).await);
        assert_eq!(dispatcher.sent_with_template("contact_message").len(), 1);
    }
}
