//! Customer account and address types.
//!
//! Accounts are owned by the authentication collaborator; orders snapshot the
//! buyer identity from here, never from payment gateway billing data.

use chrono::{DateTime, Utc};
use serde::Serialize;

use haya_core::{AddressId, Email, UserId};

/// A registered customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    pub id: UserId,
    pub email: Email,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub newsletter: bool,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    /// Display name used on orders; falls back to the email when no name is set.
    #[must_use]
    pub fn display_name(&self) -> String {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        if parts.is_empty() {
            self.email.to_string()
        } else {
            parts.join(" ")
        }
    }
}

/// A saved shipping address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub id: AddressId,
    pub user_id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub street: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    pub phone: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn customer(first: Option<&str>, last: Option<&str>) -> Customer {
        Customer {
            id: UserId::new(1),
            email: Email::parse("jeanne@haya.test").unwrap(),
            first_name: first.map(str::to_owned),
            last_name: last.map(str::to_owned),
            phone: None,
            newsletter: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_display_name() {
        assert_eq!(customer(Some("Jeanne"), Some("Martin")).display_name(), "Jeanne Martin");
        assert_eq!(customer(Some("Jeanne"), None).display_name(), "Jeanne");
        assert_eq!(customer(Some("  "), None).display_name(), "jeanne@haya.test");
    }
}
