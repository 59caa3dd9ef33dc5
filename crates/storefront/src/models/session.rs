//! Session-related types.
//!
//! The authentication collaborator writes a [`CurrentUser`] into the
//! tower-sessions session at login; this crate only reads it.

use serde::{Deserialize, Serialize};

use haya_core::{Email, UserId};

/// Session-stored user identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    /// Customer database ID.
    pub id: UserId,
    /// Customer email address.
    pub email: Email,
}

/// Session keys for authentication data.
pub mod keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";
}
