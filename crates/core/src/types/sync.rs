//! Payloads of the collection sync endpoints, shared by server and client.

use serde::{Deserialize, Serialize};

use super::id::ProductId;

/// How the server should combine an incoming collection with the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// The incoming collection becomes the stored collection.
    #[default]
    Replace,
    /// Union of both; used once, right after login.
    Merge,
}

/// Which user collection a sync concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Cart,
    Favorites,
}

impl CollectionKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cart => "cart",
            Self::Favorites => "favorites",
        }
    }
}

impl std::fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `POST /api/cart/sync` and `POST /api/favorites/sync`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub mode: SyncMode,
}

/// The authoritative collection returned by a sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse<T> {
    pub items: Vec<T>,
}

/// Body of `DELETE /api/favorites/remove`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveFavoriteRequest {
    pub product_id: ProductId,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_defaults_to_replace() {
        let req: SyncRequest<u32> = serde_json::from_str(r#"{"items":[1,2]}"#).unwrap();
        assert_eq!(req.mode, SyncMode::Replace);
        let req: SyncRequest<u32> = serde_json::from_str(r#"{"items":[],"mode":"merge"}"#).unwrap();
        assert_eq!(req.mode, SyncMode::Merge);
    }
}
