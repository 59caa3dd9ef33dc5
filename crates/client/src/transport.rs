//! Transport to the storefront collection endpoints.

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{
    StatusCode,
    header::{COOKIE, HeaderValue},
};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use haya_core::{
    CartLine, CollectionKind, FavoriteEntry, ProductId, RemoveFavoriteRequest, SyncMode,
    SyncRequest, SyncResponse,
};

use crate::config::ClientConfig;

/// Errors from a sync call. Every variant leads to a rollback.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid endpoint: {0}")]
    Url(#[from] url::ParseError),

    #[error("session expired or missing")]
    Unauthorized,

    #[error("server rejected sync ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Server side of the collection sync.
#[async_trait]
pub trait CollectionTransport: Send + Sync {
    /// Send the full cart; returns the stored cart.
    async fn sync_cart(
        &self,
        items: Vec<CartLine>,
        mode: SyncMode,
    ) -> Result<Vec<CartLine>, SyncError>;

    /// Send all favorites; returns the stored favorites.
    async fn sync_favorites(
        &self,
        items: Vec<FavoriteEntry>,
        mode: SyncMode,
    ) -> Result<Vec<FavoriteEntry>, SyncError>;

    async fn remove_favorite(&self, product_id: &ProductId) -> Result<(), SyncError>;
}

/// `reqwest` implementation talking JSON to the storefront.
pub struct HttpTransport {
    client: reqwest::Client,
    config: ClientConfig,
    session_cookie: RwLock<Option<HeaderValue>>,
}

impl HttpTransport {
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            session_cookie: RwLock::new(None),
        }
    }

    /// Use (or forget) the session cookie sent with every request, given as
    /// `name=value`.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` if the cookie is not a valid header value.
    pub fn set_session_cookie(&self, cookie: Option<&str>) -> Result<(), SyncError> {
        let value = cookie
            .map(HeaderValue::from_str)
            .transpose()
            .map_err(|_| SyncError::Unauthorized)?;
        *self.session_cookie.write() = value;
        Ok(())
    }

    fn request(&self, method: reqwest::Method, path: &str) -> Result<reqwest::RequestBuilder, SyncError> {
        let url = self.config.endpoint(path)?;
        let mut builder = self.client.request(method, url);
        if let Some(cookie) = self.session_cookie.read().clone() {
            builder = builder.header(COOKIE, cookie);
        }
        Ok(builder)
    }

    async fn sync<T>(
        &self,
        kind: CollectionKind,
        items: Vec<T>,
        mode: SyncMode,
    ) -> Result<Vec<T>, SyncError>
    where
        T: Serialize + DeserializeOwned + Send,
    {
        let response = self
            .request(reqwest::Method::POST, &format!("/api/{kind}/sync"))?
            .json(&SyncRequest { items, mode })
            .send()
            .await?;

        let response = check_status(response).await?;
        let body: SyncResponse<T> = response.json().await?;
        tracing::debug!(collection = %kind, items = body.items.len(), "Collection synced");
        Ok(body.items)
    }
}

#[async_trait]
impl CollectionTransport for HttpTransport {
    async fn sync_cart(
        &self,
        items: Vec<CartLine>,
        mode: SyncMode,
    ) -> Result<Vec<CartLine>, SyncError> {
        self.sync(CollectionKind::Cart, items, mode).await
    }

    async fn sync_favorites(
        &self,
        items: Vec<FavoriteEntry>,
        mode: SyncMode,
    ) -> Result<Vec<FavoriteEntry>, SyncError> {
        self.sync(CollectionKind::Favorites, items, mode).await
    }

    async fn remove_favorite(&self, product_id: &ProductId) -> Result<(), SyncError> {
        let response = self
            .request(reqwest::Method::DELETE, "/api/favorites/remove")?
            .json(&RemoveFavoriteRequest {
                product_id: product_id.clone(),
            })
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(SyncError::Unauthorized);
    }

    let message = response
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|body| body.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_owned());

    Err(SyncError::Rejected {
        status: status.as_u16(),
        message,
    })
}
