//! Client configuration.

use std::time::Duration;

use url::Url;

/// Default delay between the last local edit and the sync call.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(1);

/// Settings for the sync coordinator and its HTTP transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Storefront origin, e.g. `https://haya-wear.fr`.
    pub base_url: Url,
    /// Debounce window applied per collection.
    pub debounce: Duration,
}

impl ClientConfig {
    /// Configuration with the default debounce.
    ///
    /// # Errors
    ///
    /// Returns error if `base_url` is not an absolute URL.
    pub fn new(base_url: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            base_url: Url::parse(base_url)?,
            debounce: DEFAULT_DEBOUNCE,
        })
    }

    #[must_use]
    pub const fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Absolute URL of an API path.
    ///
    /// # Errors
    ///
    /// Returns error if `path` cannot be joined onto the base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(path)
    }
}
