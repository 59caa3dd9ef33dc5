//! Persistence for the storefront.
//!
//! # Tables
//!
//! - `customers`, `addresses` - Accounts (written by the auth collaborator)
//! - `product_variants` - Stock per (product, color, size), `quantity >= 0`
//! - `orders`, `order_lines` - Orders and their immutable line snapshots
//! - `cart_lines`, `favorites` - Authoritative copies of client collections
//! - `reviews` - Pending review requests
//! - `tower_sessions.session` - Session storage
//!
//! Every repository is a trait with a `PostgreSQL` implementation and an
//! in-memory one ([`memory::InMemoryStore`]) used by tests and local runs.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p haya-cli -- migrate
//! ```

pub mod collections;
pub mod customers;
pub mod inventory;
pub mod memory;
pub mod orders;
pub mod reviews;

use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use collections::{CollectionRepository, PgCollectionRepository};
pub use customers::{CustomerRepository, PgCustomerRepository};
pub use inventory::{InventoryRepository, PgInventoryRepository};
pub use memory::InMemoryStore;
pub use orders::{OrderRepository, PgOrderRepository};
pub use reviews::{PgReviewRepository, ReviewRepository};

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate order number or payment session).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// A value does not fit its column.
    #[error("value out of range: {0}")]
    OutOfRange(String),
}

/// Map a unique violation to [`RepositoryError::Conflict`].
pub(crate) fn conflict_on_unique(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(e)
}

/// Convert a stored `INTEGER` quantity, rejecting negative values.
pub(crate) fn stored_quantity(value: i32, column: &str) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::DataCorruption(format!("negative {column} in database: {value}"))
    })
}

/// Quantity as an `INTEGER` bind parameter.
pub(crate) fn quantity_param(quantity: u32) -> Result<i32, RepositoryError> {
    i32::try_from(quantity)
        .map_err(|_| RepositoryError::OutOfRange(format!("quantity {quantity} exceeds {}", i32::MAX)))
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// The full set of repositories used by the services.
#[derive(Clone)]
pub struct Repositories {
    pub inventory: Arc<dyn InventoryRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub collections: Arc<dyn CollectionRepository>,
    pub customers: Arc<dyn CustomerRepository>,
    pub reviews: Arc<dyn ReviewRepository>,
}

impl Repositories {
    /// `PostgreSQL`-backed repositories sharing one pool.
    #[must_use]
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            inventory: Arc::new(PgInventoryRepository::new(pool.clone())),
            orders: Arc::new(PgOrderRepository::new(pool.clone())),
            collections: Arc::new(PgCollectionRepository::new(pool.clone())),
            customers: Arc::new(PgCustomerRepository::new(pool.clone())),
            reviews: Arc::new(PgReviewRepository::new(pool.clone())),
        }
    }

    /// Repositories backed by a single in-memory store.
    #[must_use]
    pub fn in_memory(store: &Arc<InMemoryStore>) -> Self {
        Self {
            inventory: store.clone(),
            orders: store.clone(),
            collections: store.clone(),
            customers: store.clone(),
            reviews: store.clone(),
        }
    }
}
