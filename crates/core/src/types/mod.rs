//! Core types for Haya.
//!
//! This module provides type-safe wrappers for the storefront domain.

pub mod collection;
pub mod email;
pub mod id;
pub mod money;
pub mod status;
pub mod stock;
pub mod sync;
pub mod variant;

pub use collection::{CartLine, FavoriteEntry};
pub use email::{Email, EmailError};
pub use id::*;
pub use money::{MONEY_TOLERANCE, Money};
pub use status::*;
pub use stock::{StockAvailability, StockLine};
pub use sync::{CollectionKind, RemoveFavoriteRequest, SyncMode, SyncRequest, SyncResponse};
pub use variant::VariantKey;
