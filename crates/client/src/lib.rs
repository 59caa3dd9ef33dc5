//! Haya Client - Optimistic cart and favorites.
//!
//! Local collections update instantly and converge with the server copy in
//! the background:
//!
//! - [`OptimisticStore`] holds the visible collection, the last confirmed one,
//!   and the keys whose edits the server has not acknowledged yet
//! - [`DebounceScheduler`] coalesces rapid edits into one sync per collection
//! - [`SyncCoordinator`] wires both stores to a [`CollectionTransport`] and
//!   handles login merge and logout
//! - [`HttpTransport`] talks to the storefront's `/api/cart/sync`,
//!   `/api/favorites/sync` and `/api/favorites/remove` endpoints
//!
//! A failed sync restores the last confirmed collection and publishes a
//! [`SyncEvent::RolledBack`].

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod collection;
pub mod config;
pub mod coordinator;
pub mod scheduler;
pub mod store;
pub mod transport;

pub use collection::CollectionEntry;
pub use config::{ClientConfig, DEFAULT_DEBOUNCE};
pub use coordinator::{SyncCoordinator, SyncEvent};
pub use scheduler::DebounceScheduler;
pub use store::{OptimisticStore, SyncBatch};
pub use transport::{CollectionTransport, HttpTransport, SyncError};
