//! Haya Core - Shared domain types.
//!
//! This crate provides the types shared by every Haya component:
//! - `storefront` - HTTP server (collections, checkout, orders, payment webhook)
//! - `client` - Optimistic cart/favorites stores and the sync coordinator
//! - `cli` - Command-line tools for migrations and operator jobs
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. Both the server and the client depend on it, so the
//! JSON shapes exchanged between them are defined exactly once.
//!
//! # Modules
//!
//! - [`types`] - Ids, emails, money, variants, collection entries, stock and
//!   sync payloads, order statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
