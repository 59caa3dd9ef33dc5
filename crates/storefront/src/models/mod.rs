//! Domain models for the storefront.
//!
//! These are validated domain objects, separate from database rows.

pub mod customer;
pub mod order;
pub mod review;
pub mod session;

pub use customer::{Address, Customer};
pub use order::{NewOrder, Order, OrderLine, OrderTotals, StatusWrite, generate_order_number};
pub use review::{NewReview, Review, ReviewStatus};
pub use session::{CurrentUser, keys as session_keys};
