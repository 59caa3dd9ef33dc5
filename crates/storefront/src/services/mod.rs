//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `inventory` - Stock checks, atomic reservation, release and restock
//! - `orders` - Order orchestrator (checkout and confirmed payments)
//! - `status` - Order status machine and its side effects
//! - `webhook` - Payment gateway webhook verification and processing
//! - `reviews` - Review requests for delivered orders
//! - `collections` - Server side of the cart and favorites sync
//! - `notifications` - Outbound notification payloads and dispatchers

pub mod collections;
pub mod inventory;
pub mod notifications;
pub mod orders;
pub mod reviews;
pub mod status;
pub mod webhook;

pub use collections::CollectionService;
pub use inventory::{InventoryError, InventoryService};
pub use notifications::{
    HttpNotificationDispatcher, LogNotificationDispatcher, MemoryNotificationDispatcher,
    Notification, NotificationDispatcher, NotificationError, build_dispatcher,
    dispatch_best_effort,
};
pub use orders::{
    CheckoutItem, CheckoutRequest, OrderError, OrderOrchestrator, PaymentConfirmation,
    PaymentOutcome, PlacedOrder,
};
pub use reviews::{ReviewService, ReviewTrigger, SweepReport};
pub use status::{StatusError, StatusMachine, StatusUpdate, tracking_url};
pub use webhook::{WebhookError, WebhookHandler, WebhookOutcome};
