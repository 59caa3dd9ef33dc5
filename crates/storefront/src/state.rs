//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::StorefrontConfig;
use crate::db::Repositories;
use crate::middleware::UserRateLimiter;
use crate::services::{
    CollectionService, InventoryService, NotificationDispatcher, OrderOrchestrator, ReviewService,
    StatusMachine, WebhookHandler,
};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and owns the services built
/// once at start-up over the configured repositories.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    repos: Repositories,
    notifier: Arc<dyn NotificationDispatcher>,
    rate_limiter: Arc<UserRateLimiter>,
    inventory: InventoryService,
    collections: CollectionService,
    orders: OrderOrchestrator,
    status: StatusMachine,
    reviews: ReviewService,
    webhook: WebhookHandler,
}

impl AppState {
    /// Wire every service over `repos`.
    #[must_use]
    pub fn new(
        config: StorefrontConfig,
        repos: Repositories,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        let rate_limiter = Arc::new(UserRateLimiter::orders(config.order_rate_limit));
        let inventory = InventoryService::new(repos.inventory.clone());
        let collections = CollectionService::new(repos.collections.clone());
        let orders = OrderOrchestrator::new(
            &repos,
            inventory.clone(),
            notifier.clone(),
            rate_limiter.clone(),
            config.notifications.operator_email.clone(),
        );
        let reviews = ReviewService::new(&repos, notifier.clone(), &config.base_url);
        let status = StatusMachine::new(
            &repos,
            inventory.clone(),
            reviews.clone(),
            notifier.clone(),
        );
        let webhook = WebhookHandler::new(&config.payment, orders.clone());

        Self {
            inner: Arc::new(AppStateInner {
                config,
                repos,
                notifier,
                rate_limiter,
                inventory,
                collections,
                orders,
                status,
                reviews,
                webhook,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn repos(&self) -> &Repositories {
        &self.inner.repos
    }

    #[must_use]
    pub fn notifier(&self) -> &dyn NotificationDispatcher {
        self.inner.notifier.as_ref()
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &UserRateLimiter {
        &self.inner.rate_limiter
    }

    #[must_use]
    pub fn inventory(&self) -> &InventoryService {
        &self.inner.inventory
    }

    #[must_use]
    pub fn collections(&self) -> &CollectionService {
        &self.inner.collections
    }

    #[must_use]
    pub fn orders(&self) -> &OrderOrchestrator {
        &self.inner.orders
    }

    #[must_use]
    pub fn status(&self) -> &StatusMachine {
        &self.inner.status
    }

    #[must_use]
    pub fn reviews(&self) -> &ReviewService {
        &self.inner.reviews
    }

    #[must_use]
    pub fn webhook(&self) -> &WebhookHandler {
        &self.inner.webhook
    }
}
