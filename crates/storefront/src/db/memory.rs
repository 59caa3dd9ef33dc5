//! In-memory implementation of every repository.
//!
//! One `parking_lot::Mutex` guards the whole state, so each repository call
//! is atomic with respect to every other one. That gives the same guarantees
//! the `PostgreSQL` implementation gets from transactions and unique indexes.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use haya_core::{
    AddressId, CartLine, Email, FavoriteEntry, OrderId, OrderStatus, ProductId, ReviewId,
    StockLine, UserId, VariantKey,
};

use super::{
    CollectionRepository, CustomerRepository, InventoryRepository, OrderRepository,
    RepositoryError, ReviewRepository,
};
use crate::models::{
    Address, Customer, NewOrder, NewReview, Order, Review, ReviewStatus, StatusWrite,
};

#[derive(Default)]
struct State {
    stock: HashMap<VariantKey, u32>,
    orders: BTreeMap<OrderId, Order>,
    carts: HashMap<UserId, Vec<CartLine>>,
    favorites: HashMap<UserId, Vec<FavoriteEntry>>,
    customers: HashMap<UserId, Customer>,
    addresses: HashMap<AddressId, Address>,
    reviews: Vec<Review>,
    next_id: i32,
    fail_order_writes: bool,
}

impl State {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

/// Process-local store backing all repository traits.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a customer account.
    pub fn add_customer(&self, email: Email, first_name: &str, last_name: &str) -> UserId {
        let mut state = self.state.lock();
        let id = UserId::new(state.next_id());
        state.customers.insert(
            id,
            Customer {
                id,
                email,
                first_name: Some(first_name.to_owned()),
                last_name: Some(last_name.to_owned()),
                phone: None,
                newsletter: false,
                created_at: Utc::now(),
            },
        );
        id
    }

    /// Save a shipping address for a customer.
    pub fn add_address(&self, user_id: UserId, street: &str, city: &str) -> AddressId {
        let mut state = self.state.lock();
        let id = AddressId::new(state.next_id());
        let (first_name, last_name) = state
            .customers
            .get(&user_id)
            .map(|c| {
                (
                    c.first_name.clone().unwrap_or_default(),
                    c.last_name.clone().unwrap_or_default(),
                )
            })
            .unwrap_or_default();
        state.addresses.insert(
            id,
            Address {
                id,
                user_id,
                first_name,
                last_name,
                street: street.to_owned(),
                city: city.to_owned(),
                postal_code: "75011".to_owned(),
                country: "France".to_owned(),
                phone: None,
            },
        );
        id
    }

    /// Set the stock of a variant, creating the record if needed.
    pub fn set_stock(&self, key: VariantKey, quantity: u32) {
        self.state.lock().stock.insert(key, quantity);
    }

    /// Current stock of a variant.
    #[must_use]
    pub fn stock(&self, key: &VariantKey) -> Option<u32> {
        self.state.lock().stock.get(key).copied()
    }

    /// Snapshot of every order, oldest first.
    #[must_use]
    pub fn orders(&self) -> Vec<Order> {
        self.state.lock().orders.values().cloned().collect()
    }

    /// Snapshot of every review record.
    #[must_use]
    pub fn reviews(&self) -> Vec<Review> {
        self.state.lock().reviews.clone()
    }

    /// Customer record, as stored.
    #[must_use]
    pub fn customer(&self, id: UserId) -> Option<Customer> {
        self.state.lock().customers.get(&id).cloned()
    }

    /// Make order inserts fail with a database error (outage simulation).
    pub fn fail_order_writes(&self, fail: bool) {
        self.state.lock().fail_order_writes = fail;
    }

    /// Overwrite `delivered_at` of an order (back-dating for sweep runs).
    pub fn set_delivered_at(&self, id: OrderId, at: DateTime<Utc>) {
        if let Some(order) = self.state.lock().orders.get_mut(&id) {
            order.delivered_at = Some(at);
        }
    }
}

#[async_trait]
impl InventoryRepository for InMemoryStore {
    async fn quantities(
        &self,
        keys: &[VariantKey],
    ) -> Result<HashMap<VariantKey, u32>, RepositoryError> {
        let state = self.state.lock();
        Ok(keys
            .iter()
            .filter_map(|k| state.stock.get(k).map(|q| (k.clone(), *q)))
            .collect())
    }

    async fn reserve(&self, lines: &[StockLine]) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock();
        let mut staged = state.stock.clone();

        for line in lines {
            match staged.get_mut(&line.key()) {
                Some(on_hand) if *on_hand >= line.quantity => *on_hand -= line.quantity,
                _ => return Ok(false),
            }
        }

        state.stock = staged;
        Ok(true)
    }

    async fn decrement(&self, lines: &[StockLine]) -> Result<Vec<StockLine>, RepositoryError> {
        let mut state = self.state.lock();
        let mut shortfalls = Vec::new();

        for line in lines {
            match state.stock.get_mut(&line.key()) {
                Some(on_hand) if *on_hand >= line.quantity => *on_hand -= line.quantity,
                _ => shortfalls.push(line.clone()),
            }
        }
        Ok(shortfalls)
    }

    async fn increment(&self, lines: &[StockLine]) -> Result<(), RepositoryError> {
        let mut state = self.state.lock();
        let mut staged = state.stock.clone();

        for line in lines {
            let on_hand = staged.entry(line.key()).or_insert(0);
            *on_hand = on_hand
                .checked_add(line.quantity)
                .filter(|q| i32::try_from(*q).is_ok())
                .ok_or_else(|| {
                    RepositoryError::OutOfRange(format!(
                        "stock for {} would exceed {}",
                        line.key(),
                        i32::MAX
                    ))
                })?;
        }

        state.stock = staged;
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn insert(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
        let mut state = self.state.lock();
        if state.fail_order_writes {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }

        let duplicate = state.orders.values().any(|existing| {
            existing.order_number == order.order_number
                || (order.payment_session_id.is_some()
                    && existing.payment_session_id == order.payment_session_id)
        });
        if duplicate {
            return Err(RepositoryError::Conflict(
                "order number or payment session already exists".to_owned(),
            ));
        }

        let now = Utc::now();
        let id = OrderId::new(state.next_id());
        let created = Order {
            id,
            order_number: order.order_number.clone(),
            user_id: order.user_id,
            status: OrderStatus::Pending,
            payment_status: order.payment_status,
            totals: order.totals,
            shipping_address_id: order.shipping_address_id,
            promo_code_id: order.promo_code_id,
            customer_email: order.customer_email.clone(),
            customer_name: order.customer_name.clone(),
            customer_phone: order.customer_phone.clone(),
            payment_method: order.payment_method.clone(),
            delivery_method: order.delivery_method.clone(),
            payment_session_id: order.payment_session_id.clone(),
            payment_intent_id: order.payment_intent_id.clone(),
            notes: None,
            tracking_number: None,
            carrier: None,
            shipped_at: None,
            delivered_at: None,
            stock_reconciliation_required: false,
            totals_review_required: order.totals_review_required,
            created_at: now,
            updated_at: now,
            lines: order.lines.clone(),
        };
        state.orders.insert(id, created.clone());
        Ok(created)
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.state.lock().orders.get(&id).cloned())
    }

    async fn find_by_payment_session(
        &self,
        session_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let found = self
            .state
            .lock()
            .orders
            .values()
            .find(|o| o.payment_session_id.as_deref() == Some(session_id))
            .cloned();
        // Concurrent deliveries can interleave between this lookup and the
        // insert, as they can against the database.
        tokio::task::yield_now().await;
        Ok(found)
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        // ids are allocated in creation order
        Ok(self
            .state
            .lock()
            .orders
            .values()
            .rev()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn update_status(
        &self,
        id: OrderId,
        write: &StatusWrite,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut state = self.state.lock();
        let Some(order) = state.orders.get_mut(&id) else {
            return Ok(None);
        };
        if order.status != write.expected_status {
            return Ok(None);
        }

        order.status = write.status;
        order.shipped_at = write.shipped_at;
        order.delivered_at = write.delivered_at;
        order.tracking_number.clone_from(&write.tracking_number);
        order.carrier.clone_from(&write.carrier);
        order.notes.clone_from(&write.notes);
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }

    async fn flag_stock_reconciliation(&self, id: OrderId) -> Result<(), RepositoryError> {
        let mut state = self.state.lock();
        let order = state.orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        order.stock_reconciliation_required = true;
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn delivered_since(&self, since: DateTime<Utc>) -> Result<Vec<Order>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .orders
            .values()
            .filter(|o| {
                o.status == OrderStatus::Delivered && o.delivered_at.is_some_and(|at| at >= since)
            })
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[async_trait]
impl CollectionRepository for InMemoryStore {
    async fn load_cart(&self, user_id: UserId) -> Result<Vec<CartLine>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .carts
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_cart(&self, user_id: UserId, lines: &[CartLine]) -> Result<(), RepositoryError> {
        self.state.lock().carts.insert(user_id, lines.to_vec());
        Ok(())
    }

    async fn clear_cart(&self, user_id: UserId) -> Result<(), RepositoryError> {
        self.state.lock().carts.remove(&user_id);
        Ok(())
    }

    async fn load_favorites(
        &self,
        user_id: UserId,
    ) -> Result<Vec<FavoriteEntry>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .favorites
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_favorites(
        &self,
        user_id: UserId,
        entries: &[FavoriteEntry],
    ) -> Result<(), RepositoryError> {
        self.state.lock().favorites.insert(user_id, entries.to_vec());
        Ok(())
    }

    async fn remove_favorite(
        &self,
        user_id: UserId,
        product_id: &ProductId,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock();
        let Some(entries) = state.favorites.get_mut(&user_id) else {
            return Ok(false);
        };
        let before = entries.len();
        entries.retain(|e| &e.product_id != product_id);
        Ok(entries.len() != before)
    }
}

#[async_trait]
impl CustomerRepository for InMemoryStore {
    async fn get(&self, id: UserId) -> Result<Option<Customer>, RepositoryError> {
        Ok(self.customer(id))
    }

    async fn address(
        &self,
        user_id: UserId,
        id: AddressId,
    ) -> Result<Option<Address>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .addresses
            .get(&id)
            .filter(|a| a.user_id == user_id)
            .cloned())
    }

    async fn set_newsletter(&self, id: UserId, subscribed: bool) -> Result<(), RepositoryError> {
        let mut state = self.state.lock();
        let customer = state.customers.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        customer.newsletter = subscribed;
        Ok(())
    }
}

#[async_trait]
impl ReviewRepository for InMemoryStore {
    async fn exists_for_order(&self, order_id: OrderId) -> Result<bool, RepositoryError> {
        Ok(self
            .state
            .lock()
            .reviews
            .iter()
            .any(|r| r.order_id == order_id))
    }

    async fn insert_batch(&self, reviews: &[NewReview]) -> Result<Vec<Review>, RepositoryError> {
        let mut state = self.state.lock();
        let mut inserted = Vec::with_capacity(reviews.len());
        for review in reviews {
            let stored = Review {
                id: ReviewId::new(state.next_id()),
                order_id: review.order_id,
                user_id: review.user_id,
                product_id: review.product_id.clone(),
                product_name: review.product_name.clone(),
                customer_name: review.customer_name.clone(),
                customer_email: review.customer_email.clone(),
                status: ReviewStatus::Pending,
                email_token: review.email_token.clone(),
                email_sent_at: Some(review.email_sent_at),
                created_at: Utc::now(),
            };
            inserted.push(stored);
        }
        state.reviews.extend(inserted.iter().cloned());
        Ok(inserted)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn key(size: &str) -> VariantKey {
        VariantKey::new("robe-lin", "Sable", size)
    }

    #[tokio::test]
    async fn test_reserve_is_all_or_nothing() {
        let store = InMemoryStore::new();
        store.set_stock(key("S"), 3);
        store.set_stock(key("M"), 1);

        let lines = [StockLine::new(key("S"), 2), StockLine::new(key("M"), 2)];
        assert!(!store.reserve(&lines).await.unwrap());
        assert_eq!(store.stock(&key("S")), Some(3));
        assert_eq!(store.stock(&key("M")), Some(1));

        let lines = [StockLine::new(key("S"), 2), StockLine::new(key("M"), 1)];
        assert!(store.reserve(&lines).await.unwrap());
        assert_eq!(store.stock(&key("S")), Some(1));
        assert_eq!(store.stock(&key("M")), Some(0));
    }

    #[tokio::test]
    async fn test_reserve_counts_repeated_variant_cumulatively() {
        let store = InMemoryStore::new();
        store.set_stock(key("S"), 3);
        let lines = [StockLine::new(key("S"), 2), StockLine::new(key("S"), 2)];
        assert!(!store.reserve(&lines).await.unwrap());
        assert_eq!(store.stock(&key("S")), Some(3));
    }

    #[tokio::test]
    async fn test_decrement_reports_shortfalls_and_never_goes_negative() {
        let store = InMemoryStore::new();
        store.set_stock(key("S"), 1);
        let lines = [StockLine::new(key("S"), 2), StockLine::new(key("XL"), 1)];
        let shortfalls = store.decrement(&lines).await.unwrap();
        assert_eq!(shortfalls.len(), 2);
        assert_eq!(store.stock(&key("S")), Some(1));
    }

    #[tokio::test]
    async fn test_increment_rejects_overflow_without_partial_writes() {
        let store = InMemoryStore::new();
        store.set_stock(key("S"), 1);
        store.set_stock(key("M"), 5);
        let lines = [
            StockLine::new(key("S"), 2),
            StockLine::new(key("M"), 3_000_000_000),
        ];

        let err = store.increment(&lines).await.unwrap_err();
        assert!(matches!(err, RepositoryError::OutOfRange(_)));
        assert_eq!(store.stock(&key("S")), Some(1));
        assert_eq!(store.stock(&key("M")), Some(5));

        store.increment(&[StockLine::new(key("M"), 2)]).await.unwrap();
        assert_eq!(store.stock(&key("M")), Some(7));
    }

    #[tokio::test]
    async fn test_address_ownership() {
        let store = InMemoryStore::new();
        let alice = store.add_customer(Email::parse("alice@haya.test").unwrap(), "Alice", "B");
        let bob = store.add_customer(Email::parse("bob@haya.test").unwrap(), "Bob", "C");
        let address = store.add_address(alice, "1 rue Oberkampf", "Paris");

        assert!(store.address(alice, address).await.unwrap().is_some());
        assert!(store.address(bob, address).await.unwrap().is_none());
    }
}
