//! Sync coordinator: owns both collection stores, debounces their
//! reconciliation and handles login/logout transitions.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::broadcast;

use haya_core::{CartLine, CollectionKind, FavoriteEntry, Money, ProductId, SyncMode, VariantKey};

use crate::collection::CollectionEntry;
use crate::config::ClientConfig;
use crate::scheduler::DebounceScheduler;
use crate::store::{OptimisticStore, SyncBatch};
use crate::transport::{CollectionTransport, SyncError};

const EVENT_CAPACITY: usize = 64;

/// Outcome notifications for the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The server confirmed the collection.
    Synced { kind: CollectionKind },
    /// A reconciliation failed; local edits were reverted.
    RolledBack { kind: CollectionKind, reason: String },
    /// The login merge replaced the local collection.
    Merged { kind: CollectionKind, items: usize },
    /// The login merge failed; the local collection is unchanged.
    MergeFailed { kind: CollectionKind, reason: String },
}

/// One collection: its store, its debounce timer, and whether the server
/// still has to merge it.
struct Collection<T: CollectionEntry> {
    store: Mutex<OptimisticStore<T>>,
    scheduler: DebounceScheduler,
    merge_pending: AtomicBool,
    /// Held for the whole round trip; at most one request per collection is
    /// on the network.
    in_flight: tokio::sync::Mutex<()>,
}

impl<T: CollectionEntry> Collection<T> {
    fn new(config: &ClientConfig) -> Self {
        Self {
            store: Mutex::new(OptimisticStore::default()),
            scheduler: DebounceScheduler::new(config.debounce),
            merge_pending: AtomicBool::new(false),
            in_flight: tokio::sync::Mutex::new(()),
        }
    }
}

const fn sync_mode(merge_pending: bool) -> SyncMode {
    if merge_pending {
        SyncMode::Merge
    } else {
        SyncMode::Replace
    }
}

struct Inner {
    cart: Arc<Collection<CartLine>>,
    favorites: Arc<Collection<FavoriteEntry>>,
    transport: Arc<dyn CollectionTransport>,
    events: broadcast::Sender<SyncEvent>,
    authenticated: AtomicBool,
}

/// Client-side entry point for cart and favorites.
///
/// Mutations apply locally and return immediately. While a user is logged in,
/// each mutation (re)starts the collection's debounce timer; when it fires,
/// the full collection is sent to the server. Anonymous edits are confirmed
/// locally.
///
/// Methods that schedule work must be called from within a tokio runtime.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

impl SyncCoordinator {
    #[must_use]
    pub fn new(config: &ClientConfig, transport: Arc<dyn CollectionTransport>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                cart: Arc::new(Collection::new(config)),
                favorites: Arc::new(Collection::new(config)),
                transport,
                events,
                authenticated: AtomicBool::new(false),
            }),
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.authenticated.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Cart
    // =========================================================================

    #[must_use]
    pub fn cart(&self) -> Vec<CartLine> {
        self.inner.cart.store.lock().items().to_vec()
    }

    #[must_use]
    pub fn cart_total(&self) -> Money {
        self.inner.cart.store.lock().total()
    }

    #[must_use]
    pub fn cart_count(&self) -> u32 {
        self.inner.cart.store.lock().count()
    }

    #[must_use]
    pub fn is_cart_line_in_flight(&self, key: &VariantKey) -> bool {
        self.inner.cart.store.lock().is_in_flight(key)
    }

    pub fn add_to_cart(&self, line: CartLine) -> bool {
        self.mutate(&self.inner.cart, |store| store.add(line))
    }

    pub fn remove_from_cart(&self, key: &VariantKey) -> bool {
        self.mutate(&self.inner.cart, |store| store.remove(key))
    }

    /// Zero removes the line.
    pub fn update_quantity(&self, key: &VariantKey, quantity: u32) -> bool {
        self.mutate(&self.inner.cart, |store| store.update_quantity(key, quantity))
    }

    /// Empty the cart locally, e.g. after a successful checkout. The server
    /// cart is emptied by the order itself.
    pub fn clear_cart(&self) {
        self.inner.cart.scheduler.cancel();
        self.inner.cart.store.lock().replace_all(Vec::new());
    }

    // =========================================================================
    // Favorites
    // =========================================================================

    #[must_use]
    pub fn favorites(&self) -> Vec<FavoriteEntry> {
        self.inner.favorites.store.lock().items().to_vec()
    }

    #[must_use]
    pub fn is_favorite(&self, product_id: &ProductId) -> bool {
        self.inner.favorites.store.lock().is_favorite(product_id)
    }

    #[must_use]
    pub fn is_favorite_in_flight(&self, product_id: &ProductId) -> bool {
        self.inner.favorites.store.lock().is_in_flight(product_id)
    }

    pub fn add_favorite(&self, entry: FavoriteEntry) -> bool {
        self.mutate(&self.inner.favorites, |store| store.add(entry))
    }

    /// Returns whether the product is a favorite afterwards.
    pub fn toggle_favorite(&self, entry: FavoriteEntry) -> bool {
        if self.is_favorite(&entry.product_id) {
            self.remove_favorite(&entry.product_id);
            false
        } else {
            self.add_favorite(entry);
            true
        }
    }

    /// Remove a favorite. Logged-in removals hit the remove endpoint right
    /// away instead of waiting for the debounced sync.
    pub fn remove_favorite(&self, product_id: &ProductId) -> bool {
        let collection = &self.inner.favorites;
        let revision = {
            let mut store = collection.store.lock();
            if !store.remove(product_id) {
                return false;
            }
            store.revision()
        };

        if !self.is_authenticated() {
            collection.store.lock().confirm_local();
            return true;
        }

        let collection = Arc::clone(collection);
        let transport = Arc::clone(&self.inner.transport);
        let events = self.inner.events.clone();
        let product_id = product_id.clone();
        tokio::spawn(async move {
            let _turn = collection.in_flight.lock().await;
            match transport.remove_favorite(&product_id).await {
                Ok(()) => {
                    collection.store.lock().confirm_removal(&product_id, revision);
                    let _ = events.send(SyncEvent::Synced {
                        kind: CollectionKind::Favorites,
                    });
                }
                Err(e) => {
                    tracing::warn!(product_id = %product_id, error = %e, "Favorite removal failed, rolling back");
                    collection.store.lock().rollback();
                    let _ = events.send(SyncEvent::RolledBack {
                        kind: CollectionKind::Favorites,
                        reason: e.to_string(),
                    });
                }
            }
        });
        true
    }

    // =========================================================================
    // Sync lifecycle
    // =========================================================================

    fn mutate<T, F>(&self, collection: &Arc<Collection<T>>, apply: F) -> bool
    where
        T: CollectionEntry,
        F: FnOnce(&mut OptimisticStore<T>) -> bool,
    {
        let changed = {
            let mut store = collection.store.lock();
            let changed = apply(&mut store);
            if changed && !self.is_authenticated() {
                store.confirm_local();
            }
            changed
        };

        if changed && self.is_authenticated() {
            self.schedule(collection);
        }
        changed
    }

    fn schedule<T: CollectionEntry>(&self, collection: &Arc<Collection<T>>) {
        let job = reconcile(
            Arc::clone(collection),
            Arc::clone(&self.inner.transport),
            self.inner.events.clone(),
        );
        collection.scheduler.schedule(job);
    }

    /// Reconcile pending edits of one collection now, skipping the debounce.
    pub async fn flush(&self, kind: CollectionKind) {
        match kind {
            CollectionKind::Cart => self.flush_collection(&self.inner.cart).await,
            CollectionKind::Favorites => self.flush_collection(&self.inner.favorites).await,
        }
    }

    async fn flush_collection<T: CollectionEntry>(&self, collection: &Arc<Collection<T>>) {
        collection.scheduler.cancel();
        if self.is_authenticated() {
            reconcile(
                Arc::clone(collection),
                Arc::clone(&self.inner.transport),
                self.inner.events.clone(),
            )
            .await;
        }
    }

    /// Switch to logged-in mode and merge both anonymous collections into
    /// the user's stored ones.
    ///
    /// # Errors
    ///
    /// Returns the first merge failure. A failed collection keeps its local
    /// content and is merged again on its next sync.
    pub async fn on_login(&self) -> Result<(), SyncError> {
        self.inner.authenticated.store(true, Ordering::SeqCst);
        let cart = self.merge(&self.inner.cart).await;
        let favorites = self.merge(&self.inner.favorites).await;
        cart.and(favorites)
    }

    async fn merge<T: CollectionEntry>(&self, collection: &Arc<Collection<T>>) -> Result<(), SyncError> {
        collection.scheduler.cancel();
        let _turn = collection.in_flight.lock().await;
        let batch = {
            let store = collection.store.lock();
            SyncBatch {
                revision: store.revision(),
                items: store.items().to_vec(),
                keys: HashSet::new(),
            }
        };

        match T::push(self.inner.transport.as_ref(), batch.items.clone(), SyncMode::Merge).await {
            Ok(merged) => {
                let count = merged.len();
                collection.merge_pending.store(false, Ordering::SeqCst);
                let pending = {
                    let mut store = collection.store.lock();
                    store.confirm(&batch, merged);
                    store.has_pending()
                };
                tracing::info!(collection = %T::KIND, items = count, "Login merge complete");
                let _ = self.inner.events.send(SyncEvent::Merged {
                    kind: T::KIND,
                    items: count,
                });
                if pending {
                    self.schedule(collection);
                }
                Ok(())
            }
            Err(e) => {
                collection.merge_pending.store(true, Ordering::SeqCst);
                tracing::warn!(collection = %T::KIND, error = %e, "Login merge failed");
                let _ = self.inner.events.send(SyncEvent::MergeFailed {
                    kind: T::KIND,
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Switch to anonymous mode and clear both collections locally.
    pub fn on_logout(&self) {
        self.inner.authenticated.store(false, Ordering::SeqCst);
        Self::reset(&self.inner.cart);
        Self::reset(&self.inner.favorites);
    }

    fn reset<T: CollectionEntry>(collection: &Collection<T>) {
        collection.scheduler.cancel();
        collection.merge_pending.store(false, Ordering::SeqCst);
        collection.store.lock().replace_all(Vec::new());
    }
}

/// Send the collection's pending edits and apply the outcome.
///
/// Waits for any earlier request on the same collection first, so the
/// snapshot includes every edit made while that request was on the network.
async fn reconcile<T: CollectionEntry>(
    collection: Arc<Collection<T>>,
    transport: Arc<dyn CollectionTransport>,
    events: broadcast::Sender<SyncEvent>,
) {
    let _turn = collection.in_flight.lock().await;
    let Some(batch) = collection.store.lock().begin_sync() else {
        return;
    };
    let mode = sync_mode(collection.merge_pending.load(Ordering::SeqCst));

    match T::push(transport.as_ref(), batch.items.clone(), mode).await {
        Ok(authoritative) => {
            if mode == SyncMode::Merge {
                collection.merge_pending.store(false, Ordering::SeqCst);
            }
            collection.store.lock().confirm(&batch, authoritative);
            tracing::debug!(collection = %T::KIND, revision = batch.revision, "Sync confirmed");
            let _ = events.send(SyncEvent::Synced { kind: T::KIND });
        }
        Err(e) => {
            tracing::warn!(collection = %T::KIND, error = %e, "Sync failed, rolling back");
            collection.store.lock().rollback();
            let _ = events.send(SyncEvent::RolledBack {
                kind: T::KIND,
                reason: e.to_string(),
            });
        }
    }
}
