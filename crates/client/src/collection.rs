//! Entry types the optimistic store can hold.

use std::fmt::Debug;
use std::hash::Hash;

use futures::future::BoxFuture;

use haya_core::{CartLine, CollectionKind, FavoriteEntry, ProductId, SyncMode, VariantKey};

use crate::transport::{CollectionTransport, SyncError};

/// An entry of a user-owned collection.
pub trait CollectionEntry: Clone + Debug + Send + Sync + 'static {
    /// Identity of an entry; at most one entry per key.
    type Key: Clone + Debug + Eq + Hash + Send + Sync + 'static;

    const KIND: CollectionKind;

    fn key(&self) -> Self::Key;

    /// Fold `incoming` into an entry with the same key. Returns `false`
    /// when nothing changed.
    fn merge_duplicate(&mut self, incoming: Self) -> bool;

    /// Bring a fresh entry into its valid range.
    #[must_use]
    fn normalized(self) -> Self {
        self
    }

    /// Send the full collection to the server and get the stored one back.
    fn push(
        transport: &dyn CollectionTransport,
        items: Vec<Self>,
        mode: SyncMode,
    ) -> BoxFuture<'_, Result<Vec<Self>, SyncError>>;
}

impl CollectionEntry for CartLine {
    type Key = VariantKey;

    const KIND: CollectionKind = CollectionKind::Cart;

    fn key(&self) -> VariantKey {
        Self::key(self)
    }

    /// Quantities add up; the incoming stock snapshot is the newer one.
    fn merge_duplicate(&mut self, incoming: Self) -> bool {
        let before = (self.quantity, self.max_quantity);
        self.max_quantity = incoming.max_quantity;
        self.quantity = self.clamp_quantity(self.quantity.saturating_add(incoming.quantity));
        before != (self.quantity, self.max_quantity)
    }

    fn normalized(mut self) -> Self {
        self.quantity = self.clamp_quantity(self.quantity);
        self
    }

    fn push(
        transport: &dyn CollectionTransport,
        items: Vec<Self>,
        mode: SyncMode,
    ) -> BoxFuture<'_, Result<Vec<Self>, SyncError>> {
        transport.sync_cart(items, mode)
    }
}

impl CollectionEntry for FavoriteEntry {
    type Key = ProductId;

    const KIND: CollectionKind = CollectionKind::Favorites;

    fn key(&self) -> ProductId {
        self.product_id.clone()
    }

    fn merge_duplicate(&mut self, _incoming: Self) -> bool {
        false
    }

    fn push(
        transport: &dyn CollectionTransport,
        items: Vec<Self>,
        mode: SyncMode,
    ) -> BoxFuture<'_, Result<Vec<Self>, SyncError>> {
        transport.sync_favorites(items, mode)
    }
}
