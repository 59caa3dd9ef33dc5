//! Optimistic mutation store.
//!
//! Mutations apply to the visible collection immediately and mark the touched
//! keys in flight. A sync takes a [`SyncBatch`] snapshot; its outcome either
//! confirms the server's collection or rolls the visible collection back to
//! the last confirmed one.

use std::collections::{HashMap, HashSet};

use haya_core::{CartLine, FavoriteEntry, Money, ProductId, VariantKey};

use crate::collection::CollectionEntry;

/// Snapshot handed to a sync call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncBatch<T: CollectionEntry> {
    /// Store revision when the snapshot was taken.
    pub revision: u64,
    /// Full visible collection at dispatch time.
    pub items: Vec<T>,
    /// Keys in flight at dispatch time.
    pub keys: HashSet<T::Key>,
}

/// Visible collection plus the bookkeeping needed to roll it back.
#[derive(Debug, Clone)]
pub struct OptimisticStore<T: CollectionEntry> {
    visible: Vec<T>,
    confirmed: Vec<T>,
    /// Key to the revision of its latest mutation.
    in_flight: HashMap<T::Key, u64>,
    revision: u64,
    /// Revision of the newest batch the server has confirmed.
    confirmed_revision: u64,
}

impl<T: CollectionEntry> Default for OptimisticStore<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T: CollectionEntry> OptimisticStore<T> {
    /// Store whose visible and confirmed collections both start as `items`.
    #[must_use]
    pub fn new(items: Vec<T>) -> Self {
        Self {
            visible: items.clone(),
            confirmed: items,
            in_flight: HashMap::new(),
            revision: 0,
            confirmed_revision: 0,
        }
    }

    #[must_use]
    pub fn items(&self) -> &[T] {
        &self.visible
    }

    /// Last collection known to match the server.
    #[must_use]
    pub fn confirmed(&self) -> &[T] {
        &self.confirmed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.visible.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: &T::Key) -> bool {
        self.position(key).is_some()
    }

    #[must_use]
    pub fn get(&self, key: &T::Key) -> Option<&T> {
        self.visible.iter().find(|e| &e.key() == key)
    }

    #[must_use]
    pub fn is_in_flight(&self, key: &T::Key) -> bool {
        self.in_flight.contains_key(key)
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.in_flight.is_empty()
    }

    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    fn position(&self, key: &T::Key) -> Option<usize> {
        self.visible.iter().position(|e| &e.key() == key)
    }

    fn touch(&mut self, key: T::Key) {
        self.revision += 1;
        self.in_flight.insert(key, self.revision);
    }

    /// Add an entry, merging into an existing one with the same key.
    /// Returns `false` when the collection did not change.
    pub fn add(&mut self, entry: T) -> bool {
        let entry = entry.normalized();
        let key = entry.key();
        let changed = match self.position(&key) {
            Some(index) => self
                .visible
                .get_mut(index)
                .is_some_and(|existing| existing.merge_duplicate(entry)),
            None => {
                self.visible.push(entry);
                true
            }
        };
        if changed {
            self.touch(key);
        }
        changed
    }

    /// Remove the entry with `key`. Returns `false` when it was absent.
    pub fn remove(&mut self, key: &T::Key) -> bool {
        let Some(index) = self.position(key) else {
            return false;
        };
        self.visible.remove(index);
        self.touch(key.clone());
        true
    }

    /// Snapshot the visible collection for a sync. `None` when no edit is
    /// waiting to be confirmed.
    #[must_use]
    pub fn begin_sync(&self) -> Option<SyncBatch<T>> {
        if self.in_flight.is_empty() {
            return None;
        }
        Some(SyncBatch {
            revision: self.revision,
            items: self.visible.clone(),
            keys: self.in_flight.keys().cloned().collect(),
        })
    }

    /// Apply the server's answer to `batch`.
    ///
    /// Edits made after the batch was taken stay visible and in flight. With
    /// none left (they were rolled back), the server's collection becomes
    /// visible.
    pub fn confirm(&mut self, batch: &SyncBatch<T>, authoritative: Vec<T>) {
        if batch.revision < self.confirmed_revision {
            tracing::debug!(
                collection = %T::KIND,
                batch = batch.revision,
                confirmed = self.confirmed_revision,
                "Ignoring stale sync response"
            );
            return;
        }
        self.confirmed_revision = batch.revision;
        self.in_flight
            .retain(|_, touched| *touched > batch.revision);

        if batch.revision == self.revision || self.in_flight.is_empty() {
            self.visible.clone_from(&authoritative);
        }
        self.confirmed = authoritative;
    }

    /// Confirm a single removal acknowledged by the server.
    pub fn confirm_removal(&mut self, key: &T::Key, revision: u64) {
        self.confirmed.retain(|e| &e.key() != key);
        if self.in_flight.get(key).is_some_and(|touched| *touched <= revision) {
            self.in_flight.remove(key);
        }
    }

    /// Restore the last confirmed collection and drop every pending edit.
    pub fn rollback(&mut self) {
        self.visible.clone_from(&self.confirmed);
        self.in_flight.clear();
        self.revision += 1;
    }

    /// Accept the visible collection as-is (no server to ask).
    pub fn confirm_local(&mut self) {
        self.confirmed.clone_from(&self.visible);
        self.in_flight.clear();
        self.confirmed_revision = self.revision;
    }

    /// Replace both collections wholesale (login merge, logout).
    pub fn replace_all(&mut self, items: Vec<T>) {
        self.visible.clone_from(&items);
        self.confirmed = items;
        self.in_flight.clear();
        self.revision += 1;
        self.confirmed_revision = self.revision;
    }
}

impl OptimisticStore<CartLine> {
    /// Set a line's quantity, clamped to its stock snapshot. Zero removes
    /// the line. Returns `false` when nothing changed.
    pub fn update_quantity(&mut self, key: &VariantKey, quantity: u32) -> bool {
        if quantity == 0 {
            return self.remove(key);
        }
        let Some(line) = self.visible.iter_mut().find(|l| &l.key() == key) else {
            return false;
        };
        let clamped = line.clamp_quantity(quantity);
        if clamped == line.quantity {
            return false;
        }
        line.quantity = clamped;
        self.touch(key.clone());
        true
    }

    /// Σ unit price × quantity.
    #[must_use]
    pub fn total(&self) -> Money {
        self.visible.iter().map(CartLine::line_total).sum()
    }

    /// Σ quantity.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.visible.iter().map(|l| l.quantity).sum()
    }
}

impl OptimisticStore<FavoriteEntry> {
    /// Add the entry if absent, remove it otherwise. Returns whether the
    /// product is a favorite afterwards.
    pub fn toggle(&mut self, entry: FavoriteEntry) -> bool {
        let key = entry.product_id.clone();
        if self.remove(&key) {
            false
        } else {
            self.add(entry);
            true
        }
    }

    #[must_use]
    pub fn is_favorite(&self, product_id: &ProductId) -> bool {
        self.contains(product_id)
    }
}
