//! Server side of the cart and favorites sync endpoints.
//!
//! `Replace` stores the incoming collection as-is (after normalization).
//! `Merge` is used once after login: the stored collection keeps its order and
//! new local entries are appended.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use tracing::instrument;

use haya_core::{CartLine, FavoriteEntry, ProductId, SyncMode, UserId};

use crate::db::{CollectionRepository, RepositoryError};

#[derive(Clone)]
pub struct CollectionService {
    repo: Arc<dyn CollectionRepository>,
}

impl CollectionService {
    #[must_use]
    pub fn new(repo: Arc<dyn CollectionRepository>) -> Self {
        Self { repo }
    }

    /// Stored cart of a user.
    ///
    /// # Errors
    ///
    /// Returns error if the cart cannot be read.
    pub async fn cart(&self, user_id: UserId) -> Result<Vec<CartLine>, RepositoryError> {
        self.repo.load_cart(user_id).await
    }

    /// Reconcile the stored cart with an incoming one and return the result.
    ///
    /// # Errors
    ///
    /// Returns error if the cart cannot be read or written.
    #[instrument(skip(self, incoming), fields(user_id = %user_id, lines = incoming.len()))]
    pub async fn sync_cart(
        &self,
        user_id: UserId,
        incoming: Vec<CartLine>,
        mode: SyncMode,
    ) -> Result<Vec<CartLine>, RepositoryError> {
        let lines = match mode {
            SyncMode::Replace => normalize_cart(incoming),
            SyncMode::Merge => {
                let stored = self.repo.load_cart(user_id).await?;
                merge_cart(stored, incoming)
            }
        };

        self.repo.save_cart(user_id, &lines).await?;
        Ok(lines)
    }

    /// Reconcile the stored favorites with incoming ones and return the result.
    ///
    /// # Errors
    ///
    /// Returns error if the favorites cannot be read or written.
    #[instrument(skip(self, incoming), fields(user_id = %user_id, entries = incoming.len()))]
    pub async fn sync_favorites(
        &self,
        user_id: UserId,
        incoming: Vec<FavoriteEntry>,
        mode: SyncMode,
    ) -> Result<Vec<FavoriteEntry>, RepositoryError> {
        let entries = match mode {
            SyncMode::Replace => merge_by(Vec::new(), incoming, favorite_key, |kept, _| kept),
            SyncMode::Merge => {
                let stored = self.repo.load_favorites(user_id).await?;
                merge_by(stored, incoming, favorite_key, |kept, _| kept)
            }
        };

        self.repo.save_favorites(user_id, &entries).await?;
        Ok(entries)
    }

    /// Remove one favorite. Removing an absent favorite is not an error.
    ///
    /// # Errors
    ///
    /// Returns error if the favorites cannot be written.
    #[instrument(skip(self), fields(user_id = %user_id, product_id = %product_id))]
    pub async fn remove_favorite(
        &self,
        user_id: UserId,
        product_id: &ProductId,
    ) -> Result<(), RepositoryError> {
        let removed = self.repo.remove_favorite(user_id, product_id).await?;
        if !removed {
            tracing::debug!("Favorite was not stored");
        }
        Ok(())
    }
}

fn favorite_key(entry: &FavoriteEntry) -> ProductId {
    entry.product_id.clone()
}

/// Deduplicate by variant (quantities summed) and clamp every quantity.
fn normalize_cart(lines: Vec<CartLine>) -> Vec<CartLine> {
    merge_by(Vec::new(), lines, CartLine::key, |mut kept, dup| {
        kept.quantity = kept.quantity.saturating_add(dup.quantity);
        kept
    })
    .into_iter()
    .map(|mut line| {
        line.quantity = line.clamp_quantity(line.quantity);
        line
    })
    .collect()
}

/// Union of the stored and local carts; the larger quantity wins.
fn merge_cart(stored: Vec<CartLine>, local: Vec<CartLine>) -> Vec<CartLine> {
    let stored = normalize_cart(stored);
    let local = normalize_cart(local);

    merge_by(stored, local, CartLine::key, |mut kept, other| {
        kept.max_quantity = kept.max_quantity.max(other.max_quantity);
        kept.quantity = kept.clamp_quantity(kept.quantity.max(other.quantity));
        kept
    })
}

/// Append `incoming` to `base`, folding entries whose key is already present
/// into the existing entry with `combine(existing, duplicate)`. Order of
/// first appearance is preserved.
fn merge_by<T, K, F, C>(base: Vec<T>, incoming: Vec<T>, key: F, combine: C) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
    C: Fn(T, T) -> T,
{
    let mut merged: Vec<Option<T>> = Vec::with_capacity(base.len() + incoming.len());
    let mut index: HashMap<K, usize> = HashMap::new();

    for item in base.into_iter().chain(incoming) {
        let k = key(&item);
        if let Some(&pos) = index.get(&k) {
            if let Some(existing) = merged[pos].take() {
                merged[pos] = Some(combine(existing, item));
            }
        } else {
            index.insert(k, merged.len());
            merged.push(Some(item));
        }
    }

    merged.into_iter().flatten().collect()
}
