//! Stock checks and reservations.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::instrument;

use haya_core::{StockAvailability, StockLine, VariantKey};

use crate::db::{InventoryRepository, RepositoryError};

/// Errors from inventory operations.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// At least one line cannot be fulfilled. Carries the failing lines.
    #[error("insufficient stock for {} line(s)", .0.len())]
    InsufficientStock(Vec<StockAvailability>),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Inventory operations on top of an [`InventoryRepository`].
#[derive(Clone)]
pub struct InventoryService {
    repo: Arc<dyn InventoryRepository>,
}

impl InventoryService {
    #[must_use]
    pub fn new(repo: Arc<dyn InventoryRepository>) -> Self {
        Self { repo }
    }

    /// Per-line availability against current stock. Read-only.
    ///
    /// Lines for the same variant draw from the same stock, so each line is
    /// evaluated against what the earlier lines left over.
    ///
    /// # Errors
    ///
    /// Returns error if the stock cannot be read.
    #[instrument(skip_all, fields(lines = lines.len()))]
    pub async fn check_availability(
        &self,
        lines: &[StockLine],
    ) -> Result<Vec<StockAvailability>, InventoryError> {
        let keys: Vec<VariantKey> = lines.iter().map(StockLine::key).collect();
        let on_hand = self.repo.quantities(&keys).await?;
        Ok(availability_report(lines, &on_hand))
    }

    /// Atomically decrement every line, or none.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientStock` with the failing lines when any line is
    /// short, leaving stock untouched.
    #[instrument(skip_all, fields(lines = lines.len()))]
    pub async fn reserve(&self, lines: &[StockLine]) -> Result<(), InventoryError> {
        if self.repo.reserve(lines).await? {
            return Ok(());
        }

        let report = self.check_availability(lines).await?;
        let unavailable: Vec<StockAvailability> = report
            .iter()
            .filter(|line| !line.is_available())
            .cloned()
            .collect();

        tracing::info!(unavailable = unavailable.len(), "Stock reservation refused");

        // Stock moved between the refusal and the re-read; report every line.
        if unavailable.is_empty() {
            return Err(InventoryError::InsufficientStock(report));
        }
        Err(InventoryError::InsufficientStock(unavailable))
    }

    /// Conditionally decrement each line. Returns the lines that could not be
    /// decremented; they are left untouched.
    ///
    /// # Errors
    ///
    /// Returns error if the stock cannot be written.
    #[instrument(skip_all, fields(lines = lines.len()))]
    pub async fn decrement(&self, lines: &[StockLine]) -> Result<Vec<StockLine>, InventoryError> {
        Ok(self.repo.decrement(lines).await?)
    }

    /// Return stock (cancellation, refund, released reservation).
    ///
    /// # Errors
    ///
    /// Returns error if the stock cannot be written.
    #[instrument(skip_all, fields(lines = lines.len()))]
    pub async fn increment(&self, lines: &[StockLine]) -> Result<(), InventoryError> {
        Ok(self.repo.increment(lines).await?)
    }

    /// Add units to a variant, creating its record if needed.
    ///
    /// # Errors
    ///
    /// Returns error if the stock cannot be written.
    #[instrument(skip(self), fields(variant = %line.key()))]
    pub async fn restock(&self, line: StockLine) -> Result<u32, InventoryError> {
        let key = line.key();
        self.repo.increment(std::slice::from_ref(&line)).await?;
        let on_hand = self.repo.quantities(std::slice::from_ref(&key)).await?;
        Ok(on_hand.get(&key).copied().unwrap_or(0))
    }
}

fn availability_report(
    lines: &[StockLine],
    on_hand: &HashMap<VariantKey, u32>,
) -> Vec<StockAvailability> {
    let mut claimed: HashMap<VariantKey, u32> = HashMap::new();

    lines
        .iter()
        .map(|line| {
            let key = line.key();
            let already = claimed.get(&key).copied().unwrap_or(0);
            let remaining = on_hand.get(&key).map(|q| q.saturating_sub(already));
            claimed.insert(key, already.saturating_add(line.quantity));
            StockAvailability::evaluate(line, remaining)
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::InMemoryStore;

    fn key(size: &str) -> VariantKey {
        VariantKey::new("chemise-coton", "Blanc", size)
    }

    fn service() -> (Arc<InMemoryStore>, InventoryService) {
        let store = Arc::new(InMemoryStore::new());
        let service = InventoryService::new(store.clone());
        (store, service)
    }

    #[tokio::test]
    async fn test_check_availability_reasons() {
        let (store, service) = service();
        store.set_stock(key("S"), 0);
        store.set_stock(key("M"), 2);

        let report = service
            .check_availability(&[
                StockLine::new(key("S"), 1),
                StockLine::new(key("M"), 3),
                StockLine::new(key("L"), 1),
            ])
            .await
            .unwrap();

        assert_eq!(report[0].message.as_deref(), Some("Rupture de stock"));
        assert_eq!(report[1].message.as_deref(), Some("Stock insuffisant (2 disponible(s))"));
        assert_eq!(report[2].message.as_deref(), Some("Variante introuvable"));
    }

    #[tokio::test]
    async fn test_check_availability_accumulates_same_variant() {
        let (store, service) = service();
        store.set_stock(key("M"), 3);

        let report = service
            .check_availability(&[StockLine::new(key("M"), 2), StockLine::new(key("M"), 2)])
            .await
            .unwrap();

        assert!(report[0].is_available());
        assert!(!report[1].is_available());
        assert_eq!(report[1].available, 1);
    }

    #[tokio::test]
    async fn test_check_availability_handles_huge_repeated_quantities() {
        let (store, service) = service();
        store.set_stock(key("M"), 10);

        let report = service
            .check_availability(&[
                StockLine::new(key("M"), 3_000_000_000),
                StockLine::new(key("M"), 3_000_000_000),
            ])
            .await
            .unwrap();

        assert_eq!(report[0].available, 10);
        assert!(!report[0].is_available());
        assert_eq!(report[1].available, 0);
        assert!(!report[1].is_available());
    }

    #[tokio::test]
    async fn test_reserve_reports_only_failing_lines() {
        let (store, service) = service();
        store.set_stock(key("S"), 5);
        store.set_stock(key("M"), 1);

        let err = service
            .reserve(&[StockLine::new(key("S"), 2), StockLine::new(key("M"), 2)])
            .await
            .unwrap_err();

        let InventoryError::InsufficientStock(lines) = err else {
            panic!("expected insufficient stock");
        };
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].size, "M");
        assert_eq!(store.stock(&key("S")), Some(5));
    }

    #[tokio::test]
    async fn test_restock_creates_record() {
        let (store, service) = service();
        assert_eq!(service.restock(StockLine::new(key("XL"), 4)).await.unwrap(), 4);
        assert_eq!(service.restock(StockLine::new(key("XL"), 1)).await.unwrap(), 5);
        assert_eq!(store.stock(&key("XL")), Some(5));
    }

    #[tokio::test]
    async fn test_restock_past_column_range_is_an_error() {
        let (store, service) = service();
        store.set_stock(key("XL"), 2);
        let err = service
            .restock(StockLine::new(key("XL"), u32::MAX))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            InventoryError::Repository(RepositoryError::OutOfRange(_))
        ));
        assert_eq!(store.stock(&key("XL")), Some(2));
    }
}
