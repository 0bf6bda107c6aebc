//! Lock, validate, then decrement.

use common::ProductId;
use domain::{Reservation, StockChange, plan_reservation};
use storage::Transaction;

use crate::error::OrderError;

/// The only path by which product stock is decremented.
pub struct InventoryLedger;

impl InventoryLedger {
    /// Reserves every line inside `tx`, or none of them.
    ///
    /// All implicated rows are locked (ascending id) before any is read, the
    /// full request is validated, and only then are the new levels written.
    /// The writes become visible when the caller commits.
    #[tracing::instrument(skip(tx, reservations), fields(lines = reservations.len()))]
    pub async fn reserve<T: Transaction>(
        tx: &mut T,
        reservations: &[Reservation],
    ) -> Result<Vec<StockChange>, OrderError> {
        let ids: Vec<ProductId> = reservations.iter().map(|r| r.product_id).collect();
        let products = tx.lock_products(&ids).await?;

        let changes = plan_reservation(&products, reservations).inspect_err(|err| {
            metrics::counter!("inventory_rejections_total").increment(1);
            tracing::info!(error = %err, "inventory reservation rejected");
        })?;

        for change in &changes {
            tx.set_inventory(change.product_id, change.remaining).await?;
            tracing::debug!(
                product_id = %change.product_id,
                previous = change.previous,
                remaining = change.remaining,
                "stock decremented"
            );
        }
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use common::Money;
    use domain::{Product, ValidationError};
    use storage::{InMemoryStore, Store};

    use super::*;

    async fn store() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .insert_product(Product::new(ProductId::new(1), "Keyboard", Money::from_cents(9999), 5))
            .await;
        store
            .insert_product(Product::new(ProductId::new(2), "Mouse", Money::from_cents(4999), 1))
            .await;
        store
    }

    #[tokio::test]
    async fn reserve_decrements_on_commit() {
        let store = store().await;
        let mut tx = store.begin().await.unwrap();

        let changes = InventoryLedger::reserve(
            &mut tx,
            &[Reservation::new(ProductId::new(2), 1), Reservation::new(ProductId::new(1), 2)],
        )
        .await
        .unwrap();
        assert_eq!(changes[0].product_id, ProductId::new(1));
        assert_eq!(changes[0].remaining, 3);
        assert_eq!(store.product(ProductId::new(1)).await.unwrap().inventory, 5);

        tx.commit().await.unwrap();
        assert_eq!(store.product(ProductId::new(1)).await.unwrap().inventory, 3);
        assert_eq!(store.product(ProductId::new(2)).await.unwrap().inventory, 0);
    }

    #[tokio::test]
    async fn shortfall_changes_nothing() {
        let store = store().await;
        let mut tx = store.begin().await.unwrap();

        let err = InventoryLedger::reserve(
            &mut tx,
            &[Reservation::new(ProductId::new(1), 2), Reservation::new(ProductId::new(2), 3)],
        )
        .await
        .unwrap_err();

        let Some(ValidationError::InsufficientInventory { insufficient_inventory }) =
            err.as_validation()
        else {
            panic!("expected insufficient inventory");
        };
        assert_eq!(insufficient_inventory.len(), 1);
        assert_eq!(insufficient_inventory[0].product_name, "Mouse");
        assert_eq!(insufficient_inventory[0].requested, 3);
        assert_eq!(insufficient_inventory[0].available, 1);

        tx.commit().await.unwrap();
        assert_eq!(store.product(ProductId::new(1)).await.unwrap().inventory, 5);
    }

    #[tokio::test]
    async fn missing_products_are_all_reported() {
        let store = store().await;
        let mut tx = store.begin().await.unwrap();

        let err = InventoryLedger::reserve(
            &mut tx,
            &[
                Reservation::new(ProductId::new(9), 1),
                Reservation::new(ProductId::new(1), 1),
                Reservation::new(ProductId::new(7), 1),
            ],
        )
        .await
        .unwrap_err();

        assert_eq!(
            err.as_validation(),
            Some(&ValidationError::ProductNotFound {
                invalid_product_ids: vec![ProductId::new(7), ProductId::new(9)]
            })
        );
    }
}
