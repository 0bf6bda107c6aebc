//! Cached product catalog used to price incoming order lines.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use common::ProductId;
use domain::{OrderLine, Product, Reservation, ValidationError};
use storage::{Store, Transaction};
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::OrderError;

pub const DEFAULT_CATALOG_TTL: Duration = Duration::from_secs(24 * 60 * 60);

struct Snapshot {
    loaded_at: Instant,
    products: Arc<HashMap<ProductId, Product>>,
}

/// Read-through cache over the product table.
///
/// Prices and names come from here when an order is placed; stock levels in
/// the cache are never trusted, the ledger re-reads them under lock.
pub struct Catalog<S: Store> {
    store: S,
    ttl: Duration,
    snapshot: RwLock<Option<Snapshot>>,
}

impl<S: Store> Catalog<S> {
    pub fn new(store: S, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            snapshot: RwLock::new(None),
        }
    }

    /// Turns `(product, quantity)` requests into priced order lines.
    ///
    /// Fails with every unknown product id when any is unknown.
    pub async fn resolve(&self, requests: &[Reservation]) -> Result<Vec<OrderLine>, OrderError> {
        let products = self.products().await?;

        let missing: BTreeSet<ProductId> = requests
            .iter()
            .map(|r| r.product_id)
            .filter(|id| !products.contains_key(id))
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::ProductNotFound {
                invalid_product_ids: missing.into_iter().collect(),
            }
            .into());
        }

        Ok(requests
            .iter()
            .filter_map(|request| {
                products.get(&request.product_id).map(|product| {
                    OrderLine::new(product.id, request.quantity, product.name.clone(), product.price)
                })
            })
            .collect())
    }

    /// Creates or replaces a product and drops the cached snapshot.
    #[tracing::instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn upsert_product(&self, product: &Product) -> Result<(), OrderError> {
        let mut tx = self.store.begin().await?;
        tx.upsert_product(product).await?;
        tx.commit().await?;
        self.invalidate().await;
        Ok(())
    }

    /// Forces the next lookup to reload from the store.
    pub async fn invalidate(&self) {
        *self.snapshot.write().await = None;
    }

    async fn products(&self) -> Result<Arc<HashMap<ProductId, Product>>, OrderError> {
        if let Some(snapshot) = self.snapshot.read().await.as_ref()
            && snapshot.loaded_at.elapsed() < self.ttl
        {
            return Ok(snapshot.products.clone());
        }

        let mut guard = self.snapshot.write().await;
        if let Some(snapshot) = guard.as_ref()
            && snapshot.loaded_at.elapsed() < self.ttl
        {
            return Ok(snapshot.products.clone());
        }

        let mut tx = self.store.begin().await?;
        let products: HashMap<_, _> = tx
            .list_products()
            .await?
            .into_iter()
            .map(|product| (product.id, product))
            .collect();
        let products = Arc::new(products);
        tracing::debug!(count = products.len(), "catalog reloaded");

        *guard = Some(Snapshot {
            loaded_at: Instant::now(),
            products: products.clone(),
        });
        Ok(products)
    }
}

#[cfg(test)]
mod tests {
    use common::Money;
    use storage::InMemoryStore;

    use super::*;

    async fn catalog(ttl: Duration) -> (InMemoryStore, Catalog<InMemoryStore>) {
        let store = InMemoryStore::new();
        store
            .insert_product(Product::new(ProductId::new(1), "Keyboard", Money::from_cents(9999), 5))
            .await;
        (store.clone(), Catalog::new(store, ttl))
    }

    #[tokio::test]
    async fn resolves_lines_with_snapshot_prices() {
        let (_, catalog) = catalog(DEFAULT_CATALOG_TTL).await;
        let lines = catalog
            .resolve(&[Reservation::new(ProductId::new(1), 2)])
            .await
            .unwrap();
        assert_eq!(
            lines,
            vec![OrderLine::new(ProductId::new(1), 2, "Keyboard", Money::from_cents(9999))]
        );
    }

    #[tokio::test]
    async fn unknown_ids_are_listed() {
        let (_, catalog) = catalog(DEFAULT_CATALOG_TTL).await;
        let err = catalog
            .resolve(&[
                Reservation::new(ProductId::new(4), 1),
                Reservation::new(ProductId::new(1), 1),
                Reservation::new(ProductId::new(3), 1),
            ])
            .await
            .unwrap_err();
        assert_eq!(
            err.as_validation(),
            Some(&ValidationError::ProductNotFound {
                invalid_product_ids: vec![ProductId::new(3), ProductId::new(4)]
            })
        );
    }

    #[tokio::test]
    async fn cached_prices_survive_until_invalidated() {
        let (store, catalog) = catalog(DEFAULT_CATALOG_TTL).await;
        let request = [Reservation::new(ProductId::new(1), 1)];
        catalog.resolve(&request).await.unwrap();

        store
            .insert_product(Product::new(ProductId::new(1), "Keyboard", Money::from_cents(5000), 5))
            .await;
        assert_eq!(catalog.resolve(&request).await.unwrap()[0].price, Money::from_cents(9999));

        catalog.invalidate().await;
        assert_eq!(catalog.resolve(&request).await.unwrap()[0].price, Money::from_cents(5000));
    }

    #[tokio::test]
    async fn upsert_refreshes_cache() {
        let (_, catalog) = catalog(DEFAULT_CATALOG_TTL).await;
        catalog.resolve(&[Reservation::new(ProductId::new(1), 1)]).await.unwrap();

        catalog
            .upsert_product(&Product::new(ProductId::new(2), "Mouse", Money::from_cents(4999), 3))
            .await
            .unwrap();
        let lines = catalog.resolve(&[Reservation::new(ProductId::new(2), 1)]).await.unwrap();
        assert_eq!(lines[0].product_name, "Mouse");
    }

    #[tokio::test]
    async fn expired_snapshot_reloads() {
        let (store, catalog) = catalog(Duration::from_millis(20)).await;
        let request = [Reservation::new(ProductId::new(1), 1)];
        catalog.resolve(&request).await.unwrap();

        store
            .insert_product(Product::new(ProductId::new(1), "Keyboard v2", Money::from_cents(9999), 5))
            .await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(catalog.resolve(&request).await.unwrap()[0].product_name, "Keyboard v2");
    }
}
