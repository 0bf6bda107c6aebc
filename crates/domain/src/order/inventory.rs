//! Products and the pure half of the inventory reservation protocol.

use std::collections::{BTreeMap, HashMap};

use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::{Shortfall, ValidationError};

use super::Reservation;

/// A catalog product and its stock level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub inventory: u32,
}

impl Product {
    pub fn new(id: ProductId, name: impl Into<String>, price: Money, inventory: u32) -> Self {
        Self {
            id,
            name: name.into(),
            price,
            inventory,
        }
    }
}

/// A validated stock decrement for one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockChange {
    pub product_id: ProductId,
    pub previous: u32,
    pub remaining: u32,
}

/// Validates a full set of reservations against locked product rows.
///
/// `products` must be the current, locked state of every product the caller
/// could find. Requests for the same product are summed. Nothing is applied:
/// on success the returned changes, in ascending product id order, are the
/// new stock levels to write.
///
/// Fails with every missing id, or else with every shortfall, so callers
/// never see a partial picture.
pub fn plan_reservation(
    products: &[Product],
    requests: &[Reservation],
) -> Result<Vec<StockChange>, ValidationError> {
    let by_id: HashMap<ProductId, &Product> = products.iter().map(|p| (p.id, p)).collect();

    let mut requested: BTreeMap<ProductId, u32> = BTreeMap::new();
    for request in requests {
        let total = requested.entry(request.product_id).or_default();
        *total = total.saturating_add(request.quantity);
    }

    let missing: Vec<ProductId> = requested
        .keys()
        .filter(|id| !by_id.contains_key(*id))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::ProductNotFound {
            invalid_product_ids: missing,
        });
    }

    let mut changes = Vec::with_capacity(requested.len());
    let mut shortfalls = Vec::new();
    for (product_id, quantity) in &requested {
        let Some(product) = by_id.get(product_id) else {
            continue;
        };
        match product.inventory.checked_sub(*quantity) {
            Some(remaining) => changes.push(StockChange {
                product_id: *product_id,
                previous: product.inventory,
                remaining,
            }),
            None => shortfalls.push(Shortfall {
                product_id: *product_id,
                product_name: product.name.clone(),
                requested: *quantity,
                available: product.inventory,
            }),
        }
    }

    if !shortfalls.is_empty() {
        return Err(ValidationError::InsufficientInventory {
            insufficient_inventory: shortfalls,
        });
    }

    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: i64, inventory: u32) -> Product {
        Product::new(
            ProductId::new(id),
            format!("Product {id}"),
            Money::from_cents(1000),
            inventory,
        )
    }

    fn reserve(id: i64, quantity: u32) -> Reservation {
        Reservation::new(ProductId::new(id), quantity)
    }

    #[test]
    fn plans_decrements_in_ascending_id_order() {
        let products = vec![product(2, 5), product(1, 10)];
        let changes = plan_reservation(&products, &[reserve(2, 5), reserve(1, 3)]).unwrap();

        assert_eq!(
            changes,
            vec![
                StockChange {
                    product_id: ProductId::new(1),
                    previous: 10,
                    remaining: 7,
                },
                StockChange {
                    product_id: ProductId::new(2),
                    previous: 5,
                    remaining: 0,
                },
            ]
        );
    }

    #[test]
    fn reports_every_missing_product() {
        let products = vec![product(1, 10)];
        let err = plan_reservation(&products, &[reserve(9, 1), reserve(1, 1), reserve(4, 1)])
            .unwrap_err();

        assert_eq!(
            err,
            ValidationError::ProductNotFound {
                invalid_product_ids: vec![ProductId::new(4), ProductId::new(9)],
            }
        );
    }

    #[test]
    fn reports_every_shortfall() {
        let products = vec![product(1, 1), product(2, 100), product(3, 0)];
        let err = plan_reservation(&products, &[reserve(1, 2), reserve(2, 5), reserve(3, 1)])
            .unwrap_err();

        let ValidationError::InsufficientInventory {
            insufficient_inventory,
        } = err
        else {
            panic!("expected insufficient inventory");
        };
        assert_eq!(insufficient_inventory.len(), 2);
        assert_eq!(insufficient_inventory[0].product_id, ProductId::new(1));
        assert_eq!(insufficient_inventory[0].requested, 2);
        assert_eq!(insufficient_inventory[0].available, 1);
        assert_eq!(insufficient_inventory[1].product_id, ProductId::new(3));
        assert_eq!(insufficient_inventory[1].product_name, "Product 3");
    }

    #[test]
    fn missing_products_take_precedence_over_shortfalls() {
        let products = vec![product(1, 0)];
        let err = plan_reservation(&products, &[reserve(1, 5), reserve(2, 1)]).unwrap_err();
        assert!(matches!(err, ValidationError::ProductNotFound { .. }));
    }

    #[test]
    fn repeated_requests_are_summed() {
        let products = vec![product(1, 5)];
        let err = plan_reservation(&products, &[reserve(1, 3), reserve(1, 3)]).unwrap_err();
        assert!(matches!(err, ValidationError::InsufficientInventory { .. }));

        let changes = plan_reservation(&products, &[reserve(1, 2), reserve(1, 3)]).unwrap();
        assert_eq!(changes[0].remaining, 0);
    }
}
