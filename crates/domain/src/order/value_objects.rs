//! Value objects for the order domain.

use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

/// A request to take `quantity` units of a product out of stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl Reservation {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// A requested order line carrying the catalog snapshot taken at order time.
///
/// The name and price here are what the order item persists; they are never
/// re-read from the product row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub product_name: String,
    pub price: Money,
}

impl OrderLine {
    /// Creates a new order line.
    pub fn new(
        product_id: ProductId,
        quantity: u32,
        product_name: impl Into<String>,
        price: Money,
    ) -> Self {
        Self {
            product_id,
            quantity,
            product_name: product_name.into(),
            price,
        }
    }

    /// The stock reservation this line needs.
    pub fn reservation(&self) -> Reservation {
        Reservation::new(self.product_id, self.quantity)
    }

    /// Returns the total price for this line (quantity * price).
    pub fn line_total(&self) -> Money {
        self.price.multiply(self.quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_line_total() {
        let line = OrderLine::new(ProductId::new(1), 3, "Widget", Money::from_cents(1000));
        assert_eq!(line.line_total(), Money::from_cents(3000));
    }

    #[test]
    fn test_order_line_reservation() {
        let line = OrderLine::new(ProductId::new(7), 2, "Gadget", Money::from_cents(500));
        assert_eq!(line.reservation(), Reservation::new(ProductId::new(7), 2));
    }
}
