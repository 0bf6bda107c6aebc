//! Order aggregate, line snapshots, and the inventory reservation planner.

mod aggregate;
mod inventory;
mod state;
mod value_objects;

pub use aggregate::{NewOrder, NewOrderItem, Order, OrderItem};
pub use inventory::{Product, StockChange, plan_reservation};
pub use state::OrderStatus;
pub use value_objects::{OrderLine, Reservation};
