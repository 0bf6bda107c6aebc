//! Integration tests for the order, payment, and notification entities.
//!
//! These tests drive the public API the workflow crates rely on: planning a
//! reservation, building an order from line snapshots, and settling it.

use chrono::Utc;
use common::{Money, NotificationId, OrderId, OrderItemId, PaymentId, ProductId, UserId};
use domain::{
    Actor, Channel, DomainError, NewNotification, NewOrder, NewOrderItem, NewPayment, OrderLine,
    OrderStatus, PaymentStatus, PermissionError, Product, User, ValidationError, idempotency_key,
    plan_reservation,
};
use rust_decimal_macros::dec;
use serde_json::json;

mod order_placement {
    use super::*;

    #[test]
    fn reservation_then_items_then_total() {
        let products = vec![
            Product::new(ProductId::new(1), "Keyboard", Money::new(dec!(99.99)), 10),
            Product::new(ProductId::new(2), "Mouse", Money::new(dec!(49.99)), 3),
        ];
        let lines = vec![
            OrderLine::new(ProductId::new(1), 2, "Keyboard", Money::new(dec!(99.99))),
            OrderLine::new(ProductId::new(2), 1, "Mouse", Money::new(dec!(49.99))),
        ];
        let reservations: Vec<_> = lines.iter().map(OrderLine::reservation).collect();

        let changes = plan_reservation(&products, &reservations).unwrap();
        assert_eq!(changes[0].remaining, 8);
        assert_eq!(changes[1].remaining, 2);

        let mut order = NewOrder {
            user_id: UserId::new(1),
            address: "221B Baker St".to_string(),
        }
        .into_order(OrderId::new(7), Utc::now());
        let items: Vec<_> = lines
            .iter()
            .zip(1..)
            .map(|(line, id)| NewOrderItem::from_line(order.id, line).into_item(OrderItemId::new(id)))
            .collect();

        assert_eq!(order.recalculate_total(&items).amount(), dec!(249.97));
    }

    #[test]
    fn snapshot_price_is_independent_of_catalog() {
        let line = OrderLine::new(ProductId::new(1), 1, "Old name", Money::from_cents(500));
        let item = NewOrderItem::from_line(OrderId::new(1), &line).into_item(OrderItemId::new(1));

        let repriced = Product::new(ProductId::new(1), "New name", Money::from_cents(900), 5);
        assert_ne!(item.price, repriced.price);
        assert_eq!(item.product_name, "Old name");
    }

    #[test]
    fn oversold_line_changes_nothing() {
        let products = vec![Product::new(ProductId::new(1), "Lamp", Money::from_cents(100), 1)];
        let err = plan_reservation(
            &products,
            &[OrderLine::new(ProductId::new(1), 2, "Lamp", Money::from_cents(100)).reservation()],
        )
        .unwrap_err();

        assert!(matches!(err, ValidationError::InsufficientInventory { .. }));
        assert_eq!(products[0].inventory, 1);
    }
}

mod payment_settlement {
    use super::*;

    #[test]
    fn payment_success_pays_the_order() {
        let owner = UserId::new(1);
        let mut order = NewOrder {
            user_id: owner,
            address: "1 Main St".to_string(),
        }
        .into_order(OrderId::new(1), Utc::now());
        let mut payment = NewPayment {
            order_id: order.id,
            amount: order.total_amount,
        }
        .into_payment(PaymentId::new(1), Utc::now());

        Actor::customer(owner).ensure_owner(order.id, order.user_id).unwrap();
        order.ensure_payable().unwrap();
        payment.confirm(Some("UTR-1".to_string())).unwrap();
        order.mark_paid().unwrap();

        assert_eq!(payment.status, PaymentStatus::Success);
        assert_eq!(order.status, OrderStatus::Paid);
        assert!(order.ensure_payable().is_err());
    }

    #[test]
    fn stranger_cannot_pay() {
        let err = Actor::customer(UserId::new(2))
            .ensure_owner(OrderId::new(1), UserId::new(1))
            .unwrap_err();
        assert_eq!(
            DomainError::from(err),
            DomainError::Permission(PermissionError::NotOrderOwner {
                user_id: UserId::new(2),
                order_id: OrderId::new(1),
            })
        );
    }
}

mod notification_targets {
    use super::*;

    #[test]
    fn opted_in_channels_drive_rows() {
        let user = User::new(UserId::new(1), "alice")
            .with_email("alice@example.com")
            .with_phone("+15550100")
            .with_preferences(true, true);

        let rows: Vec<_> = user
            .notification_channels()
            .into_iter()
            .zip(1..)
            .map(|(channel, id)| {
                NewNotification {
                    order_id: OrderId::new(3),
                    unique_key: idempotency_key(Some("order:3:created"), channel),
                    channel,
                    payload: json!({"event": "order.created", "order_id": 3}),
                }
                .into_notification(NotificationId::new(id), Utc::now())
            })
            .collect();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].channel, Channel::Email);
        assert_eq!(rows[1].unique_key.as_deref(), Some("order:3:created:SMS"));
    }
}
