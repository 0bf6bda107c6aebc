//! Order creation against the in-memory store.

use std::sync::Arc;

use common::{Money, ProductId, UserId};
use domain::{Channel, OrderLine, OrderStatus, Product, User, ValidationError};
use notifications::InMemoryTaskQueue;
use orders::{CreateOrderRequest, OrderCreationService, OrderError};
use storage::InMemoryStore;
use tokio::task::JoinSet;

struct Harness {
    store: InMemoryStore,
    queue: Arc<InMemoryTaskQueue>,
    service: Arc<OrderCreationService<InMemoryStore>>,
}

async fn harness() -> Harness {
    let store = InMemoryStore::new();
    store
        .insert_user(
            User::new(UserId::new(1), "alice")
                .with_email("alice@example.com")
                .with_phone("+15551234567")
                .with_preferences(true, true),
        )
        .await;
    store.insert_user(User::new(UserId::new(2), "bob")).await;
    store
        .insert_product(Product::new(ProductId::new(1), "Keyboard", Money::from_cents(9999), 10))
        .await;
    store
        .insert_product(Product::new(ProductId::new(2), "Mouse", Money::from_cents(4999), 5))
        .await;

    let queue = Arc::new(InMemoryTaskQueue::new());
    let service = Arc::new(OrderCreationService::new(store.clone(), queue.clone()));
    Harness {
        store,
        queue,
        service,
    }
}

fn keyboard(quantity: u32) -> OrderLine {
    OrderLine::new(ProductId::new(1), quantity, "Keyboard", Money::from_cents(9999))
}

fn mouse(quantity: u32) -> OrderLine {
    OrderLine::new(ProductId::new(2), quantity, "Mouse", Money::from_cents(4999))
}

fn request(user: i64, items: Vec<OrderLine>) -> CreateOrderRequest {
    CreateOrderRequest {
        user_id: UserId::new(user),
        items,
        address: "1 Main St".to_string(),
    }
}

#[tokio::test]
async fn total_is_sum_of_lines_and_stock_is_decremented() {
    let h = harness().await;

    let placed = h
        .service
        .create_order(request(1, vec![keyboard(2), mouse(1)]))
        .await
        .unwrap();

    assert_eq!(placed.order.total_amount, "249.97".parse::<Money>().unwrap());
    assert_eq!(placed.order.status, OrderStatus::Pending);
    assert_eq!(placed.items.len(), 2);
    assert_eq!(h.store.product(ProductId::new(1)).await.unwrap().inventory, 8);
    assert_eq!(h.store.product(ProductId::new(2)).await.unwrap().inventory, 4);

    let stored = h.store.order(placed.order.id).await.unwrap();
    assert_eq!(stored.total_amount, placed.order.total_amount);
}

#[tokio::test]
async fn items_keep_the_submitted_snapshot() {
    let h = harness().await;
    let discounted = OrderLine::new(ProductId::new(1), 1, "Keyboard (sale)", Money::from_cents(5000));

    let placed = h.service.create_order(request(1, vec![discounted])).await.unwrap();

    assert_eq!(placed.items[0].product_name, "Keyboard (sale)");
    assert_eq!(placed.items[0].price, Money::from_cents(5000));
    assert_eq!(placed.order.total_amount, Money::from_cents(5000));
}

#[tokio::test]
async fn shortfall_leaves_no_partial_state() {
    let h = harness().await;

    let err = h
        .service
        .create_order(request(1, vec![keyboard(2), mouse(6)]))
        .await
        .unwrap_err();

    let Some(ValidationError::InsufficientInventory { insufficient_inventory }) = err.as_validation()
    else {
        panic!("expected insufficient inventory");
    };
    assert_eq!(insufficient_inventory[0].product_id, ProductId::new(2));
    assert_eq!(h.store.order_count().await, 0);
    assert_eq!(h.store.order_item_count().await, 0);
    assert_eq!(h.store.product(ProductId::new(1)).await.unwrap().inventory, 10);
    assert_eq!(h.queue.pending_count().await, 0);
}

#[tokio::test]
async fn unknown_user_is_rejected() {
    let h = harness().await;

    let err = h
        .service
        .create_order(request(99, vec![keyboard(1)]))
        .await
        .unwrap_err();

    assert_eq!(
        err.as_validation(),
        Some(&ValidationError::UnknownUser {
            user_id: UserId::new(99)
        })
    );
    assert_eq!(h.store.product(ProductId::new(1)).await.unwrap().inventory, 10);
}

#[tokio::test]
async fn created_job_targets_opted_in_channels() {
    let h = harness().await;

    let placed = h.service.create_order(request(1, vec![keyboard(1)])).await.unwrap();

    let jobs = h.queue.pending_jobs().await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].order_id, placed.order.id);
    assert_eq!(jobs[0].event, "order.created");
    assert_eq!(
        jobs[0].unique_key.as_deref(),
        Some(format!("order:{}:created", placed.order.id).as_str())
    );
    assert_eq!(
        jobs[0].channels,
        vec![Channel::Email.as_str().to_string(), Channel::Sms.as_str().to_string()]
    );
}

#[tokio::test]
async fn customer_without_channels_gets_no_job() {
    let h = harness().await;

    h.service.create_order(request(2, vec![keyboard(1)])).await.unwrap();

    assert_eq!(h.queue.pending_count().await, 0);
}

#[tokio::test]
async fn enqueue_failure_does_not_fail_the_order() {
    let h = harness().await;
    h.queue.set_fail_on_enqueue(true).await;

    let placed = h.service.create_order(request(1, vec![keyboard(1)])).await.unwrap();

    assert!(h.store.order(placed.order.id).await.is_some());
    assert_eq!(h.queue.pending_count().await, 0);
}

#[tokio::test]
async fn concurrent_orders_never_oversell() {
    let h = harness().await;
    let mut set = JoinSet::new();

    // Ten orders of 3 mice against a stock of 5: exactly one fits.
    for _ in 0..10 {
        let service = h.service.clone();
        set.spawn(async move { service.create_order(request(1, vec![mouse(3)])).await });
    }

    let mut succeeded = 0;
    let mut rejected = 0;
    while let Some(result) = set.join_next().await {
        match result.unwrap() {
            Ok(_) => succeeded += 1,
            Err(OrderError::Domain(_)) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(rejected, 9);
    assert_eq!(h.store.product(ProductId::new(2)).await.unwrap().inventory, 2);
    assert_eq!(h.store.order_count().await, 1);
}

#[tokio::test]
async fn overlapping_orders_lock_in_a_consistent_order() {
    let h = harness().await;
    let mut set = JoinSet::new();

    // Opposite line order on purpose; ascending lock order keeps this deadlock free.
    for i in 0..20 {
        let service = h.service.clone();
        let items = if i % 2 == 0 {
            vec![keyboard(1), mouse(1)]
        } else {
            vec![mouse(1), keyboard(1)]
        };
        set.spawn(async move { service.create_order(request(1, items)).await });
    }

    let mut succeeded = 0;
    while let Some(result) = set.join_next().await {
        if result.unwrap().is_ok() {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 5);
    assert_eq!(h.store.product(ProductId::new(2)).await.unwrap().inventory, 0);
    assert_eq!(h.store.product(ProductId::new(1)).await.unwrap().inventory, 5);
}
