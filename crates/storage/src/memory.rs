use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::{
    NotificationId, OrderId, OrderItemId, PaymentId, ProductId, UserId, WebhookEventId,
};
use domain::{
    Channel, NewNotification, NewOrder, NewOrderItem, NewPayment, NewWebhookEvent, Notification,
    Order, OrderItem, Payment, Product, User, WebhookEvent,
};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    Result, StorageError, constraints,
    store::{Store, Transaction},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowKey {
    Product(ProductId),
    Order(OrderId),
    Notification(NotificationId),
}

#[derive(Debug, Clone, Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    products: BTreeMap<ProductId, Product>,
    orders: BTreeMap<OrderId, Order>,
    order_items: BTreeMap<OrderItemId, OrderItem>,
    payments: BTreeMap<PaymentId, Payment>,
    webhook_events: BTreeMap<WebhookEventId, WebhookEvent>,
    notifications: BTreeMap<NotificationId, Notification>,
}

impl Tables {
    fn apply(&mut self, staged: Tables) {
        self.users.extend(staged.users);
        self.products.extend(staged.products);
        self.orders.extend(staged.orders);
        self.order_items.extend(staged.order_items);
        self.payments.extend(staged.payments);
        self.webhook_events.extend(staged.webhook_events);
        self.notifications.extend(staged.notifications);
    }
}

#[derive(Default)]
struct Shared {
    tables: RwLock<Tables>,
    locks: Mutex<HashMap<RowKey, Arc<Mutex<()>>>>,
    sequence: AtomicI64,
}

/// In-memory store implementation for tests and database-less runs.
///
/// Row locks are per-row async mutexes owned by the transaction that took
/// them. Writes are staged per transaction and merged under a single write
/// lock on commit, where uniqueness is checked again against rows committed
/// in the meantime.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a user directly, outside any transaction.
    pub async fn insert_user(&self, user: User) {
        self.shared.tables.write().await.users.insert(user.id, user);
    }

    /// Writes a product directly, outside any transaction.
    pub async fn insert_product(&self, product: Product) {
        self.shared
            .tables
            .write()
            .await
            .products
            .insert(product.id, product);
    }

    /// Returns the committed state of a product.
    pub async fn product(&self, id: ProductId) -> Option<Product> {
        self.shared.tables.read().await.products.get(&id).cloned()
    }

    /// Returns the committed state of an order.
    pub async fn order(&self, id: OrderId) -> Option<Order> {
        self.shared.tables.read().await.orders.get(&id).cloned()
    }

    /// Returns the number of committed orders.
    pub async fn order_count(&self) -> usize {
        self.shared.tables.read().await.orders.len()
    }

    /// Returns the number of committed order items.
    pub async fn order_item_count(&self) -> usize {
        self.shared.tables.read().await.order_items.len()
    }

    /// Returns the committed payment of an order.
    pub async fn payment(&self, order_id: OrderId) -> Option<Payment> {
        self.shared
            .tables
            .read()
            .await
            .payments
            .values()
            .find(|p| p.order_id == order_id)
            .cloned()
    }

    /// Returns the number of committed payments.
    pub async fn payment_count(&self) -> usize {
        self.shared.tables.read().await.payments.len()
    }

    /// Returns every committed webhook event.
    pub async fn webhook_events(&self) -> Vec<WebhookEvent> {
        self.shared
            .tables
            .read()
            .await
            .webhook_events
            .values()
            .cloned()
            .collect()
    }

    /// Returns every committed notification, ordered by id.
    pub async fn notifications(&self) -> Vec<Notification> {
        self.shared
            .tables
            .read()
            .await
            .notifications
            .values()
            .cloned()
            .collect()
    }

    fn next_id(&self) -> i64 {
        self.shared.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<Self::Tx> {
        Ok(InMemoryTransaction {
            store: self.clone(),
            staged: Tables::default(),
            held: HashMap::new(),
        })
    }
}

/// A unit of work against an [`InMemoryStore`].
pub struct InMemoryTransaction {
    store: InMemoryStore,
    staged: Tables,
    held: HashMap<RowKey, OwnedMutexGuard<()>>,
}

impl InMemoryTransaction {
    async fn acquire(&mut self, key: RowKey) {
        if self.held.contains_key(&key) {
            return;
        }
        let row_lock = {
            let mut locks = self.store.shared.locks.lock().await;
            locks.entry(key).or_default().clone()
        };
        let guard = row_lock.lock_owned().await;
        self.held.insert(key, guard);
    }

    async fn committed(&self) -> tokio::sync::RwLockReadGuard<'_, Tables> {
        self.store.shared.tables.read().await
    }
}

/// Committed rows overlaid with this transaction's staged rows.
fn merged<K: Ord + Copy, V: Clone>(committed: &BTreeMap<K, V>, staged: &BTreeMap<K, V>) -> Vec<V> {
    let mut rows = committed.clone();
    rows.extend(staged.iter().map(|(k, v)| (*k, v.clone())));
    rows.into_values().collect()
}

fn lookup<K: Ord, V: Clone>(committed: &BTreeMap<K, V>, staged: &BTreeMap<K, V>, id: &K) -> Option<V> {
    staged.get(id).or_else(|| committed.get(id)).cloned()
}

fn unique_violation(constraint: &str) -> StorageError {
    StorageError::UniqueViolation {
        constraint: constraint.to_string(),
    }
}

/// Rejects staged inserts that collide with rows committed by other
/// transactions after they were staged.
fn check_conflicts(committed: &Tables, staged: &Tables) -> Result<()> {
    for item in staged.order_items.values() {
        if committed.order_items.values().any(|other| {
            other.id != item.id
                && other.order_id == item.order_id
                && other.product_id == item.product_id
        }) {
            return Err(unique_violation(constraints::UNIQUE_ORDER_PRODUCT));
        }
    }
    for payment in staged.payments.values() {
        if committed
            .payments
            .values()
            .any(|other| other.id != payment.id && other.order_id == payment.order_id)
        {
            return Err(unique_violation(constraints::UNIQUE_PAYMENT_PER_ORDER));
        }
    }
    for event in staged.webhook_events.values() {
        if committed
            .webhook_events
            .values()
            .any(|other| other.id != event.id && other.webhook_id == event.webhook_id)
        {
            return Err(unique_violation(constraints::UNIQUE_WEBHOOK_ID));
        }
    }
    for notification in staged.notifications.values() {
        let Some(key) = notification.unique_key.as_deref() else {
            continue;
        };
        if committed.notifications.values().any(|other| {
            other.id != notification.id
                && other.channel == notification.channel
                && other.unique_key.as_deref() == Some(key)
        }) {
            return Err(unique_violation(
                constraints::UNIQUE_NOTIFICATION_PER_CHANNEL,
            ));
        }
    }
    Ok(())
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn find_user(&mut self, id: UserId) -> Result<Option<User>> {
        let committed = self.committed().await;
        Ok(lookup(&committed.users, &self.staged.users, &id))
    }

    async fn upsert_user(&mut self, user: &User) -> Result<()> {
        self.staged.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();

        for id in &ids {
            self.acquire(RowKey::Product(*id)).await;
        }

        let committed = self.committed().await;
        Ok(ids
            .iter()
            .filter_map(|id| lookup(&committed.products, &self.staged.products, id))
            .collect())
    }

    async fn set_inventory(&mut self, id: ProductId, inventory: u32) -> Result<()> {
        let current = {
            let committed = self.committed().await;
            lookup(&committed.products, &self.staged.products, &id)
        };
        let mut product = current.ok_or(StorageError::RowNotFound {
            table: "products",
            id: id.get(),
        })?;
        product.inventory = inventory;
        self.staged.products.insert(id, product);
        Ok(())
    }

    async fn upsert_product(&mut self, product: &Product) -> Result<()> {
        self.staged.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn list_products(&mut self) -> Result<Vec<Product>> {
        let committed = self.committed().await;
        Ok(merged(&committed.products, &self.staged.products))
    }

    async fn insert_order(&mut self, order: NewOrder) -> Result<Order> {
        let order = order.into_order(OrderId::new(self.store.next_id()), Utc::now());
        self.staged.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn insert_order_item(&mut self, item: NewOrderItem) -> Result<OrderItem> {
        let duplicate = {
            let committed = self.committed().await;
            merged(&committed.order_items, &self.staged.order_items)
                .iter()
                .any(|other| other.order_id == item.order_id && other.product_id == item.product_id)
        };
        if duplicate {
            return Err(unique_violation(constraints::UNIQUE_ORDER_PRODUCT));
        }

        let item = item.into_item(OrderItemId::new(self.store.next_id()));
        self.staged.order_items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn find_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        let committed = self.committed().await;
        Ok(lookup(&committed.orders, &self.staged.orders, &id))
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        self.acquire(RowKey::Order(id)).await;
        self.find_order(id).await
    }

    async fn update_order(&mut self, order: &Order) -> Result<()> {
        if self.find_order(order.id).await?.is_none() {
            return Err(StorageError::RowNotFound {
                table: "orders",
                id: order.id.get(),
            });
        }
        self.staged.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn payment_for_order(&mut self, order_id: OrderId) -> Result<Option<Payment>> {
        let committed = self.committed().await;
        Ok(merged(&committed.payments, &self.staged.payments)
            .into_iter()
            .find(|payment| payment.order_id == order_id))
    }

    async fn insert_payment(&mut self, payment: NewPayment) -> Result<Payment> {
        if self.payment_for_order(payment.order_id).await?.is_some() {
            return Err(unique_violation(constraints::UNIQUE_PAYMENT_PER_ORDER));
        }
        let payment = payment.into_payment(PaymentId::new(self.store.next_id()), Utc::now());
        self.staged.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<()> {
        let exists = {
            let committed = self.committed().await;
            lookup(&committed.payments, &self.staged.payments, &payment.id).is_some()
        };
        if !exists {
            return Err(StorageError::RowNotFound {
                table: "payments",
                id: payment.id.get(),
            });
        }
        self.staged.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn find_payment_by_reference(
        &mut self,
        reference_number: &str,
    ) -> Result<Option<Payment>> {
        let committed = self.committed().await;
        Ok(merged(&committed.payments, &self.staged.payments)
            .into_iter()
            .find(|payment| payment.reference_number.as_deref() == Some(reference_number)))
    }

    async fn find_payment_by_vendor_handle(&mut self, handle: &str) -> Result<Option<Payment>> {
        let committed = self.committed().await;
        Ok(merged(&committed.payments, &self.staged.payments)
            .into_iter()
            .find(|payment| payment.vendor_order_handle.as_deref() == Some(handle)))
    }

    async fn webhook_event_exists(&mut self, webhook_id: &str) -> Result<bool> {
        let committed = self.committed().await;
        Ok(merged(&committed.webhook_events, &self.staged.webhook_events)
            .iter()
            .any(|event| event.webhook_id == webhook_id))
    }

    async fn insert_webhook_event(&mut self, event: NewWebhookEvent) -> Result<WebhookEvent> {
        if self.webhook_event_exists(&event.webhook_id).await? {
            return Err(unique_violation(constraints::UNIQUE_WEBHOOK_ID));
        }
        let event = event.into_event(WebhookEventId::new(self.store.next_id()), Utc::now());
        self.staged.webhook_events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn find_notification(
        &mut self,
        unique_key: &str,
        channel: Channel,
    ) -> Result<Option<Notification>> {
        let committed = self.committed().await;
        Ok(merged(&committed.notifications, &self.staged.notifications)
            .into_iter()
            .find(|n| n.channel == channel && n.unique_key.as_deref() == Some(unique_key)))
    }

    async fn insert_notification(
        &mut self,
        notification: NewNotification,
    ) -> Result<Notification> {
        if let Some(key) = notification.unique_key.as_deref()
            && self.find_notification(key, notification.channel).await?.is_some()
        {
            return Err(unique_violation(
                constraints::UNIQUE_NOTIFICATION_PER_CHANNEL,
            ));
        }
        let notification = notification
            .into_notification(NotificationId::new(self.store.next_id()), Utc::now());
        self.staged
            .notifications
            .insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn lock_notification(&mut self, id: NotificationId) -> Result<Option<Notification>> {
        self.acquire(RowKey::Notification(id)).await;
        let committed = self.committed().await;
        Ok(lookup(&committed.notifications, &self.staged.notifications, &id))
    }

    async fn update_notification(&mut self, notification: &Notification) -> Result<()> {
        let exists = {
            let committed = self.committed().await;
            lookup(
                &committed.notifications,
                &self.staged.notifications,
                &notification.id,
            )
            .is_some()
        };
        if !exists {
            return Err(StorageError::RowNotFound {
                table: "notifications",
                id: notification.id.get(),
            });
        }
        self.staged
            .notifications
            .insert(notification.id, notification.clone());
        Ok(())
    }

    async fn notifications_for_order(&mut self, order_id: OrderId) -> Result<Vec<Notification>> {
        let committed = self.committed().await;
        Ok(merged(&committed.notifications, &self.staged.notifications)
            .into_iter()
            .filter(|n| n.order_id == order_id)
            .collect())
    }

    async fn commit(self) -> Result<()> {
        let InMemoryTransaction {
            store,
            staged,
            held,
        } = self;

        let mut tables = store.shared.tables.write().await;
        check_conflicts(&tables, &staged)?;
        tables.apply(staged);
        drop(tables);

        // Row locks are released only once the writes are visible.
        drop(held);
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use common::Money;
    use serde_json::json;

    use super::*;

    fn product(id: i64, inventory: u32) -> Product {
        Product::new(
            ProductId::new(id),
            format!("Product {id}"),
            Money::from_cents(1000),
            inventory,
        )
    }

    #[tokio::test]
    async fn writes_are_invisible_until_commit() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let order = tx
            .insert_order(NewOrder {
                user_id: UserId::new(1),
                address: "1 Main St".to_string(),
            })
            .await
            .unwrap();

        assert!(tx.find_order(order.id).await.unwrap().is_some());
        assert_eq!(store.order_count().await, 0);

        tx.commit().await.unwrap();
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let store = InMemoryStore::new();
        store.insert_product(product(1, 10)).await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.lock_products(&[ProductId::new(1)]).await.unwrap();
            tx.set_inventory(ProductId::new(1), 3).await.unwrap();
        }

        assert_eq!(store.product(ProductId::new(1)).await.unwrap().inventory, 10);
    }

    #[tokio::test]
    async fn lock_products_returns_existing_rows_in_id_order() {
        let store = InMemoryStore::new();
        store.insert_product(product(3, 1)).await;
        store.insert_product(product(1, 1)).await;

        let mut tx = store.begin().await.unwrap();
        let rows = tx
            .lock_products(&[ProductId::new(3), ProductId::new(2), ProductId::new(1), ProductId::new(3)])
            .await
            .unwrap();

        let ids: Vec<_> = rows.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![ProductId::new(1), ProductId::new(3)]);
    }

    #[tokio::test]
    async fn row_lock_blocks_until_holder_commits() {
        let store = InMemoryStore::new();
        store.insert_product(product(1, 10)).await;

        let mut first = store.begin().await.unwrap();
        first.lock_products(&[ProductId::new(1)]).await.unwrap();
        first.set_inventory(ProductId::new(1), 4).await.unwrap();

        let contender = {
            let store = store.clone();
            tokio::spawn(async move {
                let mut tx = store.begin().await.unwrap();
                let rows = tx.lock_products(&[ProductId::new(1)]).await.unwrap();
                rows[0].inventory
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        first.commit().await.unwrap();
        assert_eq!(contender.await.unwrap(), 4);
    }

    #[tokio::test]
    async fn notification_lock_hands_over_the_committed_row() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let inserted = tx
            .insert_notification(NewNotification {
                order_id: OrderId::new(1),
                unique_key: Some("order:1:created:EMAIL".to_string()),
                channel: Channel::Email,
                payload: json!({"event": "order.created"}),
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut first = store.begin().await.unwrap();
        let mut row = first.lock_notification(inserted.id).await.unwrap().unwrap();

        let contender = {
            let store = store.clone();
            tokio::spawn(async move {
                let mut tx = store.begin().await.unwrap();
                tx.lock_notification(inserted.id).await.unwrap().unwrap()
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        row.mark_sent("email:1".to_string());
        first.update_notification(&row).await.unwrap();
        first.commit().await.unwrap();

        let seen = contender.await.unwrap();
        assert!(seen.is_sent());
        assert_eq!(seen.external_id.as_deref(), Some("email:1"));
    }

    #[tokio::test]
    async fn lock_is_reentrant_within_a_transaction() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let order = tx
            .insert_order(NewOrder {
                user_id: UserId::new(1),
                address: "1 Main St".to_string(),
            })
            .await
            .unwrap();

        tx.lock_order(order.id).await.unwrap();
        assert!(tx.lock_order(order.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn duplicate_webhook_id_rejected_at_insert_and_commit() {
        let store = InMemoryStore::new();
        let event = || NewWebhookEvent {
            webhook_id: "wh_1".to_string(),
            payload: json!({"referenceNumber": "R1"}),
        };

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        first.insert_webhook_event(event()).await.unwrap();
        second.insert_webhook_event(event()).await.unwrap();

        let err = first.insert_webhook_event(event()).await.unwrap_err();
        assert!(err.is_unique_violation(constraints::UNIQUE_WEBHOOK_ID));

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(err.is_unique_violation(constraints::UNIQUE_WEBHOOK_ID));
        assert_eq!(store.webhook_events().await.len(), 1);
    }

    #[tokio::test]
    async fn notification_uniqueness_ignores_null_keys() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let row = |key: Option<&str>| NewNotification {
            order_id: OrderId::new(1),
            unique_key: key.map(str::to_string),
            channel: Channel::Email,
            payload: json!({}),
        };

        tx.insert_notification(row(None)).await.unwrap();
        tx.insert_notification(row(None)).await.unwrap();
        tx.insert_notification(row(Some("k:EMAIL"))).await.unwrap();
        let err = tx.insert_notification(row(Some("k:EMAIL"))).await.unwrap_err();
        assert!(err.is_unique_violation(constraints::UNIQUE_NOTIFICATION_PER_CHANNEL));

        tx.commit().await.unwrap();
        assert_eq!(store.notifications().await.len(), 3);
    }

    #[tokio::test]
    async fn second_payment_for_order_is_rejected() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let new_payment = || NewPayment {
            order_id: OrderId::new(1),
            amount: Money::from_cents(100),
        };
        tx.insert_payment(new_payment()).await.unwrap();
        let err = tx.insert_payment(new_payment()).await.unwrap_err();
        assert!(err.is_unique_violation(constraints::UNIQUE_PAYMENT_PER_ORDER));
    }

    #[tokio::test]
    async fn update_of_missing_row_fails() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let err = tx.set_inventory(ProductId::new(99), 1).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::RowNotFound {
                table: "products",
                id: 99
            }
        ));
    }
}
