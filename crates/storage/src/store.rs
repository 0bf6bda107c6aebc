use async_trait::async_trait;
use common::{NotificationId, OrderId, ProductId, UserId};
use domain::{
    Channel, NewNotification, NewOrder, NewOrderItem, NewPayment, NewWebhookEvent, Notification,
    Order, OrderItem, Payment, Product, User, WebhookEvent,
};

use crate::Result;

/// A transactional store.
///
/// Implementations must be cheap to clone and thread-safe; every clone shares
/// the same underlying data.
#[async_trait]
pub trait Store: Send + Sync + Clone + 'static {
    /// The unit of work this store hands out.
    type Tx: Transaction;

    /// Starts a new transaction.
    async fn begin(&self) -> Result<Self::Tx>;
}

/// One unit of work.
///
/// `lock_*` methods take an exclusive row lock that is held until the
/// transaction commits or is dropped. Any concurrent transaction trying to
/// lock the same row waits. Plain reads never block.
///
/// Writes are visible to this transaction immediately and to everyone else
/// only after [`Transaction::commit`]. Dropping the transaction without
/// committing discards every write.
#[async_trait]
pub trait Transaction: Send {
    // Users

    async fn find_user(&mut self, id: UserId) -> Result<Option<User>>;

    async fn upsert_user(&mut self, user: &User) -> Result<()>;

    // Products

    /// Locks every listed product, in ascending id order, and returns the
    /// ones that exist (also in ascending id order).
    ///
    /// Duplicate ids are locked once. Ids with no row are silently absent
    /// from the result; the caller decides whether that is an error.
    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<Vec<Product>>;

    /// Overwrites a product's stock level.
    async fn set_inventory(&mut self, id: ProductId, inventory: u32) -> Result<()>;

    /// Creates or replaces a catalog product.
    async fn upsert_product(&mut self, product: &Product) -> Result<()>;

    /// Returns every product, ordered by id.
    async fn list_products(&mut self) -> Result<Vec<Product>>;

    // Orders

    /// Inserts a PENDING order with a zero total.
    async fn insert_order(&mut self, order: NewOrder) -> Result<Order>;

    async fn insert_order_item(&mut self, item: NewOrderItem) -> Result<OrderItem>;

    async fn find_order(&mut self, id: OrderId) -> Result<Option<Order>>;

    /// Locks the order row and returns it.
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>>;

    /// Persists status, total, and address of an existing order.
    async fn update_order(&mut self, order: &Order) -> Result<()>;

    // Payments

    async fn payment_for_order(&mut self, order_id: OrderId) -> Result<Option<Payment>>;

    async fn insert_payment(&mut self, payment: NewPayment) -> Result<Payment>;

    async fn update_payment(&mut self, payment: &Payment) -> Result<()>;

    async fn find_payment_by_reference(&mut self, reference_number: &str)
    -> Result<Option<Payment>>;

    async fn find_payment_by_vendor_handle(&mut self, handle: &str) -> Result<Option<Payment>>;

    // Webhook ledger

    async fn webhook_event_exists(&mut self, webhook_id: &str) -> Result<bool>;

    async fn insert_webhook_event(&mut self, event: NewWebhookEvent) -> Result<WebhookEvent>;

    // Notifications

    async fn find_notification(
        &mut self,
        unique_key: &str,
        channel: Channel,
    ) -> Result<Option<Notification>>;

    async fn insert_notification(&mut self, notification: NewNotification)
    -> Result<Notification>;

    /// Locks the notification row and returns it. Held until commit or
    /// rollback, so a second dispatcher waits and then sees the final status.
    async fn lock_notification(&mut self, id: NotificationId) -> Result<Option<Notification>>;

    async fn update_notification(&mut self, notification: &Notification) -> Result<()>;

    /// Returns an order's notifications, ordered by id.
    async fn notifications_for_order(&mut self, order_id: OrderId) -> Result<Vec<Notification>>;

    // Completion

    /// Makes every write visible and releases all locks.
    async fn commit(self) -> Result<()>;

    /// Discards every write and releases all locks.
    async fn rollback(self) -> Result<()>;
}
