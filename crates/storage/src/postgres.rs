use async_trait::async_trait;
use common::{
    Money, NotificationId, OrderId, OrderItemId, PaymentId, ProductId, TaskId, UserId,
    WebhookEventId,
};
use domain::{
    Channel, NewNotification, NewOrder, NewOrderItem, NewPayment, NewWebhookEvent, Notification,
    Order, OrderItem, Payment, Product, User, WebhookEvent,
};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StorageError,
    store::{Store, Transaction},
};

const ORDER_COLUMNS: &str = "id, user_id, status, total_amount, address, created_at, updated_at";
const ORDER_ITEM_COLUMNS: &str = "id, order_id, product_id, product_name, price, quantity";
const PAYMENT_COLUMNS: &str = "id, order_id, amount, status, provider_reference, vendor_order_handle, pay_string, qr_payload, reference_number, created_at, updated_at";
const NOTIFICATION_COLUMNS: &str = "id, order_id, unique_key, channel, status, payload, error_message, attempts, task_id, external_id, created_at, sent_at";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    #[tracing::instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> Result<Self::Tx> {
        Ok(PostgresTransaction {
            tx: self.pool.begin().await?,
        })
    }
}

/// A unit of work backed by a database transaction.
///
/// Row locks are `SELECT ... FOR UPDATE`; dropping the value rolls back.
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

/// Maps unique violations onto [`StorageError::UniqueViolation`] with the
/// constraint (or unique index) name.
fn map_write_error(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.is_unique_violation()
    {
        return StorageError::UniqueViolation {
            constraint: db_err.constraint().unwrap_or_default().to_string(),
        };
    }
    StorageError::Database(err)
}

fn to_u32(column: &'static str, value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| StorageError::InvalidColumn {
        column,
        value: value.to_string(),
    })
}

fn parse_column<T: std::str::FromStr>(column: &'static str, value: String) -> Result<T> {
    value
        .parse()
        .map_err(|_| StorageError::InvalidColumn { column, value })
}

fn money(row: &PgRow, column: &'static str) -> Result<Money> {
    Ok(Money::new(row.try_get::<Decimal, _>(column)?))
}

fn row_to_user(row: PgRow) -> Result<User> {
    Ok(User {
        id: UserId::new(row.try_get("id")?),
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        phone_number: row.try_get("phone_number")?,
        notify_email: row.try_get("notify_email")?,
        notify_sms: row.try_get("notify_sms")?,
        is_admin: row.try_get("is_admin")?,
    })
}

fn row_to_product(row: PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        price: money(&row, "price")?,
        inventory: to_u32("inventory", row.try_get("inventory")?)?,
    })
}

fn row_to_order(row: PgRow) -> Result<Order> {
    Ok(Order {
        id: OrderId::new(row.try_get("id")?),
        user_id: UserId::new(row.try_get("user_id")?),
        status: parse_column("status", row.try_get("status")?)?,
        total_amount: money(&row, "total_amount")?,
        address: row.try_get("address")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_order_item(row: PgRow) -> Result<OrderItem> {
    Ok(OrderItem {
        id: OrderItemId::new(row.try_get("id")?),
        order_id: OrderId::new(row.try_get("order_id")?),
        product_id: ProductId::new(row.try_get("product_id")?),
        product_name: row.try_get("product_name")?,
        price: money(&row, "price")?,
        quantity: to_u32("quantity", row.try_get("quantity")?)?,
    })
}

fn row_to_payment(row: PgRow) -> Result<Payment> {
    Ok(Payment {
        id: PaymentId::new(row.try_get("id")?),
        order_id: OrderId::new(row.try_get("order_id")?),
        amount: money(&row, "amount")?,
        status: parse_column("status", row.try_get("status")?)?,
        provider_reference: row.try_get("provider_reference")?,
        vendor_order_handle: row.try_get("vendor_order_handle")?,
        pay_string: row.try_get("pay_string")?,
        qr_payload: row.try_get("qr_payload")?,
        reference_number: row.try_get("reference_number")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_webhook_event(row: PgRow) -> Result<WebhookEvent> {
    Ok(WebhookEvent {
        id: WebhookEventId::new(row.try_get("id")?),
        webhook_id: row.try_get("webhook_id")?,
        payload: row.try_get("payload")?,
        received_at: row.try_get("received_at")?,
    })
}

fn row_to_notification(row: PgRow) -> Result<Notification> {
    let attempts: i32 = row.try_get("attempts")?;
    Ok(Notification {
        id: NotificationId::new(row.try_get("id")?),
        order_id: OrderId::new(row.try_get("order_id")?),
        unique_key: row.try_get("unique_key")?,
        channel: parse_column("channel", row.try_get("channel")?)?,
        status: parse_column("status", row.try_get("status")?)?,
        payload: row.try_get("payload")?,
        error_message: row.try_get("error_message")?,
        attempts: to_u32("attempts", i64::from(attempts))?,
        task_id: row
            .try_get::<Option<Uuid>, _>("task_id")?
            .map(TaskId::from_uuid),
        external_id: row.try_get("external_id")?,
        created_at: row.try_get("created_at")?,
        sent_at: row.try_get("sent_at")?,
    })
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn find_user(&mut self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, username, email, phone_number, notify_email, notify_sms, is_admin
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_user).transpose()
    }

    async fn upsert_user(&mut self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, phone_number, notify_email, notify_sms, is_admin)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                username = EXCLUDED.username,
                email = EXCLUDED.email,
                phone_number = EXCLUDED.phone_number,
                notify_email = EXCLUDED.notify_email,
                notify_sms = EXCLUDED.notify_sms,
                is_admin = EXCLUDED.is_admin
            "#,
        )
        .bind(user.id.get())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.phone_number)
        .bind(user.notify_email)
        .bind(user.notify_sms)
        .bind(user.is_admin)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn lock_products(&mut self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let mut ids: Vec<i64> = ids.iter().map(ProductId::get).collect();
        ids.sort_unstable();
        ids.dedup();

        let rows = sqlx::query(
            r#"
            SELECT id, name, price, inventory
            FROM products
            WHERE id = ANY($1)
            ORDER BY id ASC
            FOR UPDATE
            "#,
        )
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_product).collect()
    }

    async fn set_inventory(&mut self, id: ProductId, inventory: u32) -> Result<()> {
        let result = sqlx::query("UPDATE products SET inventory = $2 WHERE id = $1")
            .bind(id.get())
            .bind(i64::from(inventory))
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::RowNotFound {
                table: "products",
                id: id.get(),
            });
        }
        Ok(())
    }

    async fn upsert_product(&mut self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, price, inventory)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                price = EXCLUDED.price,
                inventory = EXCLUDED.inventory
            "#,
        )
        .bind(product.id.get())
        .bind(&product.name)
        .bind(product.price.amount())
        .bind(i64::from(product.inventory))
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn list_products(&mut self) -> Result<Vec<Product>> {
        let rows = sqlx::query("SELECT id, name, price, inventory FROM products ORDER BY id ASC")
            .fetch_all(&mut *self.tx)
            .await?;

        rows.into_iter().map(row_to_product).collect()
    }

    async fn insert_order(&mut self, order: NewOrder) -> Result<Order> {
        let row = sqlx::query(&format!(
            "INSERT INTO orders (user_id, address) VALUES ($1, $2) RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order.user_id.get())
        .bind(&order.address)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_write_error)?;

        row_to_order(row)
    }

    async fn insert_order_item(&mut self, item: NewOrderItem) -> Result<OrderItem> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO order_items (order_id, product_id, product_name, price, quantity)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {ORDER_ITEM_COLUMNS}
            "#
        ))
        .bind(item.order_id.get())
        .bind(item.product_id.get())
        .bind(&item.product_name)
        .bind(item.price.amount())
        .bind(i64::from(item.quantity))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_write_error)?;

        row_to_order_item(row)
    }

    async fn find_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(row_to_order).transpose()
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.get())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_order).transpose()
    }

    async fn update_order(&mut self, order: &Order) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, total_amount = $3, address = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(order.id.get())
        .bind(order.status.as_str())
        .bind(order.total_amount.amount())
        .bind(&order.address)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::RowNotFound {
                table: "orders",
                id: order.id.get(),
            });
        }
        Ok(())
    }

    async fn payment_for_order(&mut self, order_id: OrderId) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1"
        ))
        .bind(order_id.get())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_payment).transpose()
    }

    async fn insert_payment(&mut self, payment: NewPayment) -> Result<Payment> {
        let row = sqlx::query(&format!(
            "INSERT INTO payments (order_id, amount) VALUES ($1, $2) RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(payment.order_id.get())
        .bind(payment.amount.amount())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_write_error)?;

        row_to_payment(row)
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $2,
                provider_reference = $3,
                vendor_order_handle = $4,
                pay_string = $5,
                qr_payload = $6,
                reference_number = $7,
                updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(payment.id.get())
        .bind(payment.status.as_str())
        .bind(&payment.provider_reference)
        .bind(&payment.vendor_order_handle)
        .bind(&payment.pay_string)
        .bind(&payment.qr_payload)
        .bind(&payment.reference_number)
        .bind(payment.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::RowNotFound {
                table: "payments",
                id: payment.id.get(),
            });
        }
        Ok(())
    }

    async fn find_payment_by_reference(
        &mut self,
        reference_number: &str,
    ) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE reference_number = $1 ORDER BY id LIMIT 1"
        ))
        .bind(reference_number)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_payment).transpose()
    }

    async fn find_payment_by_vendor_handle(&mut self, handle: &str) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE vendor_order_handle = $1 ORDER BY id LIMIT 1"
        ))
        .bind(handle)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_payment).transpose()
    }

    async fn webhook_event_exists(&mut self, webhook_id: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM webhook_events WHERE webhook_id = $1)")
                .bind(webhook_id)
                .fetch_one(&mut *self.tx)
                .await?;

        Ok(exists)
    }

    async fn insert_webhook_event(&mut self, event: NewWebhookEvent) -> Result<WebhookEvent> {
        let row = sqlx::query(
            r#"
            INSERT INTO webhook_events (webhook_id, payload)
            VALUES ($1, $2)
            RETURNING id, webhook_id, payload, received_at
            "#,
        )
        .bind(&event.webhook_id)
        .bind(&event.payload)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_write_error)?;

        row_to_webhook_event(row)
    }

    async fn find_notification(
        &mut self,
        unique_key: &str,
        channel: Channel,
    ) -> Result<Option<Notification>> {
        let row = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE unique_key = $1 AND channel = $2"
        ))
        .bind(unique_key)
        .bind(channel.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_notification).transpose()
    }

    async fn lock_notification(&mut self, id: NotificationId) -> Result<Option<Notification>> {
        let row = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.get())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_notification).transpose()
    }

    async fn insert_notification(
        &mut self,
        notification: NewNotification,
    ) -> Result<Notification> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO notifications (order_id, unique_key, channel, payload)
            VALUES ($1, $2, $3, $4)
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(notification.order_id.get())
        .bind(&notification.unique_key)
        .bind(notification.channel.as_str())
        .bind(&notification.payload)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_write_error)?;

        row_to_notification(row)
    }

    async fn update_notification(&mut self, notification: &Notification) -> Result<()> {
        let attempts = i32::try_from(notification.attempts).unwrap_or(i32::MAX);
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = $2,
                error_message = $3,
                attempts = $4,
                task_id = $5,
                external_id = $6,
                sent_at = $7
            WHERE id = $1
            "#,
        )
        .bind(notification.id.get())
        .bind(notification.status.as_str())
        .bind(&notification.error_message)
        .bind(attempts)
        .bind(notification.task_id.map(|id| id.as_uuid()))
        .bind(&notification.external_id)
        .bind(notification.sent_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::RowNotFound {
                table: "notifications",
                id: notification.id.get(),
            });
        }
        Ok(())
    }

    async fn notifications_for_order(&mut self, order_id: OrderId) -> Result<Vec<Notification>> {
        let rows = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE order_id = $1 ORDER BY id ASC"
        ))
        .bind(order_id.get())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_notification).collect()
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
