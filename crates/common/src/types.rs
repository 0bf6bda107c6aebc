use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a database-backed integer identifier.
///
/// Each identifier wraps an `i64` so that ids of different entities cannot be
/// mixed up, while still ordering naturally (product locks are taken in
/// ascending id order).
macro_rules! integer_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Creates an identifier from its raw value.
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Returns the raw value.
            pub const fn get(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

integer_id!(
    /// Identifier of an authenticated user, as issued by the identity provider.
    UserId
);
integer_id!(
    /// Catalog identifier of a product.
    ProductId
);
integer_id!(
    /// Identifier of an order.
    OrderId
);
integer_id!(
    /// Identifier of a single line of an order.
    OrderItemId
);
integer_id!(
    /// Identifier of a payment row.
    PaymentId
);
integer_id!(
    /// Identifier of a processed provider callback.
    WebhookEventId
);
integer_id!(
    /// Identifier of a notification row.
    NotificationId
);

/// Identifier of a queued background task.
///
/// Stays stable across retries of the same task, so a notification row can
/// record which task last attempted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Creates a new random task ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a task ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TaskId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}
