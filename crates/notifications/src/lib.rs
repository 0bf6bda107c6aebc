//! Notification delivery for order events.
//!
//! Jobs are queued on a [`TaskQueue`], claimed by a [`WorkerPool`], and run
//! through the [`NotificationDispatcher`], which keeps one notification row per
//! `(unique key, channel)` so redelivery and retries never send twice.

pub mod channels;
pub mod dispatcher;
pub mod error;
pub mod queue;
pub mod worker;

pub use channels::{
    ChannelAdapter, ChannelConfig, ChannelRegistry, DeliveryTarget, EmailAdapter, MailTransport,
    Outbox, OutgoingEmail, SmsAdapter, SmsProvider, WebhookAdapter,
};
pub use dispatcher::{DispatchConfig, DispatchOutcome, NotificationDispatcher};
pub use error::{DeliveryError, DispatchError, QueueError};
pub use queue::{
    ClaimedTask, DispatchJob, InMemoryTaskQueue, PostgresTaskQueue, TaskQueue, enqueue_for_customer,
};
pub use worker::{WorkerConfig, WorkerPool, process_next};
