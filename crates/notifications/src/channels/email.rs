use std::sync::{Arc, Mutex, PoisonError};

use domain::Order;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::DeliveryTarget;
use crate::error::DeliveryError;

/// Where rendered emails go.
#[derive(Clone)]
pub enum MailTransport {
    /// A real SMTP relay.
    Smtp(Arc<AsyncSmtpTransport<Tokio1Executor>>),
    /// Logs the message and reports success. Used when no SMTP host is set.
    Log,
    /// Collects messages in memory.
    Outbox(Outbox),
}

impl MailTransport {
    /// STARTTLS relay on `host:port`, authenticated when both credentials are given.
    pub fn smtp(
        host: &str,
        port: u16,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Self, DeliveryError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| DeliveryError::Configuration(format!("SMTP relay error: {e}")))?
            .port(port);
        if let (Some(username), Some(password)) = (username, password) {
            builder = builder.credentials(Credentials::new(username, password));
        }
        Ok(MailTransport::Smtp(Arc::new(builder.build())))
    }
}

impl std::fmt::Debug for MailTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MailTransport::Smtp(_) => f.write_str("Smtp"),
            MailTransport::Log => f.write_str("Log"),
            MailTransport::Outbox(outbox) => f.debug_tuple("Outbox").field(outbox).finish(),
        }
    }
}

/// A rendered email as captured by an [`Outbox`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[derive(Debug, Default)]
struct OutboxState {
    sent: Vec<OutgoingEmail>,
    fail_on_send: bool,
}

/// In-memory mail sink for tests.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    state: Arc<Mutex<OutboxState>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent send fail until cleared.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.lock().fail_on_send = fail;
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.lock().sent.clone()
    }

    fn deliver(&self, email: OutgoingEmail) -> Result<(), DeliveryError> {
        let mut state = self.lock();
        if state.fail_on_send {
            return Err(DeliveryError::Unavailable("outbox rejected the message".to_string()));
        }
        state.sent.push(email);
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, OutboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Sends order emails to the customer's address.
#[derive(Debug, Clone)]
pub struct EmailAdapter {
    from: Mailbox,
    transport: MailTransport,
}

impl EmailAdapter {
    pub fn new(from: &str, transport: MailTransport) -> Result<Self, DeliveryError> {
        let from = from.parse().map_err(|e: lettre::address::AddressError| {
            DeliveryError::InvalidAddress {
                address: from.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self { from, transport })
    }

    pub fn transport(&self) -> &MailTransport {
        &self.transport
    }

    #[tracing::instrument(skip(self, target), fields(order_id = %target.order.id))]
    pub(super) async fn send(
        &self,
        target: DeliveryTarget<'_>,
        event: &str,
    ) -> Result<String, DeliveryError> {
        let order = target.order;
        let recipient = target
            .customer
            .and_then(|user| user.email.as_deref())
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .ok_or(DeliveryError::MissingEmail { order_id: order.id })?;
        let name = target.customer.map_or("customer", |user| user.username.as_str());

        let subject = subject_for(event, order);
        let (text, html) = render_body(name, event, order);

        match &self.transport {
            MailTransport::Smtp(transport) => {
                let to: Mailbox = recipient.parse().map_err(|e: lettre::address::AddressError| {
                    DeliveryError::InvalidAddress {
                        address: recipient.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                let message = Message::builder()
                    .from(self.from.clone())
                    .to(to)
                    .subject(subject)
                    .multipart(MultiPart::alternative_plain_html(text, html))
                    .map_err(|e| DeliveryError::Message(e.to_string()))?;
                transport
                    .send(message)
                    .await
                    .map_err(|e| DeliveryError::Smtp(e.to_string()))?;
            }
            MailTransport::Log => {
                tracing::info!(to = recipient, subject = %subject, "email delivered to log");
            }
            MailTransport::Outbox(outbox) => outbox.deliver(OutgoingEmail {
                to: recipient.to_string(),
                subject,
                text,
                html,
            })?,
        }

        Ok(format!("email:{}:{event}", order.id))
    }
}

fn subject_for(event: &str, order: &Order) -> String {
    match event {
        "order.created" => format!("Confirming your Order #{}", order.id),
        "payment.confirmed" => format!("Payment Received for Order #{}", order.id),
        _ => format!("Update on Order #{}", order.id),
    }
}

fn render_body(name: &str, event: &str, order: &Order) -> (String, String) {
    let headline = match event {
        "order.created" => "Thanks for your order! We have received it and will keep you posted.",
        "payment.confirmed" => "We have received your payment. Your order is on its way.",
        _ => "There is an update on your order.",
    };
    let text = format!(
        "Hello {name},\n\n{headline}\n\nOrder #{id}\nStatus: {status}\nTotal: {total}\nShipping to: {address}\n",
        id = order.id,
        status = order.status,
        total = order.total_amount,
        address = order.address,
    );
    let html = format!(
        "<!DOCTYPE html>\n<html>\n<body style=\"font-family: Arial, sans-serif; color: #333;\">\n\
         <p>Hello {name},</p>\n<p>{headline}</p>\n<table>\n\
         <tr><td>Order</td><td>#{id}</td></tr>\n\
         <tr><td>Status</td><td>{status}</td></tr>\n\
         <tr><td>Total</td><td>{total}</td></tr>\n\
         <tr><td>Shipping to</td><td>{address}</td></tr>\n\
         </table>\n</body>\n</html>\n",
        id = order.id,
        status = order.status,
        total = order.total_amount,
        address = order.address,
    );
    (text, html)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use common::{Money, OrderId, UserId};
    use domain::{NewOrder, User};

    use super::*;

    fn order() -> Order {
        let mut order = NewOrder {
            user_id: UserId::new(7),
            address: "1 Main St".to_string(),
        }
        .into_order(OrderId::new(42), Utc::now());
        order.total_amount = Money::from_cents(24997);
        order
    }

    #[tokio::test]
    async fn order_created_email_is_multipart_with_subject() {
        let outbox = Outbox::new();
        let adapter = EmailAdapter::new("orders@example.com", MailTransport::Outbox(outbox.clone())).unwrap();
        let order = order();
        let user = User::new(UserId::new(7), "alice").with_email("alice@example.com");

        let external_id = adapter
            .send(DeliveryTarget { order: &order, customer: Some(&user) }, "order.created")
            .await
            .unwrap();

        assert_eq!(external_id, "email:42:order.created");
        let sent = outbox.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "alice@example.com");
        assert_eq!(sent[0].subject, "Confirming your Order #42");
        assert!(sent[0].text.contains("Total: 249.97"));
        assert!(sent[0].html.contains("<td>#42</td>"));
    }

    #[tokio::test]
    async fn subjects_follow_event() {
        let order = order();
        assert_eq!(subject_for("payment.confirmed", &order), "Payment Received for Order #42");
        assert_eq!(subject_for("order.shipped", &order), "Update on Order #42");
    }

    #[tokio::test]
    async fn blank_or_missing_email_is_an_error() {
        let adapter = EmailAdapter::new("orders@example.com", MailTransport::Log).unwrap();
        let order = order();
        let blank = User::new(UserId::new(7), "alice").with_email("  ");

        for customer in [None, Some(&blank)] {
            let err = adapter
                .send(DeliveryTarget { order: &order, customer }, "order.created")
                .await
                .unwrap_err();
            assert!(matches!(err, DeliveryError::MissingEmail { .. }));
        }
    }

    #[test]
    fn invalid_sender_is_rejected() {
        assert!(matches!(
            EmailAdapter::new("not an address", MailTransport::Log),
            Err(DeliveryError::InvalidAddress { .. })
        ));
    }
}
