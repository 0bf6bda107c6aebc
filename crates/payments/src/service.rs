//! Payment state machine.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use common::{Money, OrderId};
use domain::{
    Actor, NewPayment, NewWebhookEvent, Order, Payment, PaymentStatus, REFERENCE_NUMBER_MAX_LEN,
    User, ValidationError,
};
use notifications::{TaskQueue, enqueue_for_customer};
use serde_json::Value;
use storage::{Store, Transaction, constraints};

use crate::error::{PaymentError, ProviderError};
use crate::gateway::{GenerateRequest, PaymentGateway, UpdateRequest};
use crate::webhook::{VerifiedWebhook, WebhookRequest, WebhookVerifier};

/// Service-level settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentConfig {
    /// Upper bound on a whole payment or webhook operation, provider calls
    /// included. On expiry nothing is committed.
    pub operation_timeout: Duration,
}

impl PaymentConfig {
    pub fn from_env() -> Self {
        Self {
            operation_timeout: std::env::var("PAYMENT_OPERATION_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Self::default().operation_timeout),
        }
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(15),
        }
    }
}

/// Payer details for the generate step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratePaymentRequest {
    pub order_id: OrderId,
    pub vpa: String,
    pub vpa_name: String,
    pub customer_name: String,
    pub customer_email: String,
    pub transaction_note: Option<String>,
}

/// Simple-flow charge request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRequest {
    pub order_id: OrderId,
    pub provider_token: String,
    pub currency: String,
}

/// How a webhook delivery was handled. Both are successes to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Processed,
    Duplicate,
}

impl WebhookOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Processed => "processed",
            WebhookOutcome::Duplicate => "duplicate",
        }
    }
}

/// Owns every Payment and Order status transition.
pub struct PaymentService<S: Store, G: PaymentGateway> {
    store: S,
    gateway: G,
    verifier: WebhookVerifier,
    queue: Arc<dyn TaskQueue>,
    config: PaymentConfig,
}

impl<S: Store, G: PaymentGateway> PaymentService<S, G> {
    pub fn new(
        store: S,
        gateway: G,
        verifier: WebhookVerifier,
        queue: Arc<dyn TaskQueue>,
        config: PaymentConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            verifier,
            queue,
            config,
        }
    }

    /// Simple flow: charge once, all or nothing.
    ///
    /// A decline or provider failure rolls back everything, including the
    /// payment row created for the attempt.
    #[tracing::instrument(skip(self, request), fields(user_id = %actor.user_id, order_id = %request.order_id))]
    pub async fn create_payment(
        &self,
        actor: Actor,
        request: ChargeRequest,
    ) -> Result<Payment, PaymentError> {
        let (payment, customer) = self.bounded(self.charge_order(actor, request)).await?;
        self.settled("charge", &payment, customer.as_ref()).await;
        Ok(payment)
    }

    /// Resumable flow, step one: open a provider order for the customer.
    ///
    /// Creates the INITIATED payment on first call and reuses it afterwards;
    /// each call refreshes the stored vendor session. Status never changes.
    #[tracing::instrument(skip(self, request), fields(user_id = %actor.user_id, order_id = %request.order_id))]
    pub async fn generate_payment(
        &self,
        actor: Actor,
        request: GeneratePaymentRequest,
    ) -> Result<Payment, PaymentError> {
        self.bounded(self.open_vendor_session(actor, request)).await
    }

    /// Resumable flow, step two: report the customer's reference and settle.
    ///
    /// A failure here leaves the INITIATED payment in place for another try.
    /// Confirming a payment that already succeeded returns it unchanged.
    #[tracing::instrument(skip(self, reference_number), fields(user_id = %actor.user_id))]
    pub async fn confirm_payment(
        &self,
        actor: Actor,
        order_id: OrderId,
        reference_number: &str,
    ) -> Result<Payment, PaymentError> {
        let reference_number = reference_number.trim();
        if reference_number.is_empty() {
            return Err(ValidationError::InvalidField {
                field: "referenceNumber".to_string(),
                reason: "must not be blank".to_string(),
            }
            .into());
        }
        if reference_number.chars().count() > REFERENCE_NUMBER_MAX_LEN {
            return Err(ValidationError::InvalidField {
                field: "referenceNumber".to_string(),
                reason: format!("must be at most {REFERENCE_NUMBER_MAX_LEN} characters"),
            }
            .into());
        }

        let (payment, transition) = self
            .bounded(self.confirm_vendor_payment(actor, order_id, reference_number))
            .await?;
        if let Some(customer) = transition {
            self.settled("confirm", &payment, customer.as_ref()).await;
        }
        Ok(payment)
    }

    /// Verifies and applies a provider callback exactly once per webhook id.
    ///
    /// Redeliveries, including concurrent ones, are successes with no
    /// effect. An event that matches no payment is still recorded.
    #[tracing::instrument(skip(self, request), fields(webhook_id = ?request.webhook_id))]
    pub async fn handle_webhook(
        &self,
        request: WebhookRequest<'_>,
    ) -> Result<WebhookOutcome, PaymentError> {
        let verified = self.verifier.verify(request)?;
        let (outcome, settled) = self.bounded(self.apply_webhook(&verified)).await?;

        metrics::counter!("webhooks_received_total", "outcome" => outcome.as_str()).increment(1);
        tracing::info!(outcome = outcome.as_str(), "webhook handled");
        if let Some((payment, customer)) = settled {
            self.settled("webhook", &payment, customer.as_ref()).await;
        }
        Ok(outcome)
    }

    /// Provider-side status of the order's payment. Owners and admins only.
    #[tracing::instrument(skip(self), fields(user_id = %actor.user_id))]
    pub async fn payment_status(
        &self,
        actor: Actor,
        order_id: OrderId,
    ) -> Result<Value, PaymentError> {
        self.bounded(self.vendor_status(actor, order_id)).await
    }

    async fn charge_order(
        &self,
        actor: Actor,
        request: ChargeRequest,
    ) -> Result<(Payment, Option<User>), PaymentError> {
        let mut tx = self.store.begin().await?;
        let mut order = lock_order(&mut tx, request.order_id).await?;
        actor.ensure_owner(order.id, order.user_id)?;
        order.ensure_payable()?;
        if tx.payment_for_order(order.id).await?.is_some() {
            return Err(ValidationError::PaymentAlreadyExists { order_id: order.id }.into());
        }

        let mut payment = tx
            .insert_payment(NewPayment {
                order_id: order.id,
                amount: order.total_amount,
            })
            .await?;

        let outcome = self
            .gateway
            .charge(payment.amount, &request.currency, &request.provider_token)
            .await
            .inspect_err(|err| record_failure("charge", err))?;
        let reference = Some(outcome.reference).filter(|r| !r.is_empty());
        if !outcome.success {
            let err = ProviderError::Declined { reference };
            record_failure("charge", &err);
            return Err(err.into());
        }

        payment.settle_charge(reference)?;
        order.mark_paid()?;
        tx.update_payment(&payment).await?;
        tx.update_order(&order).await?;
        let customer = tx.find_user(order.user_id).await?;
        tx.commit().await?;
        Ok((payment, customer))
    }

    async fn open_vendor_session(
        &self,
        actor: Actor,
        request: GeneratePaymentRequest,
    ) -> Result<Payment, PaymentError> {
        let mut tx = self.store.begin().await?;
        let order = lock_order(&mut tx, request.order_id).await?;
        actor.ensure_owner(order.id, order.user_id)?;
        order.ensure_payable()?;

        let mut payment = match tx.payment_for_order(order.id).await? {
            Some(payment) => payment,
            None => {
                tx.insert_payment(NewPayment {
                    order_id: order.id,
                    amount: order.total_amount,
                })
                .await?
            }
        };

        let amount = minor_units(order.total_amount)?;
        let session = self
            .gateway
            .generate(&GenerateRequest {
                vpa: request.vpa,
                vpa_name: request.vpa_name,
                amount,
                merchant_order_id: format!("ORDER-{}", order.id),
                customer_name: request.customer_name,
                customer_email: request.customer_email,
                transaction_note: request.transaction_note.filter(|n| !n.trim().is_empty()),
            })
            .await
            .inspect_err(|err| record_failure("generate", err))?;

        payment.attach_vendor_session(
            session.vendor_order_handle,
            session.pay_string,
            session.qr_payload,
        );
        tx.update_payment(&payment).await?;
        tx.commit().await?;

        tracing::info!(payment_id = %payment.id, "vendor session generated");
        Ok(payment)
    }

    /// Returns the payment and, when this call made the transition, the
    /// customer to notify.
    async fn confirm_vendor_payment(
        &self,
        actor: Actor,
        order_id: OrderId,
        reference_number: &str,
    ) -> Result<(Payment, Option<Option<User>>), PaymentError> {
        let mut tx = self.store.begin().await?;
        let mut order = lock_order(&mut tx, order_id).await?;
        actor.ensure_owner(order.id, order.user_id)?;

        let mut payment = tx
            .payment_for_order(order.id)
            .await?
            .filter(Payment::has_vendor_session)
            .ok_or(ValidationError::PaymentNotInitiated { order_id: order.id })?;
        if payment.status == PaymentStatus::Success {
            return Ok((payment, None));
        }
        order.ensure_payable()?;

        self.gateway
            .update(&UpdateRequest {
                vendor_order_handle: payment.vendor_order_handle.clone().unwrap_or_default(),
                reference_number: reference_number.to_string(),
                order_status: None,
            })
            .await
            .inspect_err(|err| record_failure("confirm", err))?;

        payment.confirm(Some(reference_number.to_string()))?;
        order.mark_paid()?;
        tx.update_payment(&payment).await?;
        tx.update_order(&order).await?;
        let customer = tx.find_user(order.user_id).await?;
        tx.commit().await?;
        Ok((payment, Some(customer)))
    }

    async fn apply_webhook(
        &self,
        verified: &VerifiedWebhook,
    ) -> Result<(WebhookOutcome, Option<(Payment, Option<User>)>), PaymentError> {
        let mut tx = self.store.begin().await?;
        if tx.webhook_event_exists(&verified.webhook_id).await? {
            return Ok((WebhookOutcome::Duplicate, None));
        }

        let reference = verified.reference_number().map(str::to_string);
        let mut matched = None;
        if let Some(reference) = reference.as_deref() {
            matched = tx.find_payment_by_reference(reference).await?;
        }
        if matched.is_none()
            && let Some(handle) = verified.vendor_order_handle()
        {
            matched = tx.find_payment_by_vendor_handle(handle).await?;
        }

        let mut settled = None;
        match matched {
            Some(found) => {
                let mut order = lock_order(&mut tx, found.order_id).await?;
                // Re-read under the order lock; a confirm may have won the race.
                let mut payment = tx.payment_for_order(order.id).await?.unwrap_or(found);
                if payment.status == PaymentStatus::Initiated && order.status.can_pay() {
                    payment.confirm(reference)?;
                    order.mark_paid()?;
                    tx.update_payment(&payment).await?;
                    tx.update_order(&order).await?;
                    let customer = tx.find_user(order.user_id).await?;
                    settled = Some((payment, customer));
                } else {
                    tracing::info!(
                        order_id = %order.id,
                        payment_status = %payment.status,
                        order_status = %order.status,
                        "webhook recorded without a transition"
                    );
                }
            }
            None => tracing::warn!("webhook matches no payment"),
        }

        let event = NewWebhookEvent {
            webhook_id: verified.webhook_id.clone(),
            payload: Value::Object(verified.payload.clone()),
        };
        let recorded = match tx.insert_webhook_event(event).await {
            Ok(_) => tx.commit().await,
            Err(err) => Err(err),
        };
        match recorded {
            Ok(()) => Ok((WebhookOutcome::Processed, settled)),
            Err(err) if err.is_unique_violation(constraints::UNIQUE_WEBHOOK_ID) => {
                Ok((WebhookOutcome::Duplicate, None))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn vendor_status(&self, actor: Actor, order_id: OrderId) -> Result<Value, PaymentError> {
        let mut tx = self.store.begin().await?;
        let order = tx
            .find_order(order_id)
            .await?
            .ok_or(ValidationError::OrderNotFound { order_id })?;
        actor.ensure_can_view(order.id, order.user_id)?;
        let handle = tx
            .payment_for_order(order.id)
            .await?
            .and_then(|payment| payment.vendor_order_handle)
            .filter(|handle| !handle.is_empty())
            .ok_or(ValidationError::PaymentNotInitiated { order_id })?;
        drop(tx);

        Ok(self.gateway.status(&handle).await?)
    }

    async fn bounded<T>(
        &self,
        operation: impl Future<Output = Result<T, PaymentError>>,
    ) -> Result<T, PaymentError> {
        let limit = self.config.operation_timeout;
        tokio::time::timeout(limit, operation).await.unwrap_or_else(|_| {
            tracing::warn!(timeout = ?limit, "payment operation timed out");
            Err(PaymentError::Timeout(limit))
        })
    }

    /// Bookkeeping after a SUCCESS transition has committed.
    async fn settled(&self, flow: &'static str, payment: &Payment, customer: Option<&User>) {
        metrics::counter!("payments_succeeded_total", "flow" => flow).increment(1);
        tracing::info!(payment_id = %payment.id, order_id = %payment.order_id, flow, "payment succeeded");

        if let Some(customer) = customer {
            enqueue_for_customer(
                self.queue.as_ref(),
                customer,
                payment.order_id,
                "payment.confirmed",
                format!("order:{}:paid", payment.order_id),
            )
            .await;
        }
    }
}

async fn lock_order<T: Transaction>(tx: &mut T, order_id: OrderId) -> Result<Order, PaymentError> {
    Ok(tx
        .lock_order(order_id)
        .await?
        .ok_or(ValidationError::OrderNotFound { order_id })?)
}

fn minor_units(amount: Money) -> Result<i64, ValidationError> {
    amount.to_minor_units().ok_or_else(|| ValidationError::InvalidField {
        field: "amount".to_string(),
        reason: format!("{amount} cannot be expressed in minor units"),
    })
}

fn record_failure(flow: &'static str, err: &ProviderError) {
    metrics::counter!("payments_failed_total", "flow" => flow).increment(1);
    tracing::warn!(flow, error = %err, retryable = err.is_retryable(), "payment provider call failed");
}
