//! Payment entity.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, PaymentId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

use super::PaymentStatus;

/// The single payment attached to an order.
///
/// The vendor fields (`vendor_order_handle`, `pay_string`, `qr_payload`) are
/// only set by the generate/confirm flow; the simple charge flow only ever
/// fills `provider_reference`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub amount: Money,
    pub status: PaymentStatus,
    pub provider_reference: Option<String>,
    pub vendor_order_handle: Option<String>,
    pub pay_string: Option<String>,
    pub qr_payload: Option<String>,
    pub reference_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Returns true once the provider has issued an order handle.
    pub fn has_vendor_session(&self) -> bool {
        self.vendor_order_handle
            .as_deref()
            .is_some_and(|handle| !handle.is_empty())
    }

    /// Stores what the provider returned from a generate call.
    ///
    /// Status is left untouched; generating twice overwrites the session.
    pub fn attach_vendor_session(
        &mut self,
        vendor_order_handle: Option<String>,
        pay_string: Option<String>,
        qr_payload: Option<String>,
    ) {
        self.vendor_order_handle = vendor_order_handle;
        self.pay_string = pay_string;
        self.qr_payload = qr_payload;
        self.updated_at = Utc::now();
    }

    /// INITIATED → SUCCESS for the generate/confirm flow and webhooks.
    ///
    /// A supplied reference becomes both the reference number and the
    /// provider reference; `None` keeps whatever was stored before.
    pub fn confirm(&mut self, reference_number: Option<String>) -> Result<(), DomainError> {
        self.transition(PaymentStatus::Success, "confirm")?;
        if let Some(reference) = reference_number {
            self.provider_reference = Some(reference.clone());
            self.reference_number = Some(reference);
        }
        Ok(())
    }

    /// INITIATED → SUCCESS for the simple charge flow.
    pub fn settle_charge(&mut self, provider_reference: Option<String>) -> Result<(), DomainError> {
        self.transition(PaymentStatus::Success, "settle")?;
        self.provider_reference = provider_reference;
        Ok(())
    }

    fn transition(&mut self, to: PaymentStatus, action: &'static str) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::InvalidTransition {
                entity: "payment",
                from: self.status.as_str(),
                action,
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Fields supplied when inserting a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub order_id: OrderId,
    pub amount: Money,
}

impl NewPayment {
    /// Materializes the INITIATED payment the store persists.
    pub fn into_payment(self, id: PaymentId, now: DateTime<Utc>) -> Payment {
        Payment {
            id,
            order_id: self.order_id,
            amount: self.amount,
            status: PaymentStatus::Initiated,
            provider_reference: None,
            vendor_order_handle: None,
            pay_string: None,
            qr_payload: None,
            reference_number: None,
            created_at: now,
            updated_at: now,
        }
    }
}
