use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::Money;
use serde_json::{Value, json};

use super::{ChargeOutcome, GenerateRequest, PaymentGateway, UpdateRequest, VendorSession};
use crate::error::ProviderError;

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    next_id: u32,
    fail_on_charge: bool,
    decline_charges: bool,
    fail_on_generate: bool,
    fail_on_update: bool,
    delay: Option<Duration>,
    charge_count: usize,
    generate_count: usize,
    update_count: usize,
    status_count: usize,
    last_generate: Option<GenerateRequest>,
    last_update: Option<UpdateRequest>,
    confirmed: Vec<String>,
}

/// In-memory payment gateway for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes charges fail as if the provider were unreachable.
    pub fn set_fail_on_charge(&self, fail: bool) {
        self.write().fail_on_charge = fail;
    }

    /// Makes the provider answer charges with `success: false`.
    pub fn set_decline_charges(&self, decline: bool) {
        self.write().decline_charges = decline;
    }

    pub fn set_fail_on_generate(&self, fail: bool) {
        self.write().fail_on_generate = fail;
    }

    pub fn set_fail_on_update(&self, fail: bool) {
        self.write().fail_on_update = fail;
    }

    /// Delays every call, for exercising timeouts.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.write().delay = delay;
    }

    pub fn charge_count(&self) -> usize {
        self.read().charge_count
    }

    pub fn generate_count(&self) -> usize {
        self.read().generate_count
    }

    pub fn update_count(&self) -> usize {
        self.read().update_count
    }

    pub fn status_count(&self) -> usize {
        self.read().status_count
    }

    pub fn last_generate(&self) -> Option<GenerateRequest> {
        self.read().last_generate.clone()
    }

    pub fn last_update(&self) -> Option<UpdateRequest> {
        self.read().last_update.clone()
    }

    async fn pause(&self) {
        let delay = self.read().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, InMemoryGatewayState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, InMemoryGatewayState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn unavailable() -> ProviderError {
    ProviderError::ServerError { status: 503 }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn charge(
        &self,
        _amount: Money,
        _currency: &str,
        _token: &str,
    ) -> Result<ChargeOutcome, ProviderError> {
        self.pause().await;
        let mut state = self.write();
        state.charge_count += 1;
        if state.fail_on_charge {
            return Err(unavailable());
        }

        state.next_id += 1;
        Ok(ChargeOutcome {
            success: !state.decline_charges,
            reference: format!("ch_{:04}", state.next_id),
        })
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<VendorSession, ProviderError> {
        self.pause().await;
        let mut state = self.write();
        state.generate_count += 1;
        state.last_generate = Some(request.clone());
        if state.fail_on_generate {
            return Err(unavailable());
        }

        state.next_id += 1;
        Ok(VendorSession {
            vendor_order_handle: Some(format!("uro_{:04}", state.next_id)),
            pay_string: Some(format!("upi://pay?pa={}&am={}", request.vpa, request.amount)),
            qr_payload: Some(format!("qr:{}", request.merchant_order_id)),
        })
    }

    async fn update(&self, request: &UpdateRequest) -> Result<Value, ProviderError> {
        self.pause().await;
        let mut state = self.write();
        state.update_count += 1;
        state.last_update = Some(request.clone());
        if state.fail_on_update {
            return Err(unavailable());
        }

        state.confirmed.push(request.vendor_order_handle.clone());
        Ok(json!({"uroPayOrderId": request.vendor_order_handle, "orderStatus": "COMPLETED"}))
    }

    async fn status(&self, vendor_order_handle: &str) -> Result<Value, ProviderError> {
        self.pause().await;
        let mut state = self.write();
        state.status_count += 1;
        let status = if state.confirmed.iter().any(|h| h == vendor_order_handle) {
            "COMPLETED"
        } else {
            "PENDING"
        };
        Ok(json!({"uroPayOrderId": vendor_order_handle, "orderStatus": status}))
    }
}
