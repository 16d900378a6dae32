//! Scriptable Gateway Mocks
//!
//! In-process stand-ins for the payment gateway and airtime provider.
//! Tests script the next responses up front and inspect the recorded
//! calls afterwards; no network involved.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use ulid::Ulid;

use super::error::GatewayError;
use super::types::{
    AirtimeOutcome, AirtimePurchase, AirtimeService, Bank, InitiatedPayment, InitiatedTransfer,
    PaymentRequest, ResolvedAccount, TransferRequest, VerifiedTransaction,
};
use super::{AirtimeProvider, PaymentGateway};

#[derive(Default)]
struct GatewayState {
    verify_queue: VecDeque<Result<VerifiedTransaction, GatewayError>>,
    next_reference: Option<String>,
    fail_next_payment: bool,
    fail_next_transfer: bool,
    payment_calls: Vec<PaymentRequest>,
    transfer_calls: Vec<TransferRequest>,
    verify_calls: Vec<String>,
}

/// Payment gateway mock with scripted verify results
#[derive(Default)]
pub struct MockGateway {
    state: Mutex<GatewayState>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of the next `verify_transaction` call.
    pub async fn push_verify(&self, result: Result<VerifiedTransaction, GatewayError>) {
        self.state.lock().await.verify_queue.push_back(result);
    }

    /// Force the next initiation to use a fixed reference instead of a
    /// generated one, so tests can correlate it with webhook payloads.
    pub async fn set_next_reference(&self, reference: &str) {
        self.state.lock().await.next_reference = Some(reference.to_string());
    }

    pub async fn fail_next_payment(&self) {
        self.state.lock().await.fail_next_payment = true;
    }

    pub async fn fail_next_transfer(&self) {
        self.state.lock().await.fail_next_transfer = true;
    }

    pub async fn payment_calls(&self) -> Vec<PaymentRequest> {
        self.state.lock().await.payment_calls.clone()
    }

    pub async fn transfer_calls(&self) -> Vec<TransferRequest> {
        self.state.lock().await.transfer_calls.clone()
    }

    pub async fn verify_calls(&self) -> Vec<String> {
        self.state.lock().await.verify_calls.clone()
    }

    fn reference_for(state: &mut GatewayState, user_id: i64) -> String {
        state
            .next_reference
            .take()
            .unwrap_or_else(|| format!("tx_ref-{}-{}", user_id, Ulid::new()))
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn initiate_payment(
        &self,
        req: PaymentRequest,
    ) -> Result<InitiatedPayment, GatewayError> {
        let mut state = self.state.lock().await;
        state.payment_calls.push(req.clone());
        if state.fail_next_payment {
            state.fail_next_payment = false;
            return Err(GatewayError::Unavailable("scripted outage".to_string()));
        }
        let reference = Self::reference_for(&mut state, req.user_id);
        Ok(InitiatedPayment {
            link: format!("https://mock.pay/{}", reference),
            reference,
            created_at: Utc::now(),
        })
    }

    async fn initiate_transfer(
        &self,
        req: TransferRequest,
    ) -> Result<InitiatedTransfer, GatewayError> {
        let mut state = self.state.lock().await;
        state.transfer_calls.push(req.clone());
        if state.fail_next_transfer {
            state.fail_next_transfer = false;
            return Err(GatewayError::Unavailable("scripted outage".to_string()));
        }
        let reference = Self::reference_for(&mut state, req.user_id);
        Ok(InitiatedTransfer {
            reference,
            created_at: Utc::now(),
        })
    }

    async fn verify_transaction(
        &self,
        provider_tx_id: &str,
    ) -> Result<VerifiedTransaction, GatewayError> {
        let mut state = self.state.lock().await;
        state.verify_calls.push(provider_tx_id.to_string());
        state
            .verify_queue
            .pop_front()
            .unwrap_or_else(|| Err(GatewayError::Unavailable("no scripted verify".to_string())))
    }

    async fn list_banks(&self) -> Result<Vec<Bank>, GatewayError> {
        Ok(vec![Bank {
            id: 1,
            code: "044".to_string(),
            name: "Mock Bank".to_string(),
        }])
    }

    async fn resolve_account(
        &self,
        bank_code: &str,
        account_number: &str,
    ) -> Result<ResolvedAccount, GatewayError> {
        Ok(ResolvedAccount {
            account_number: account_number.to_string(),
            account_name: "MOCK ACCOUNT HOLDER".to_string(),
            bank_code: bank_code.to_string(),
        })
    }
}

#[derive(Default)]
struct AirtimeState {
    outcome_queue: VecDeque<AirtimeOutcome>,
    buy_calls: Vec<(i64, String, Decimal, String)>,
    requery_calls: Vec<String>,
    purchase_seq: u64,
}

/// Airtime provider mock with scripted outcomes
#[derive(Default)]
pub struct MockAirtime {
    state: Mutex<AirtimeState>,
    services: Vec<AirtimeService>,
}

impl MockAirtime {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AirtimeState::default()),
            services: vec![
                AirtimeService {
                    service_id: "mtn".to_string(),
                    name: "MTN Nigeria".to_string(),
                    minimum_amount: Decimal::from(50),
                    maximum_amount: Decimal::from(50_000),
                },
                AirtimeService {
                    service_id: "airtel".to_string(),
                    name: "Airtel Nigeria".to_string(),
                    minimum_amount: Decimal::from(50),
                    maximum_amount: Decimal::from(50_000),
                },
            ],
        }
    }

    /// Queue the outcome of the next purchase or requery.
    pub async fn push_outcome(&self, outcome: AirtimeOutcome) {
        self.state.lock().await.outcome_queue.push_back(outcome);
    }

    pub async fn buy_calls(&self) -> Vec<(i64, String, Decimal, String)> {
        self.state.lock().await.buy_calls.clone()
    }

    pub async fn requery_calls(&self) -> Vec<String> {
        self.state.lock().await.requery_calls.clone()
    }

    fn next_purchase(state: &mut AirtimeState, request_id: String) -> AirtimePurchase {
        let outcome = state
            .outcome_queue
            .pop_front()
            .unwrap_or(AirtimeOutcome::Success);
        AirtimePurchase {
            request_id,
            message: format!("scripted {:?}", outcome),
            outcome,
        }
    }
}

#[async_trait]
impl AirtimeProvider for MockAirtime {
    async fn list_services(&self) -> Result<Vec<AirtimeService>, GatewayError> {
        Ok(self.services.clone())
    }

    async fn buy_airtime(
        &self,
        user_id: i64,
        service_id: &str,
        amount: Decimal,
        phone_number: &str,
    ) -> Result<AirtimePurchase, GatewayError> {
        let mut state = self.state.lock().await;
        state.buy_calls.push((
            user_id,
            service_id.to_string(),
            amount,
            phone_number.to_string(),
        ));
        state.purchase_seq += 1;
        let request_id = format!("mock-req-{}-{}", user_id, state.purchase_seq);
        Ok(Self::next_purchase(&mut state, request_id))
    }

    async fn requery(&self, request_id: &str) -> Result<AirtimePurchase, GatewayError> {
        let mut state = self.state.lock().await;
        state.requery_calls.push(request_id.to_string());
        Ok(Self::next_purchase(&mut state, request_id.to_string()))
    }
}
