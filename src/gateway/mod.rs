//! Gateway Adapter Interface
//!
//! The core's only view of external money rails: initiate a payment or
//! transfer, verify a transaction, resolve bank details, buy airtime.
//! Concrete providers live behind these traits; the reconciler and the
//! wallet operations are provider-agnostic.

pub mod error;
pub mod flutterwave;
pub mod mock;
pub mod types;
pub mod vtpass;

use async_trait::async_trait;

pub use error::GatewayError;
pub use flutterwave::{FlutterwaveClient, FlutterwaveConfig};
pub use mock::{MockAirtime, MockGateway};
pub use types::{
    AirtimeOutcome, AirtimePurchase, AirtimeService, Bank, InitiatedPayment, InitiatedTransfer,
    PaymentRequest, ResolvedAccount, TransferRequest, VerifiedStatus, VerifiedTransaction,
};
pub use vtpass::{VtPassClient, VtPassConfig};

/// Third-party payment gateway contract.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a hosted payment for wallet funding.
    async fn initiate_payment(
        &self,
        req: PaymentRequest,
    ) -> Result<InitiatedPayment, GatewayError>;

    /// Initiate a transfer to an external bank account.
    async fn initiate_transfer(
        &self,
        req: TransferRequest,
    ) -> Result<InitiatedTransfer, GatewayError>;

    /// Re-confirm a transaction against the provider. Webhook payloads are
    /// never trusted for amounts; this call is.
    async fn verify_transaction(
        &self,
        provider_tx_id: &str,
    ) -> Result<VerifiedTransaction, GatewayError>;

    /// List supported banks for the configured country.
    async fn list_banks(&self) -> Result<Vec<Bank>, GatewayError>;

    /// Resolve an account number to its holder before moving money to it.
    async fn resolve_account(
        &self,
        bank_code: &str,
        account_number: &str,
    ) -> Result<ResolvedAccount, GatewayError>;
}

/// Telco airtime provider contract.
#[async_trait]
pub trait AirtimeProvider: Send + Sync {
    async fn list_services(&self) -> Result<Vec<AirtimeService>, GatewayError>;

    async fn buy_airtime(
        &self,
        user_id: i64,
        service_id: &str,
        amount: rust_decimal::Decimal,
        phone_number: &str,
    ) -> Result<AirtimePurchase, GatewayError>;

    /// Re-query a purchase the provider previously reported non-terminal.
    async fn requery(&self, request_id: &str) -> Result<AirtimePurchase, GatewayError>;
}
