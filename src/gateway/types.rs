//! Gateway Adapter Types
//!
//! Request/response shapes for the payment-gateway and airtime-provider
//! contracts. The core depends only on these, never on provider wire formats.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Request to open a hosted payment (wallet funding)
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub user_id: i64,
    pub email: String,
    pub amount: Decimal,
    pub currency: String,
}

/// Result of initiating a payment: the reference is the idempotency key the
/// pending transaction is created under, the link is what the client opens.
#[derive(Debug, Clone, Serialize)]
pub struct InitiatedPayment {
    pub reference: String,
    pub link: String,
    pub created_at: DateTime<Utc>,
}

/// Request to push funds out to a bank account (withdrawal)
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub user_id: i64,
    pub amount: Decimal,
    pub currency: String,
    pub bank_code: String,
    pub account_number: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitiatedTransfer {
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

/// Provider-verified terminal view of a transaction.
///
/// This comes from the verification endpoint, never from a webhook payload:
/// the amount here is the one actually applied to the wallet.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedTransaction {
    pub status: VerifiedStatus,
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifiedStatus {
    Successful,
    Pending,
    Failed,
}

impl VerifiedStatus {
    #[inline]
    pub fn is_successful(&self) -> bool {
        matches!(self, VerifiedStatus::Successful)
    }
}

/// A bank as listed by the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bank {
    pub id: i64,
    pub code: String,
    pub name: String,
}

/// A resolved bank account (pre-withdrawal verification)
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedAccount {
    pub account_number: String,
    pub account_name: String,
    pub bank_code: String,
}

/// An airtime service offered by the telco provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirtimeService {
    pub service_id: String,
    pub name: String,
    pub minimum_amount: Decimal,
    pub maximum_amount: Decimal,
}

/// Normalized outcome of an airtime purchase or requery.
///
/// Providers report a code/status pair; adapters fold that into this closed
/// set so the operations layer never branches on provider strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AirtimeOutcome {
    /// Delivered; safe to debit the wallet synchronously.
    Success,
    /// Accepted but not yet terminal; resolved later by webhook or requery.
    Pending,
    /// Provider asked for a status re-query before treating as terminal.
    Requery,
    /// Rejected by the provider.
    Failed(String),
    /// Malformed or unexpected provider response.
    Error(String),
}

/// Result of an airtime purchase attempt
#[derive(Debug, Clone)]
pub struct AirtimePurchase {
    /// Provider request id; becomes the transaction reference.
    pub request_id: String,
    pub outcome: AirtimeOutcome,
    pub message: String,
}
