//! Wallet Operation Errors

use thiserror::Error;

use crate::gateway::GatewayError;
use crate::ledger::LedgerError;

/// Errors surfaced by the money-moving operations layer.
#[derive(Error, Debug, Clone)]
pub enum WalletError {
    #[error("Wallet is locked by another operation")]
    LockConflict,

    #[error("Insufficient balance for this operation")]
    InsufficientFunds,

    #[error("Transaction reference already exists: {0}")]
    DuplicateReference(String),

    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Reconciliation mismatch: {0}")]
    ReconciliationMismatch(String),

    #[error("Wallet not found")]
    WalletNotFound,

    #[error("Wallet is deactivated")]
    WalletInactive,

    #[error("Invalid amount")]
    InvalidAmount,

    #[error("Airtime purchase rejected: {0}")]
    AirtimeRejected(String),

    // Storage details are not leaked to callers.
    #[error("Ledger store error: {0}")]
    Store(LedgerError),
}

impl WalletError {
    /// Stable error code for API responses and logs
    pub fn code(&self) -> &'static str {
        match self {
            WalletError::LockConflict => "LOCK_CONFLICT",
            WalletError::InsufficientFunds => "INSUFFICIENT_FUNDS",
            WalletError::DuplicateReference(_) => "DUPLICATE_REFERENCE",
            WalletError::GatewayUnavailable(_) => "GATEWAY_UNAVAILABLE",
            WalletError::ReconciliationMismatch(_) => "RECONCILIATION_MISMATCH",
            WalletError::WalletNotFound => "WALLET_NOT_FOUND",
            WalletError::WalletInactive => "WALLET_INACTIVE",
            WalletError::InvalidAmount => "INVALID_AMOUNT",
            WalletError::AirtimeRejected(_) => "AIRTIME_REJECTED",
            WalletError::Store(_) => "STORE_ERROR",
        }
    }

}

/// Ledger errors map onto the operation-level variants callers branch on;
/// anything else is an opaque store error.
impl From<LedgerError> for WalletError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::LockConflict => WalletError::LockConflict,
            LedgerError::InsufficientFunds => WalletError::InsufficientFunds,
            LedgerError::DuplicateReference(r) => WalletError::DuplicateReference(r),
            LedgerError::WalletNotFound => WalletError::WalletNotFound,
            other => WalletError::Store(other),
        }
    }
}

impl From<GatewayError> for WalletError {
    fn from(e: GatewayError) -> Self {
        WalletError::GatewayUnavailable(e.to_string())
    }
}
