//! Ledger Error Types

use thiserror::Error;

/// Errors surfaced by the ledger store and the wallet lock protocol.
#[derive(Error, Debug, Clone)]
pub enum LedgerError {
    // === Lock protocol ===
    #[error("Wallet is locked by another operation")]
    LockConflict,

    // === Balance invariant ===
    #[error("Insufficient balance for this operation")]
    InsufficientFunds,

    // === Idempotency ===
    #[error("Transaction reference already exists: {0}")]
    DuplicateReference(String),

    // === Existence ===
    #[error("Wallet already exists for user: {0}")]
    WalletExists(i64),

    #[error("Wallet not found")]
    WalletNotFound,

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    // === System ===
    // Storage details are reported generically; callers must not branch on
    // the inner message.
    #[error("Database error: {0}")]
    Database(String),
}

impl LedgerError {
    /// Stable error code for API responses and logs
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::LockConflict => "LOCK_CONFLICT",
            LedgerError::InsufficientFunds => "INSUFFICIENT_FUNDS",
            LedgerError::DuplicateReference(_) => "DUPLICATE_REFERENCE",
            LedgerError::WalletExists(_) => "WALLET_EXISTS",
            LedgerError::WalletNotFound => "WALLET_NOT_FOUND",
            LedgerError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            LedgerError::Database(_) => "DATABASE_ERROR",
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::Database(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(LedgerError::LockConflict.code(), "LOCK_CONFLICT");
        assert_eq!(LedgerError::InsufficientFunds.code(), "INSUFFICIENT_FUNDS");
        assert_eq!(
            LedgerError::DuplicateReference("tx-1".into()).code(),
            "DUPLICATE_REFERENCE"
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(
            LedgerError::InsufficientFunds.to_string(),
            "Insufficient balance for this operation"
        );
    }
}
