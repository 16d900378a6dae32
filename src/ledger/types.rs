//! Ledger Core Types
//!
//! Wallet and Transaction records plus the tags that govern their lifecycle.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default wallet currency. Wallets are single-currency in this design.
pub const DEFAULT_CURRENCY: &str = "NGN";

/// Wallet identifier (UUID v4, assigned at creation)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WalletId(Uuid);

impl WalletId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for WalletId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WalletId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

impl From<Uuid> for WalletId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Transaction identifier (UUID v4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransactionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

impl From<Uuid> for TransactionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Per-user stored balance record, the unit of locking and mutation.
///
/// `is_locked` is a durable cooperative mutex flag: it must survive process
/// restarts because the unlocking event (a provider webhook) may be handled
/// by a different process than the one that set it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub user_id: i64,
    pub balance: Decimal,
    pub currency: String,
    pub is_locked: bool,
    pub is_active: bool,
}

impl Wallet {
    /// Create a fresh wallet: zero balance, unlocked, active.
    pub fn new(user_id: i64, currency: &str) -> Self {
        Self {
            id: WalletId::new(),
            user_id,
            balance: Decimal::ZERO,
            currency: currency.to_string(),
            is_locked: false,
            is_active: true,
        }
    }
}

impl fmt::Display for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Wallet[{}] user={} balance={} {} locked={} active={}",
            self.id, self.user_id, self.balance, self.currency, self.is_locked, self.is_active
        )
    }
}

/// Kind of money-moving intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Fund,
    Withdraw,
    AirtimePurchase,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Fund => "fund",
            TransactionKind::Withdraw => "withdraw",
            TransactionKind::AirtimePurchase => "airtime_purchase",
        }
    }

    /// Direction of the wallet mutation when this transaction resolves
    /// successfully: funding credits the wallet, everything else debits it.
    pub fn balance_update(&self) -> BalanceUpdate {
        match self {
            TransactionKind::Fund => BalanceUpdate::Add,
            TransactionKind::Withdraw | TransactionKind::AirtimePurchase => {
                BalanceUpdate::Subtract
            }
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fund" => Ok(TransactionKind::Fund),
            "withdraw" => Ok(TransactionKind::Withdraw),
            "airtime_purchase" => Ok(TransactionKind::AirtimePurchase),
            _ => Err(format!("Invalid transaction kind: {}", s)),
        }
    }
}

/// Transaction lifecycle status: pending -> success | failed.
///
/// Terminal states never transition again; the reconciler treats a repeated
/// delivery against a terminal transaction as a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Success | TransactionStatus::Failed)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "success" => Ok(TransactionStatus::Success),
            "failed" => Ok(TransactionStatus::Failed),
            _ => Err(format!("Invalid transaction status: {}", s)),
        }
    }
}

/// Direction of a balance mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceUpdate {
    Add,
    Subtract,
}

/// Auditable record of one money-moving intent and its eventual outcome.
///
/// Created in `Pending` before the external call's result is known; mutated
/// exactly once (to a terminal status) by the reconciliation path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: i64,
    pub wallet_id: WalletId,
    pub amount: Decimal,
    pub currency: String,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    /// Idempotency key correlating this record with provider events.
    /// Unique across all transactions.
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transaction[{}] {} {} {} user={} status={} ref={}",
            self.id, self.kind, self.amount, self.currency, self.user_id, self.status,
            self.reference
        )
    }
}

/// Parameters for creating a pending transaction record
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: i64,
    pub wallet_id: WalletId,
    pub amount: Decimal,
    pub currency: String,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub reference: String,
}

impl NewTransaction {
    /// Pending record for an initiated operation (the common case).
    pub fn pending(
        user_id: i64,
        wallet_id: WalletId,
        amount: Decimal,
        currency: &str,
        kind: TransactionKind,
        reference: &str,
    ) -> Self {
        Self {
            user_id,
            wallet_id,
            amount,
            currency: currency.to_string(),
            kind,
            status: TransactionStatus::Pending,
            reference: reference.to_string(),
        }
    }

    /// Same record with a different initial status (airtime purchases can
    /// settle synchronously).
    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = status;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip() {
        for kind in [
            TransactionKind::Fund,
            TransactionKind::Withdraw,
            TransactionKind::AirtimePurchase,
        ] {
            assert_eq!(kind.as_str().parse::<TransactionKind>(), Ok(kind));
        }
        assert!("refund".parse::<TransactionKind>().is_err());
    }

    #[test]
    fn test_status_terminal() {
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(TransactionStatus::Success.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
    }

    #[test]
    fn test_kind_balance_direction() {
        assert_eq!(TransactionKind::Fund.balance_update(), BalanceUpdate::Add);
        assert_eq!(
            TransactionKind::Withdraw.balance_update(),
            BalanceUpdate::Subtract
        );
        assert_eq!(
            TransactionKind::AirtimePurchase.balance_update(),
            BalanceUpdate::Subtract
        );
    }

    #[test]
    fn test_wallet_defaults() {
        let wallet = Wallet::new(1001, DEFAULT_CURRENCY);
        assert_eq!(wallet.balance, Decimal::ZERO);
        assert_eq!(wallet.currency, "NGN");
        assert!(!wallet.is_locked);
        assert!(wallet.is_active);
    }

    #[test]
    fn test_id_display_parse() {
        let id = WalletId::new();
        let parsed: WalletId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
