//! Ledger Store contract
//!
//! The single seam between the money-moving operations / reconciler and
//! durable storage. Implementations must make `acquire_lock` a single atomic
//! conditional update (never read-then-write) and must apply a resolution's
//! status change, balance mutation, and lock release as one atomic unit.

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::error::LedgerError;
use super::types::{BalanceUpdate, NewTransaction, Transaction, Wallet, WalletId};

/// Outcome of a resolve call.
///
/// `AlreadyTerminal` is the idempotence signal: the status compare-and-set
/// found a terminal row, so no state was touched and the caller must not
/// publish a second outcome.
#[derive(Debug, Clone)]
pub enum Resolution {
    Applied(Transaction),
    AlreadyTerminal(Transaction),
}

impl Resolution {
    #[inline]
    pub fn is_applied(&self) -> bool {
        matches!(self, Resolution::Applied(_))
    }

    pub fn transaction(&self) -> &Transaction {
        match self {
            Resolution::Applied(tx) | Resolution::AlreadyTerminal(tx) => tx,
        }
    }
}

/// Durable storage for wallets and transactions.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Create a wallet for a user. Exactly one wallet per user; a second
    /// create fails with `WalletExists`.
    async fn create_wallet(&self, user_id: i64, currency: &str) -> Result<Wallet, LedgerError>;

    async fn get_wallet(&self, wallet_id: WalletId) -> Result<Option<Wallet>, LedgerError>;

    async fn get_wallet_by_user(&self, user_id: i64) -> Result<Option<Wallet>, LedgerError>;

    /// Acquire the wallet's cooperative lock.
    ///
    /// Fails with `LockConflict` if already held. Returns the wallet snapshot
    /// taken by the same atomic update that set the flag.
    async fn acquire_lock(&self, wallet_id: WalletId) -> Result<Wallet, LedgerError>;

    /// Release the wallet's lock unconditionally.
    async fn release_lock(&self, wallet_id: WalletId) -> Result<Wallet, LedgerError>;

    /// Administrative on/off switch, independent of locking.
    async fn set_wallet_active(
        &self,
        wallet_id: WalletId,
        active: bool,
    ) -> Result<Wallet, LedgerError>;

    /// Guarded balance mutation: rejects (never clamps) a subtraction that
    /// would drive the balance negative.
    async fn update_balance(
        &self,
        wallet_id: WalletId,
        amount: Decimal,
        mode: BalanceUpdate,
    ) -> Result<Wallet, LedgerError>;

    /// Create a transaction record. A duplicate `reference` fails with
    /// `DuplicateReference` rather than overwriting.
    async fn create_transaction(&self, new: NewTransaction) -> Result<Transaction, LedgerError>;

    async fn get_transaction_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Transaction>, LedgerError>;

    /// Resolve a pending transaction to `success`: status CAS, balance
    /// mutation by `verified_amount` in direction `mode`, and lock release,
    /// applied as one atomic unit.
    async fn resolve_success(
        &self,
        reference: &str,
        verified_amount: Decimal,
        mode: BalanceUpdate,
    ) -> Result<Resolution, LedgerError>;

    /// Resolve a pending transaction to `failed`: status CAS and lock
    /// release in one atomic unit, no balance mutation.
    async fn resolve_failure(&self, reference: &str) -> Result<Resolution, LedgerError>;
}
