//! In-memory ledger store
//!
//! Same observable semantics as the Postgres store behind a single async
//! mutex, so every contract method is trivially one atomic unit. Used by the
//! scenario tests and for wiring the engine without external services.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use super::error::LedgerError;
use super::store::{LedgerStore, Resolution};
use super::types::{
    BalanceUpdate, NewTransaction, Transaction, TransactionId, TransactionStatus, Wallet, WalletId,
};

#[derive(Default)]
struct State {
    wallets: HashMap<WalletId, Wallet>,
    wallet_by_user: HashMap<i64, WalletId>,
    /// Keyed by reference (the uniqueness constraint).
    transactions: HashMap<String, Transaction>,
}

impl State {
    fn wallet_mut(&mut self, wallet_id: WalletId) -> Result<&mut Wallet, LedgerError> {
        self.wallets
            .get_mut(&wallet_id)
            .ok_or(LedgerError::WalletNotFound)
    }

    fn apply_balance(
        wallet: &mut Wallet,
        amount: Decimal,
        mode: BalanceUpdate,
    ) -> Result<(), LedgerError> {
        let new_balance = match mode {
            BalanceUpdate::Add => wallet.balance + amount,
            BalanceUpdate::Subtract => wallet.balance - amount,
        };
        if new_balance < Decimal::ZERO {
            return Err(LedgerError::InsufficientFunds);
        }
        wallet.balance = new_balance;
        Ok(())
    }
}

/// Mutex-backed [`LedgerStore`] implementation.
pub struct MemoryLedger {
    state: Mutex<State>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn create_wallet(&self, user_id: i64, currency: &str) -> Result<Wallet, LedgerError> {
        let mut state = self.state.lock().await;
        if state.wallet_by_user.contains_key(&user_id) {
            return Err(LedgerError::WalletExists(user_id));
        }
        let wallet = Wallet::new(user_id, currency);
        state.wallet_by_user.insert(user_id, wallet.id);
        state.wallets.insert(wallet.id, wallet.clone());
        Ok(wallet)
    }

    async fn get_wallet(&self, wallet_id: WalletId) -> Result<Option<Wallet>, LedgerError> {
        let state = self.state.lock().await;
        Ok(state.wallets.get(&wallet_id).cloned())
    }

    async fn get_wallet_by_user(&self, user_id: i64) -> Result<Option<Wallet>, LedgerError> {
        let state = self.state.lock().await;
        Ok(state
            .wallet_by_user
            .get(&user_id)
            .and_then(|id| state.wallets.get(id))
            .cloned())
    }

    async fn acquire_lock(&self, wallet_id: WalletId) -> Result<Wallet, LedgerError> {
        let mut state = self.state.lock().await;
        let wallet = state.wallet_mut(wallet_id)?;
        if wallet.is_locked {
            return Err(LedgerError::LockConflict);
        }
        wallet.is_locked = true;
        Ok(wallet.clone())
    }

    async fn release_lock(&self, wallet_id: WalletId) -> Result<Wallet, LedgerError> {
        let mut state = self.state.lock().await;
        let wallet = state.wallet_mut(wallet_id)?;
        wallet.is_locked = false;
        Ok(wallet.clone())
    }

    async fn set_wallet_active(
        &self,
        wallet_id: WalletId,
        active: bool,
    ) -> Result<Wallet, LedgerError> {
        let mut state = self.state.lock().await;
        let wallet = state.wallet_mut(wallet_id)?;
        wallet.is_active = active;
        Ok(wallet.clone())
    }

    async fn update_balance(
        &self,
        wallet_id: WalletId,
        amount: Decimal,
        mode: BalanceUpdate,
    ) -> Result<Wallet, LedgerError> {
        let mut state = self.state.lock().await;
        let wallet = state.wallet_mut(wallet_id)?;
        State::apply_balance(wallet, amount, mode)?;
        Ok(wallet.clone())
    }

    async fn create_transaction(&self, new: NewTransaction) -> Result<Transaction, LedgerError> {
        let mut state = self.state.lock().await;
        if state.transactions.contains_key(&new.reference) {
            return Err(LedgerError::DuplicateReference(new.reference));
        }
        if !state.wallets.contains_key(&new.wallet_id) {
            return Err(LedgerError::WalletNotFound);
        }
        let tx = Transaction {
            id: TransactionId::new(),
            user_id: new.user_id,
            wallet_id: new.wallet_id,
            amount: new.amount,
            currency: new.currency,
            kind: new.kind,
            status: new.status,
            reference: new.reference.clone(),
            created_at: Utc::now(),
        };
        state.transactions.insert(new.reference, tx.clone());
        Ok(tx)
    }

    async fn get_transaction_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Transaction>, LedgerError> {
        let state = self.state.lock().await;
        Ok(state.transactions.get(reference).cloned())
    }

    async fn resolve_success(
        &self,
        reference: &str,
        verified_amount: Decimal,
        mode: BalanceUpdate,
    ) -> Result<Resolution, LedgerError> {
        let mut state = self.state.lock().await;
        let tx = state
            .transactions
            .get(reference)
            .cloned()
            .ok_or_else(|| LedgerError::TransactionNotFound(reference.to_string()))?;

        if tx.status.is_terminal() {
            return Ok(Resolution::AlreadyTerminal(tx));
        }

        // Balance mutation first: if it is rejected the whole unit aborts and
        // the transaction stays pending with the lock still held.
        let wallet = state.wallet_mut(tx.wallet_id)?;
        State::apply_balance(wallet, verified_amount, mode)?;
        wallet.is_locked = false;

        let tx = state
            .transactions
            .get_mut(reference)
            .ok_or_else(|| LedgerError::TransactionNotFound(reference.to_string()))?;
        tx.status = TransactionStatus::Success;
        Ok(Resolution::Applied(tx.clone()))
    }

    async fn resolve_failure(&self, reference: &str) -> Result<Resolution, LedgerError> {
        let mut state = self.state.lock().await;
        let tx = state
            .transactions
            .get(reference)
            .cloned()
            .ok_or_else(|| LedgerError::TransactionNotFound(reference.to_string()))?;

        if tx.status.is_terminal() {
            return Ok(Resolution::AlreadyTerminal(tx));
        }

        let wallet_id = tx.wallet_id;
        state.wallet_mut(wallet_id)?.is_locked = false;

        let tx = state
            .transactions
            .get_mut(reference)
            .ok_or_else(|| LedgerError::TransactionNotFound(reference.to_string()))?;
        tx.status = TransactionStatus::Failed;
        Ok(Resolution::Applied(tx.clone()))
    }
}
