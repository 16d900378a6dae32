//! Wallet Operations
//!
//! Fund, withdraw and airtime purchase, each following the same shape:
//! validate, pre-check, acquire the wallet lock, call the provider,
//! record a pending transaction. The lock is acquired exactly once per
//! operation and released on every error exit; for asynchronous flows
//! (funding, withdrawal, non-terminal airtime) it stays held until the
//! reconciler resolves the pending transaction.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::fanout::{Fanout, OutcomePayload};
use crate::gateway::{
    AirtimeOutcome, AirtimeProvider, AirtimeService, Bank, InitiatedPayment, PaymentGateway,
    PaymentRequest, ResolvedAccount, TransferRequest,
};
use crate::ledger::{
    BalanceUpdate, LedgerError, LedgerStore, NewTransaction, Transaction, TransactionKind,
    TransactionStatus, Wallet, WalletId, DEFAULT_CURRENCY,
};

use super::error::WalletError;

/// Money-moving operations over a wallet.
pub struct WalletService {
    ledger: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PaymentGateway>,
    airtime: Arc<dyn AirtimeProvider>,
    fanout: Fanout,
}

impl WalletService {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PaymentGateway>,
        airtime: Arc<dyn AirtimeProvider>,
        fanout: Fanout,
    ) -> Self {
        Self {
            ledger,
            gateway,
            airtime,
            fanout,
        }
    }

    /// Create the user's wallet. One wallet per user.
    pub async fn create_wallet(&self, user_id: i64) -> Result<Wallet, WalletError> {
        let wallet = self.ledger.create_wallet(user_id, DEFAULT_CURRENCY).await?;
        info!(user_id, wallet_id = %wallet.id, "Wallet created");
        Ok(wallet)
    }

    /// Current wallet snapshot for a user.
    pub async fn wallet(&self, user_id: i64) -> Result<Wallet, WalletError> {
        self.ledger
            .get_wallet_by_user(user_id)
            .await?
            .ok_or(WalletError::WalletNotFound)
    }

    /// Administrative on/off switch. An inactive wallet refuses all
    /// money-moving operations but still accepts reconciliations.
    pub async fn set_active(&self, user_id: i64, active: bool) -> Result<Wallet, WalletError> {
        let wallet = self.wallet(user_id).await?;
        Ok(self.ledger.set_wallet_active(wallet.id, active).await?)
    }

    /// Start a wallet funding: opens a hosted payment and records the
    /// pending transaction under the gateway reference. The wallet stays
    /// locked until the payment webhook resolves it.
    pub async fn fund(
        &self,
        user_id: i64,
        email: &str,
        amount: Decimal,
        currency: &str,
    ) -> Result<InitiatedPayment, WalletError> {
        if amount <= Decimal::ZERO {
            return Err(WalletError::InvalidAmount);
        }
        let wallet = self.wallet(user_id).await?;
        if !wallet.is_active {
            return Err(WalletError::WalletInactive);
        }

        let wallet = self.ledger.acquire_lock(wallet.id).await?;

        let initiated = match self
            .gateway
            .initiate_payment(PaymentRequest {
                user_id,
                email: email.to_string(),
                amount,
                currency: currency.to_string(),
            })
            .await
        {
            Ok(initiated) => initiated,
            Err(e) => {
                self.unlock_best_effort(wallet.id).await;
                return Err(e.into());
            }
        };

        let new = NewTransaction::pending(
            user_id,
            wallet.id,
            amount,
            currency,
            TransactionKind::Fund,
            &initiated.reference,
        );
        if let Err(e) = self.ledger.create_transaction(new).await {
            self.unlock_best_effort(wallet.id).await;
            return Err(e.into());
        }

        info!(user_id, reference = %initiated.reference, %amount, "Funding initiated");
        Ok(initiated)
    }

    /// Start a withdrawal to an external bank account.
    ///
    /// The insufficient-funds check happens before any external call and
    /// before locking, so a doomed request never takes the lock. The lock
    /// is acquired immediately before the transfer initiation.
    pub async fn withdraw(
        &self,
        user_id: i64,
        amount: Decimal,
        currency: &str,
        bank_code: &str,
        account_number: &str,
    ) -> Result<Transaction, WalletError> {
        if amount <= Decimal::ZERO {
            return Err(WalletError::InvalidAmount);
        }
        let wallet = self.wallet(user_id).await?;
        if !wallet.is_active {
            return Err(WalletError::WalletInactive);
        }
        if wallet.balance < amount {
            return Err(WalletError::InsufficientFunds);
        }

        let account = self
            .gateway
            .resolve_account(bank_code, account_number)
            .await?;

        let wallet = self.ledger.acquire_lock(wallet.id).await?;

        let initiated = match self
            .gateway
            .initiate_transfer(TransferRequest {
                user_id,
                amount,
                currency: currency.to_string(),
                bank_code: account.bank_code.clone(),
                account_number: account.account_number.clone(),
            })
            .await
        {
            Ok(initiated) => initiated,
            Err(e) => {
                self.unlock_best_effort(wallet.id).await;
                return Err(e.into());
            }
        };

        let new = NewTransaction::pending(
            user_id,
            wallet.id,
            amount,
            currency,
            TransactionKind::Withdraw,
            &initiated.reference,
        );
        let tx = match self.ledger.create_transaction(new).await {
            Ok(tx) => tx,
            Err(e) => {
                self.unlock_best_effort(wallet.id).await;
                return Err(e.into());
            }
        };

        info!(
            user_id,
            reference = %tx.reference,
            %amount,
            account_name = %account.account_name,
            "Withdrawal initiated"
        );
        Ok(tx)
    }

    /// Buy airtime. The provider can settle synchronously: a terminal
    /// success debits the wallet and releases the lock in one resolve; a
    /// non-terminal outcome leaves a pending transaction with the lock
    /// held for the reconciler.
    pub async fn purchase_airtime(
        &self,
        user_id: i64,
        service_id: &str,
        amount: Decimal,
        phone_number: &str,
    ) -> Result<Transaction, WalletError> {
        if amount <= Decimal::ZERO {
            return Err(WalletError::InvalidAmount);
        }

        let services = self.airtime.list_services().await?;
        let service = services
            .iter()
            .find(|s| s.service_id == service_id)
            .ok_or_else(|| {
                WalletError::AirtimeRejected(format!("Unknown service: {}", service_id))
            })?;
        if amount < service.minimum_amount || amount > service.maximum_amount {
            return Err(WalletError::InvalidAmount);
        }

        let wallet = self.wallet(user_id).await?;
        if !wallet.is_active {
            return Err(WalletError::WalletInactive);
        }
        if wallet.balance < amount {
            return Err(WalletError::InsufficientFunds);
        }

        let wallet = self.ledger.acquire_lock(wallet.id).await?;

        let purchase = match self
            .airtime
            .buy_airtime(user_id, service_id, amount, phone_number)
            .await
        {
            Ok(purchase) => purchase,
            Err(e) => {
                self.unlock_best_effort(wallet.id).await;
                return Err(e.into());
            }
        };

        match purchase.outcome {
            AirtimeOutcome::Success => {
                self.settle_airtime_success(user_id, wallet.id, amount, &purchase.request_id, &purchase.message)
                    .await
            }
            AirtimeOutcome::Pending | AirtimeOutcome::Requery => {
                let new = NewTransaction::pending(
                    user_id,
                    wallet.id,
                    amount,
                    DEFAULT_CURRENCY,
                    TransactionKind::AirtimePurchase,
                    &purchase.request_id,
                );
                let tx = match self.ledger.create_transaction(new).await {
                    Ok(tx) => tx,
                    Err(e) => {
                        self.unlock_best_effort(wallet.id).await;
                        return Err(e.into());
                    }
                };
                info!(user_id, reference = %tx.reference, "Airtime purchase pending");
                Ok(tx)
            }
            AirtimeOutcome::Failed(msg) | AirtimeOutcome::Error(msg) => {
                let new = NewTransaction::pending(
                    user_id,
                    wallet.id,
                    amount,
                    DEFAULT_CURRENCY,
                    TransactionKind::AirtimePurchase,
                    &purchase.request_id,
                )
                .with_status(TransactionStatus::Failed);
                let tx = match self.ledger.create_transaction(new).await {
                    Ok(tx) => tx,
                    Err(e) => {
                        self.unlock_best_effort(wallet.id).await;
                        return Err(e.into());
                    }
                };
                self.unlock_best_effort(wallet.id).await;
                self.fanout.publish(
                    &tx.reference,
                    OutcomePayload {
                        status: "failed".to_string(),
                        message: msg.clone(),
                        tx_ref: tx.reference.clone(),
                        user_id,
                        amount,
                        currency: tx.currency.clone(),
                    },
                );
                warn!(user_id, reference = %tx.reference, %msg, "Airtime purchase failed");
                Err(WalletError::AirtimeRejected(msg))
            }
        }
    }

    /// Terminal provider success: record, then debit + mark success +
    /// unlock as one atomic resolve.
    async fn settle_airtime_success(
        &self,
        user_id: i64,
        wallet_id: WalletId,
        amount: Decimal,
        reference: &str,
        message: &str,
    ) -> Result<Transaction, WalletError> {
        let new = NewTransaction::pending(
            user_id,
            wallet_id,
            amount,
            DEFAULT_CURRENCY,
            TransactionKind::AirtimePurchase,
            reference,
        );
        if let Err(e) = self.ledger.create_transaction(new).await {
            self.unlock_best_effort(wallet_id).await;
            return Err(e.into());
        }

        match self
            .ledger
            .resolve_success(reference, amount, BalanceUpdate::Subtract)
            .await
        {
            Ok(resolution) => {
                let tx = resolution.transaction().clone();
                self.fanout.publish(
                    &tx.reference,
                    OutcomePayload {
                        status: "success".to_string(),
                        message: message.to_string(),
                        tx_ref: tx.reference.clone(),
                        user_id,
                        amount,
                        currency: tx.currency.clone(),
                    },
                );
                info!(user_id, reference = %tx.reference, %amount, "Airtime purchase settled");
                Ok(tx)
            }
            Err(LedgerError::InsufficientFunds) => {
                // Balance moved between the pre-check and the resolve.
                if let Err(e) = self.ledger.resolve_failure(reference).await {
                    warn!(reference, error = %e, "Failed to fail drained airtime purchase");
                    self.unlock_best_effort(wallet_id).await;
                }
                Err(WalletError::InsufficientFunds)
            }
            Err(e) => {
                self.unlock_best_effort(wallet_id).await;
                Err(e.into())
            }
        }
    }

    /// Banks supported for withdrawals.
    pub async fn banks(&self) -> Result<Vec<Bank>, WalletError> {
        Ok(self.gateway.list_banks().await?)
    }

    /// Resolve a destination account before withdrawing to it.
    pub async fn resolve_account(
        &self,
        bank_code: &str,
        account_number: &str,
    ) -> Result<ResolvedAccount, WalletError> {
        Ok(self.gateway.resolve_account(bank_code, account_number).await?)
    }

    /// Airtime services available for purchase.
    pub async fn airtime_services(&self) -> Result<Vec<AirtimeService>, WalletError> {
        Ok(self.airtime.list_services().await?)
    }

    async fn unlock_best_effort(&self, wallet_id: WalletId) {
        if let Err(e) = self.ledger.release_lock(wallet_id).await {
            warn!(%wallet_id, error = %e, "Failed to release wallet lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayError, MockAirtime, MockGateway};
    use crate::ledger::MemoryLedger;
    use rust_decimal_macros::dec;

    struct Fixture {
        service: WalletService,
        ledger: Arc<MemoryLedger>,
        gateway: Arc<MockGateway>,
        airtime: Arc<MockAirtime>,
        fanout: Fanout,
    }

    async fn fixture_with_balance(user_id: i64, balance: Decimal) -> Fixture {
        let ledger = Arc::new(MemoryLedger::new());
        let gateway = Arc::new(MockGateway::new());
        let airtime = Arc::new(MockAirtime::new());
        let fanout = Fanout::new();
        let service = WalletService::new(
            ledger.clone(),
            gateway.clone(),
            airtime.clone(),
            fanout.clone(),
        );

        let wallet = service.create_wallet(user_id).await.unwrap();
        if balance > Decimal::ZERO {
            ledger
                .update_balance(wallet.id, balance, BalanceUpdate::Add)
                .await
                .unwrap();
        }
        Fixture {
            service,
            ledger,
            gateway,
            airtime,
            fanout,
        }
    }

    #[tokio::test]
    async fn test_fund_creates_pending_and_holds_lock() {
        let f = fixture_with_balance(1, Decimal::ZERO).await;

        let initiated = f
            .service
            .fund(1, "a@b.c", dec!(500), DEFAULT_CURRENCY)
            .await
            .unwrap();

        let wallet = f.service.wallet(1).await.unwrap();
        assert!(wallet.is_locked);
        let tx = f
            .ledger
            .get_transaction_by_reference(&initiated.reference)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.kind, TransactionKind::Fund);
    }

    #[tokio::test]
    async fn test_fund_gateway_outage_releases_lock() {
        let f = fixture_with_balance(1, Decimal::ZERO).await;
        f.gateway.fail_next_payment().await;

        let err = f
            .service
            .fund(1, "a@b.c", dec!(500), DEFAULT_CURRENCY)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "GATEWAY_UNAVAILABLE");

        let wallet = f.service.wallet(1).await.unwrap();
        assert!(!wallet.is_locked);
    }

    #[tokio::test]
    async fn test_fund_rejects_locked_wallet() {
        let f = fixture_with_balance(1, Decimal::ZERO).await;
        let wallet = f.service.wallet(1).await.unwrap();
        f.ledger.acquire_lock(wallet.id).await.unwrap();

        let err = f
            .service
            .fund(1, "a@b.c", dec!(500), DEFAULT_CURRENCY)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "LOCK_CONFLICT");
    }

    #[tokio::test]
    async fn test_fund_rejects_inactive_wallet() {
        let f = fixture_with_balance(1, Decimal::ZERO).await;
        f.service.set_active(1, false).await.unwrap();

        let err = f
            .service
            .fund(1, "a@b.c", dec!(500), DEFAULT_CURRENCY)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "WALLET_INACTIVE");
    }

    #[tokio::test]
    async fn test_withdraw_insufficient_rejected_before_lock_or_gateway() {
        let f = fixture_with_balance(1, dec!(100)).await;

        let err = f
            .service
            .withdraw(1, dec!(500), DEFAULT_CURRENCY, "044", "0123456789")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_FUNDS");

        // No lock taken, no gateway call made, no transaction recorded.
        let wallet = f.service.wallet(1).await.unwrap();
        assert!(!wallet.is_locked);
        assert!(f.gateway.transfer_calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_withdraw_creates_pending_with_lock_held() {
        let f = fixture_with_balance(1, dec!(1000)).await;

        let tx = f
            .service
            .withdraw(1, dec!(400), DEFAULT_CURRENCY, "044", "0123456789")
            .await
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.kind, TransactionKind::Withdraw);

        // Balance untouched until the webhook confirms.
        let wallet = f.service.wallet(1).await.unwrap();
        assert_eq!(wallet.balance, dec!(1000));
        assert!(wallet.is_locked);
    }

    #[tokio::test]
    async fn test_airtime_success_settles_synchronously() {
        let f = fixture_with_balance(1, dec!(1000)).await;

        let tx = f
            .service
            .purchase_airtime(1, "mtn", dec!(200), "08011111111")
            .await
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Success);

        let wallet = f.service.wallet(1).await.unwrap();
        assert_eq!(wallet.balance, dec!(800));
        assert!(!wallet.is_locked);
    }

    #[tokio::test]
    async fn test_airtime_failure_records_failed_and_unlocks() {
        let f = fixture_with_balance(1, dec!(1000)).await;
        f.airtime
            .push_outcome(AirtimeOutcome::Failed("no network".to_string()))
            .await;

        let err = f
            .service
            .purchase_airtime(1, "mtn", dec!(200), "08011111111")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "AIRTIME_REJECTED");

        let wallet = f.service.wallet(1).await.unwrap();
        assert_eq!(wallet.balance, dec!(1000));
        assert!(!wallet.is_locked);
    }

    #[tokio::test]
    async fn test_airtime_failure_publishes_failed_outcome() {
        let f = fixture_with_balance(1, dec!(1000)).await;
        f.airtime
            .push_outcome(AirtimeOutcome::Error("bad response".to_string()))
            .await;

        let mut outcomes = f.fanout.subscribe();
        let err = f
            .service
            .purchase_airtime(1, "mtn", dec!(200), "08011111111")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "AIRTIME_REJECTED");

        let event = outcomes.try_recv().unwrap();
        assert_eq!(event.payload.status, "failed");
        assert_eq!(event.payload.message, "bad response");
        assert_eq!(event.payload.user_id, 1);
    }

    #[tokio::test]
    async fn test_airtime_pending_keeps_lock() {
        let f = fixture_with_balance(1, dec!(1000)).await;
        f.airtime.push_outcome(AirtimeOutcome::Pending).await;

        let tx = f
            .service
            .purchase_airtime(1, "mtn", dec!(200), "08011111111")
            .await
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);

        let wallet = f.service.wallet(1).await.unwrap();
        assert!(wallet.is_locked);
        assert_eq!(wallet.balance, dec!(1000));
    }

    #[tokio::test]
    async fn test_airtime_unknown_service_rejected() {
        let f = fixture_with_balance(1, dec!(1000)).await;

        let err = f
            .service
            .purchase_airtime(1, "not-a-telco", dec!(200), "08011111111")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "AIRTIME_REJECTED");
    }

    #[tokio::test]
    async fn test_invalid_amounts_rejected() {
        let f = fixture_with_balance(1, dec!(1000)).await;

        let err = f
            .service
            .fund(1, "a@b.c", dec!(0), DEFAULT_CURRENCY)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_AMOUNT");

        // Below the service minimum.
        let err = f
            .service
            .purchase_airtime(1, "mtn", dec!(10), "08011111111")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_AMOUNT");
    }

    #[tokio::test]
    async fn test_wallet_not_found() {
        let f = fixture_with_balance(1, Decimal::ZERO).await;
        let err = f.service.wallet(999).await.unwrap_err();
        assert_eq!(err.code(), "WALLET_NOT_FOUND");
        let _ = f;
    }

    #[tokio::test]
    async fn test_resolve_account_surfaces_gateway_error() {
        let ledger = Arc::new(MemoryLedger::new());
        let gateway = Arc::new(MockGateway::new());
        let airtime = Arc::new(MockAirtime::new());
        let service =
            WalletService::new(ledger, gateway.clone(), airtime, Fanout::new());

        // The mock resolves any account; a real rejection maps through
        // the gateway error conversion.
        let resolved = service.resolve_account("044", "0123456789").await.unwrap();
        assert_eq!(resolved.bank_code, "044");
        let err: WalletError = GatewayError::Rejected("unknown account".into()).into();
        assert_eq!(err.code(), "GATEWAY_UNAVAILABLE");
    }
}
