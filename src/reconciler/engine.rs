//! Reconciliation Engine
//!
//! Resolves inbound provider notifications against pending transactions.
//! Deliveries are at-least-once and unordered, so every decision leans on
//! the store's atomic resolve primitives: a terminal transaction makes
//! any further delivery a no-op, and amounts are re-verified against the
//! provider before a balance is ever credited.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{info, warn};

use crate::fanout::{Fanout, OutcomePayload};
use crate::gateway::PaymentGateway;
use crate::ledger::{LedgerError, LedgerStore, Resolution, Transaction, TransactionKind};
use crate::wallet::WalletError;

use super::event::{EventParseError, PaymentEvent, ProviderEvent, TransferEvent};

/// Result of processing one delivery.
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    /// A resolution was applied: the transaction reached a terminal state
    /// and exactly one outcome was published.
    Applied(Transaction),
    /// The transaction was already terminal; nothing was touched and
    /// nothing was published.
    Skipped(Transaction),
    /// No transaction matches the reference. Any lock held by the named
    /// user's wallet was defensively released.
    NotFound(String),
    /// Unsupported event kind; no state action.
    Ignored(String),
    /// The event was rejected (validation, signature, verification
    /// mismatch). The reason says whether a failure resolution was applied.
    Rejected(String),
}

impl ReconcileOutcome {
    /// Short tag for logs.
    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Applied(_) => "applied",
            ReconcileOutcome::Skipped(_) => "skipped",
            ReconcileOutcome::NotFound(_) => "not_found",
            ReconcileOutcome::Ignored(_) => "ignored",
            ReconcileOutcome::Rejected(_) => "rejected",
        }
    }
}

/// Webhook reconciler.
pub struct Reconciler {
    ledger: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PaymentGateway>,
    fanout: Fanout,
    webhook_secret: String,
}

impl Reconciler {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PaymentGateway>,
        fanout: Fanout,
        webhook_secret: &str,
    ) -> Self {
        Self {
            ledger,
            gateway,
            fanout,
            webhook_secret: webhook_secret.to_string(),
        }
    }

    /// Process one raw delivery end to end.
    pub async fn process(&self, raw: &Value) -> ReconcileOutcome {
        let event = match ProviderEvent::parse(raw, &self.webhook_secret) {
            Ok(event) => event,
            Err(EventParseError::UnsupportedKind) => {
                return ReconcileOutcome::Ignored("unsupported event kind".to_string());
            }
            Err(e) => {
                warn!(error = %e, "Notification rejected");
                return ReconcileOutcome::Rejected(e.to_string());
            }
        };

        let reference = event.reference().to_string();
        let tx = match self.ledger.get_transaction_by_reference(&reference).await {
            Ok(Some(tx)) => tx,
            Ok(None) => {
                self.defensive_unlock(event.user_id()).await;
                warn!(reference, "Notification for unknown transaction");
                return ReconcileOutcome::NotFound(reference);
            }
            Err(e) => {
                warn!(reference, error = %e, "Transaction lookup failed");
                return ReconcileOutcome::Rejected(e.to_string());
            }
        };

        if tx.status.is_terminal() {
            info!(reference, status = %tx.status, "Duplicate delivery skipped");
            return ReconcileOutcome::Skipped(tx);
        }

        if !event.is_success() {
            return self
                .apply_failure(&tx, &failure_message(tx.kind))
                .await;
        }

        match event {
            ProviderEvent::Payment(payment) => self.reconcile_payment(&tx, &payment).await,
            ProviderEvent::Transfer(transfer) => self.reconcile_transfer(&tx, &transfer).await,
        }
    }

    /// Payment success path: never trust the webhook amount. Re-verify
    /// against the provider and apply the verified amount, accepting it
    /// only when it covers the recorded amount in the recorded currency.
    async fn reconcile_payment(
        &self,
        tx: &Transaction,
        payment: &PaymentEvent,
    ) -> ReconcileOutcome {
        let verified = match self
            .gateway
            .verify_transaction(&payment.provider_transaction_id)
            .await
        {
            Ok(verified) => verified,
            Err(e) if e.is_retryable() => {
                // Transient: leave the transaction pending for redelivery.
                warn!(reference = %tx.reference, error = %e, "Verification unavailable");
                return ReconcileOutcome::Rejected(format!("verification unavailable: {}", e));
            }
            Err(e) => {
                warn!(reference = %tx.reference, error = %e, "Verification failed");
                let outcome = self.apply_failure(tx, "Payment failed or cancelled.").await;
                return match outcome {
                    ReconcileOutcome::Applied(_) => {
                        ReconcileOutcome::Rejected(format!("verification failed: {}", e))
                    }
                    other => other,
                };
            }
        };

        let accepted = verified.status.is_successful()
            && verified.amount >= tx.amount
            && verified.currency == tx.currency;
        if !accepted {
            warn!(
                reference = %tx.reference,
                recorded = %tx.amount,
                verified = %verified.amount,
                verified_status = ?verified.status,
                "Verification mismatch"
            );
            let reason = WalletError::ReconciliationMismatch(format!(
                "recorded {} {}, verified {} {}",
                tx.amount, tx.currency, verified.amount, verified.currency
            ));
            let outcome = self.apply_failure(tx, "Payment failed or cancelled.").await;
            return match outcome {
                ReconcileOutcome::Applied(_) => ReconcileOutcome::Rejected(reason.to_string()),
                other => other,
            };
        }

        self.apply_success(tx, verified.amount).await
    }

    /// Transfer success path: the event itself carries amount and
    /// currency; both must match the recorded transaction.
    async fn reconcile_transfer(
        &self,
        tx: &Transaction,
        transfer: &TransferEvent,
    ) -> ReconcileOutcome {
        if transfer.amount != tx.amount || transfer.currency != tx.currency {
            warn!(
                reference = %tx.reference,
                recorded = %tx.amount,
                reported = %transfer.amount,
                "Transfer amount mismatch"
            );
            let reason = WalletError::ReconciliationMismatch(format!(
                "recorded {} {}, reported {} {}",
                tx.amount, tx.currency, transfer.amount, transfer.currency
            ));
            let outcome = self.apply_failure(tx, "Transfer failed or cancelled.").await;
            return match outcome {
                ReconcileOutcome::Applied(_) => ReconcileOutcome::Rejected(reason.to_string()),
                other => other,
            };
        }
        self.apply_success(tx, tx.amount).await
    }

    /// Atomic success resolution: status CAS + balance mutation in the
    /// kind's direction + lock release. Publishes exactly one outcome.
    async fn apply_success(&self, tx: &Transaction, amount: Decimal) -> ReconcileOutcome {
        let mode = tx.kind.balance_update();
        match self.ledger.resolve_success(&tx.reference, amount, mode).await {
            Ok(Resolution::Applied(resolved)) => {
                self.publish(&resolved, "success", &success_message(resolved.kind), amount);
                info!(reference = %resolved.reference, %amount, "Resolution applied");
                ReconcileOutcome::Applied(resolved)
            }
            Ok(Resolution::AlreadyTerminal(resolved)) => {
                // Lost the race against a concurrent duplicate.
                ReconcileOutcome::Skipped(resolved)
            }
            Err(LedgerError::InsufficientFunds) => {
                // A debit the wallet cannot cover is failed, never clamped.
                warn!(reference = %tx.reference, "Resolution debit exceeds balance");
                let outcome = self.apply_failure(tx, &failure_message(tx.kind)).await;
                match outcome {
                    ReconcileOutcome::Applied(_) => {
                        ReconcileOutcome::Rejected("insufficient funds at resolution".to_string())
                    }
                    other => other,
                }
            }
            Err(e) => {
                warn!(reference = %tx.reference, error = %e, "Resolution failed");
                ReconcileOutcome::Rejected(e.to_string())
            }
        }
    }

    /// Atomic failure resolution: status CAS + lock release, no balance
    /// mutation. Publishes exactly one "failed" outcome.
    async fn apply_failure(&self, tx: &Transaction, message: &str) -> ReconcileOutcome {
        match self.ledger.resolve_failure(&tx.reference).await {
            Ok(Resolution::Applied(resolved)) => {
                self.publish(&resolved, "failed", message, resolved.amount);
                info!(reference = %resolved.reference, "Failure resolution applied");
                ReconcileOutcome::Applied(resolved)
            }
            Ok(Resolution::AlreadyTerminal(resolved)) => ReconcileOutcome::Skipped(resolved),
            Err(e) => {
                warn!(reference = %tx.reference, error = %e, "Failure resolution failed");
                ReconcileOutcome::Rejected(e.to_string())
            }
        }
    }

    fn publish(&self, tx: &Transaction, status: &str, message: &str, amount: Decimal) {
        self.fanout.publish(
            &tx.reference,
            OutcomePayload {
                status: status.to_string(),
                message: message.to_string(),
                tx_ref: tx.reference.clone(),
                user_id: tx.user_id,
                amount,
                currency: tx.currency.clone(),
            },
        );
    }

    /// A notification for an unknown reference may still name a wallet
    /// left locked by a crashed operation; release it if held.
    async fn defensive_unlock(&self, user_id: i64) {
        match self.ledger.get_wallet_by_user(user_id).await {
            Ok(Some(wallet)) if wallet.is_locked => {
                if let Err(e) = self.ledger.release_lock(wallet.id).await {
                    warn!(user_id, error = %e, "Defensive unlock failed");
                } else {
                    info!(user_id, wallet_id = %wallet.id, "Defensive unlock");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(user_id, error = %e, "Defensive unlock lookup failed"),
        }
    }
}

fn success_message(kind: TransactionKind) -> String {
    match kind {
        TransactionKind::Fund => "Wallet funded successfully.",
        TransactionKind::Withdraw => "Transfer successful.",
        TransactionKind::AirtimePurchase => "Airtime purchase successful.",
    }
    .to_string()
}

fn failure_message(kind: TransactionKind) -> String {
    match kind {
        TransactionKind::Fund => "Payment failed or cancelled.",
        TransactionKind::Withdraw => "Transfer failed or cancelled.",
        TransactionKind::AirtimePurchase => "Airtime purchase failed.",
    }
    .to_string()
}
