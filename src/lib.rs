//! Wallet Engine - Payment and Airtime Reconciliation Core
//!
//! Keeps wallet balances consistent under concurrent requests and
//! asynchronous, possibly-duplicated provider confirmations.
//!
//! # Modules
//!
//! - [`ledger`] - Durable wallet/transaction storage and the lock protocol
//! - [`gateway`] - Payment gateway and airtime provider adapters
//! - [`wallet`] - Money-moving operations (fund, withdraw, airtime)
//! - [`reconciler`] - Webhook reconciliation engine and worker
//! - [`fanout`] - Outcome publish/subscribe keyed by reference
//! - [`config`] - YAML application configuration
//! - [`logging`] - tracing subscriber setup

pub mod config;
pub mod fanout;
pub mod gateway;
pub mod ledger;
pub mod logging;
pub mod reconciler;
pub mod wallet;

// Convenient re-exports at crate root
pub use fanout::{ClientRegistry, Fanout, OutcomePayload};
pub use gateway::{AirtimeProvider, GatewayError, PaymentGateway};
pub use ledger::{
    LedgerError, LedgerStore, MemoryLedger, PgLedger, Transaction, TransactionKind,
    TransactionStatus, Wallet, WalletId,
};
pub use reconciler::{ReconcileOutcome, ReconcileWorker, Reconciler};
pub use wallet::{WalletError, WalletService};
