//! Ledger Store and Wallet Lock Protocol
//!
//! Durable entity storage for Wallet and Transaction records with atomic
//! read-modify-write primitives, a unique-reference constraint, and the
//! cooperative per-wallet lock that serializes money-moving operations.

pub mod error;
pub mod memory;
pub mod pg;
pub mod store;
pub mod types;

pub use error::LedgerError;
pub use memory::MemoryLedger;
pub use pg::PgLedger;
pub use store::{LedgerStore, Resolution};
pub use types::{
    BalanceUpdate, DEFAULT_CURRENCY, NewTransaction, Transaction, TransactionId, TransactionKind,
    TransactionStatus, Wallet, WalletId,
};
