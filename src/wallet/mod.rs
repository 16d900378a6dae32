//! Wallet Operations Layer
//!
//! Public operations over a user's wallet: funding, withdrawal, airtime
//! purchase, plus the read/admin surface. Coordinates the ledger store,
//! the gateway adapters and the outcome fanout.

pub mod error;
pub mod service;

pub use error::WalletError;
pub use service::WalletService;
