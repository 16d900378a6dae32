//! Webhook Reconciler
//!
//! Consumes provider notifications (at-least-once, unordered), validates
//! and authenticates them, and drives pending transactions to their
//! terminal state through the ledger's atomic resolve primitives.

pub mod engine;
pub mod event;
pub mod worker;

pub use engine::{ReconcileOutcome, Reconciler};
pub use event::{EventParseError, PaymentEvent, ProviderEvent, TransferEvent};
pub use worker::ReconcileWorker;
