//! Event Fanout
//!
//! Reference-keyed publish/subscribe for reconciliation outcomes. The
//! reconciler publishes exactly one envelope per applied resolution; a
//! relay task forwards envelopes to the clients registered for that
//! reference. Publishing never blocks the reconciler: with no
//! subscribers the envelope is dropped.

pub mod connection;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

pub use connection::{ClientRegistry, ConnectionId, OutcomeSender};

const CHANNEL_CAPACITY: usize = 1024;

/// Outcome notification pushed to waiting clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutcomePayload {
    pub status: String,
    pub message: String,
    pub tx_ref: String,
    pub user_id: i64,
    pub amount: Decimal,
    pub currency: String,
}

/// A published outcome, keyed by the transaction reference
#[derive(Debug, Clone)]
pub struct Envelope {
    pub key: String,
    pub payload: OutcomePayload,
}

/// Outcome event bus
///
/// Thin wrapper over a tokio broadcast channel. Cloneable; every clone
/// publishes into the same bus.
#[derive(Clone)]
pub struct Fanout {
    sender: broadcast::Sender<Envelope>,
}

impl Fanout {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish an outcome under its transaction reference. Fire-and-forget:
    /// a bus with no subscribers swallows the envelope.
    pub fn publish(&self, key: &str, payload: OutcomePayload) {
        let envelope = Envelope {
            key: key.to_string(),
            payload,
        };
        let receivers = self.sender.send(envelope).unwrap_or(0);
        debug!(key, receivers, "Outcome published");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }
}

impl Default for Fanout {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn the relay task forwarding published envelopes to registered
/// clients. Runs until the fanout bus is dropped.
pub fn spawn_relay(fanout: &Fanout, registry: Arc<ClientRegistry>) -> tokio::task::JoinHandle<()> {
    let mut rx = fanout.subscribe();
    tokio::spawn(async move {
        info!("Fanout relay started");
        loop {
            match rx.recv().await {
                Ok(envelope) => registry.deliver(&envelope.key, &envelope.payload),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Fanout relay lagged, outcomes dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Fanout relay stopped");
                    break;
                }
            }
        }
    })
}
