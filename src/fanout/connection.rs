//! Client registry for outcome delivery
//!
//! Maps transaction references to interested client channels using
//! DashMap for concurrent access. A reference can have several
//! subscribers (e.g. mobile + web waiting on the same payment).

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use super::OutcomePayload;

/// Client delivery channel type
pub type OutcomeSender = mpsc::UnboundedSender<OutcomePayload>;

/// Unique client connection identifier
pub type ConnectionId = u64;

/// Reference-keyed client registry
///
/// Thread-safe registry mapping a transaction reference to the clients
/// waiting on its outcome.
pub struct ClientRegistry {
    /// reference -> list of (connection_id, sender)
    clients: DashMap<String, Vec<(ConnectionId, OutcomeSender)>>,
    next_conn_id: AtomicU64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Register a client waiting on a reference. Returns the connection id
    /// used to unregister later.
    pub fn register(&self, reference: &str, tx: OutcomeSender) -> ConnectionId {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);

        self.clients
            .entry(reference.to_string())
            .or_default()
            .push((conn_id, tx));

        tracing::info!(reference, conn_id, "Outcome subscriber registered");
        conn_id
    }

    /// Remove a client. Cleans up empty reference entries.
    pub fn unregister(&self, reference: &str, conn_id: ConnectionId) {
        if let Some(mut senders) = self.clients.get_mut(reference) {
            senders.retain(|(id, _)| *id != conn_id);
            if senders.is_empty() {
                drop(senders);
                self.clients.remove(reference);
            }
            tracing::info!(reference, conn_id, "Outcome subscriber removed");
        }
    }

    /// Deliver a payload to every client waiting on its reference.
    ///
    /// Send failures (client went away) are logged; cleanup happens when
    /// the owning task unregisters.
    pub fn deliver(&self, reference: &str, payload: &OutcomePayload) {
        if let Some(senders) = self.clients.get(reference) {
            for (conn_id, tx) in senders.iter() {
                if tx.send(payload.clone()).is_err() {
                    tracing::warn!(reference, conn_id, "Subscriber gone, delivery dropped");
                }
            }
            tracing::debug!(
                reference,
                recipients = senders.len(),
                status = %payload.status,
                "Outcome delivered"
            );
        }
    }

    /// Returns (number of references, total subscribers).
    pub fn stats(&self) -> (usize, usize) {
        let references = self.clients.len();
        let total: usize = self.clients.iter().map(|entry| entry.value().len()).sum();
        (references, total)
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}
