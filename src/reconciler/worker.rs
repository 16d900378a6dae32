//! Reconcile Worker
//!
//! At-least-once consumer over the delivery channel. Each message is one
//! raw provider notification; malformed input is logged and dropped,
//! never allowed to take the loop down.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::engine::{ReconcileOutcome, Reconciler};

pub struct ReconcileWorker {
    reconciler: Arc<Reconciler>,
}

impl ReconcileWorker {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self { reconciler }
    }

    /// Consume deliveries until the channel closes.
    pub async fn run(self, mut deliveries: mpsc::Receiver<Value>) {
        info!("Reconcile worker started");
        while let Some(raw) = deliveries.recv().await {
            let outcome = self.reconciler.process(&raw).await;
            match &outcome {
                ReconcileOutcome::Applied(tx) => {
                    info!(reference = %tx.reference, status = %tx.status, "Delivery applied");
                }
                ReconcileOutcome::Skipped(tx) => {
                    info!(reference = %tx.reference, "Delivery skipped");
                }
                ReconcileOutcome::NotFound(reference) => {
                    warn!(reference = %reference, "Delivery matched no transaction");
                }
                ReconcileOutcome::Ignored(reason) => {
                    info!(reason = %reason, "Delivery ignored");
                }
                ReconcileOutcome::Rejected(reason) => {
                    warn!(reason = %reason, "Delivery rejected");
                }
            }
        }
        info!("Reconcile worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fanout::Fanout;
    use crate::gateway::MockGateway;
    use crate::ledger::MemoryLedger;
    use serde_json::json;

    #[tokio::test]
    async fn test_worker_survives_malformed_input() {
        let ledger = Arc::new(MemoryLedger::new());
        let gateway = Arc::new(MockGateway::new());
        let reconciler = Arc::new(Reconciler::new(ledger, gateway, Fanout::new(), "secret"));
        let worker = ReconcileWorker::new(reconciler);

        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(worker.run(rx));

        tx.send(json!("not an object")).await.unwrap();
        tx.send(json!({ "garbage": true })).await.unwrap();
        tx.send(json!({ "signature": "wrong", "reference": "x" }))
            .await
            .unwrap();
        drop(tx);

        // The loop drains everything and exits cleanly when the channel closes.
        handle.await.unwrap();
    }
}
