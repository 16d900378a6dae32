//! Wallet Engine - Reconciliation Daemon
//!
//! Entry point wiring:
//!
//! ```text
//! ┌──────────┐    ┌────────────┐    ┌────────────┐    ┌──────────┐
//! │  Config  │───▶│   Ledger   │───▶│ Reconciler │───▶│  Fanout  │
//! │  (YAML)  │    │ (Postgres) │    │  (worker)  │    │ (relay)  │
//! └──────────┘    └────────────┘    └────────────┘    └──────────┘
//! ```
//!
//! Provider notifications arrive as NDJSON on stdin, one event per line
//! (the broker adapter that feeds this channel is deployment-specific).

use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use wallet_engine::config::AppConfig;
use wallet_engine::fanout::{self, ClientRegistry, Fanout};
use wallet_engine::gateway::{FlutterwaveClient, VtPassClient};
use wallet_engine::ledger::{LedgerStore, MemoryLedger, PgLedger};
use wallet_engine::reconciler::{ReconcileWorker, Reconciler};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env);
    let _log_guard = wallet_engine::logging::init_logging(&config);

    tracing::info!("Starting wallet engine in {} mode", env);

    let ledger: Arc<dyn LedgerStore> = match &config.postgres_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .context("Failed to connect to PostgreSQL")?;
            let store = PgLedger::new(pool);
            store
                .ensure_schema()
                .await
                .context("Failed to ensure ledger schema")?;
            tracing::info!("Ledger store: PostgreSQL");
            Arc::new(store)
        }
        None => {
            tracing::warn!("No postgres_url configured, using in-memory ledger");
            Arc::new(MemoryLedger::new())
        }
    };

    let gateway = Arc::new(
        FlutterwaveClient::new(config.flutterwave.clone())
            .context("Failed to build Flutterwave client")?,
    );
    // Fail fast on a bad telco section even though only the operations
    // layer (not this daemon) talks to it.
    VtPassClient::new(config.vtpass.clone()).context("Failed to build VTPass client")?;

    let fanout_bus = Fanout::new();
    let registry = Arc::new(ClientRegistry::new());
    let relay = fanout::spawn_relay(&fanout_bus, registry.clone());

    let reconciler = Arc::new(Reconciler::new(
        ledger,
        gateway,
        fanout_bus.clone(),
        &config.flutterwave.webhook_hash,
    ));
    let (delivery_tx, delivery_rx) = mpsc::channel(config.reconciler.queue_size);
    let worker = tokio::spawn(ReconcileWorker::new(reconciler).run(delivery_rx));

    // Feed deliveries from stdin until EOF.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<serde_json::Value>(&line) {
            Ok(raw) => {
                if delivery_tx.send(raw).await.is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!(error = %e, "Dropped non-JSON delivery line"),
        }
    }

    drop(delivery_tx);
    worker.await.context("Reconcile worker panicked")?;
    drop(fanout_bus);
    relay.await.context("Fanout relay panicked")?;

    tracing::info!("Wallet engine stopped");
    Ok(())
}
