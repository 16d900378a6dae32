use serde::Deserialize;
use std::fs;

use crate::gateway::{FlutterwaveConfig, VtPassConfig};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// PostgreSQL connection URL for the ledger store
    #[serde(default)]
    pub postgres_url: Option<String>,
    pub flutterwave: FlutterwaveConfig,
    pub vtpass: VtPassConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReconcilerConfig {
    /// Delivery channel depth before the feeder backpressures.
    pub queue_size: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self { queue_size: 1024 }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Self {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .unwrap_or_else(|_| panic!("Failed to read config file: {}", config_path));
        serde_yaml::from_str(&content).expect("Failed to parse config yaml")
    }
}
