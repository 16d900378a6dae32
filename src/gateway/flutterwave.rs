//! Flutterwave Payment Gateway Adapter
//!
//! HTTPS client for the Flutterwave v3 API: hosted payments, bank
//! transfers, transaction verification, bank listing and account
//! resolution. Transport failures are retried a bounded number of times;
//! anything still failing surfaces as `GatewayError::Unavailable` so the
//! caller can release its wallet lock.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;
use tracing::{debug, warn};
use ulid::Ulid;

use super::error::GatewayError;
use super::types::{
    Bank, InitiatedPayment, InitiatedTransfer, PaymentRequest, ResolvedAccount, TransferRequest,
    VerifiedStatus, VerifiedTransaction,
};
use super::PaymentGateway;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(250);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Flutterwave connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct FlutterwaveConfig {
    pub secret_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Shared secret echoed back in webhook signatures.
    pub webhook_hash: String,
    #[serde(default)]
    pub redirect_url: String,
    #[serde(default = "default_payment_options")]
    pub payment_options: Vec<String>,
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_base_url() -> String {
    "https://api.flutterwave.com/v3".to_string()
}

fn default_payment_options() -> Vec<String> {
    vec!["card".to_string(), "banktransfer".to_string()]
}

fn default_country() -> String {
    "NG".to_string()
}

/// Response envelope all Flutterwave endpoints share
#[derive(Deserialize)]
struct ApiEnvelope<T> {
    status: String,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Deserialize)]
struct PaymentData {
    link: String,
}

#[derive(Deserialize)]
struct TransferData {
    #[allow(dead_code)]
    id: Option<i64>,
}

#[derive(Deserialize)]
struct VerifyData {
    status: String,
    amount: Decimal,
    currency: String,
}

#[derive(Deserialize)]
struct ResolveData {
    account_number: String,
    account_name: String,
}

/// Flutterwave v3 API client
pub struct FlutterwaveClient {
    config: FlutterwaveConfig,
    client: reqwest::Client,
}

impl FlutterwaveClient {
    pub fn new(config: FlutterwaveConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { config, client })
    }

    /// Shared secret expected in webhook signatures.
    pub fn webhook_hash(&self) -> &str {
        &self.config.webhook_hash
    }

    /// Generate a unique transaction reference for a user. ULIDs are
    /// monotonic-ish and collision-free, so two operations started in the
    /// same instant still get distinct references.
    pub fn generate_tx_ref(user_id: i64) -> String {
        format!("tx_ref-{}-{}", user_id, Ulid::new())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// Send a request, retrying transport failures with a short backoff.
    /// Non-transport outcomes (HTTP error status, malformed body) are final.
    async fn request<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, GatewayError> {
        let mut last_err: Option<reqwest::Error> = None;
        for attempt in 1..=MAX_ATTEMPTS {
            let attempt_req = match req.try_clone() {
                Some(r) => r,
                None => break,
            };
            match attempt_req.send().await {
                Ok(response) => return self.parse_response(response).await,
                Err(e) => {
                    warn!("Flutterwave request failed (attempt {}): {}", attempt, e);
                    last_err = Some(e);
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(RETRY_BACKOFF).await;
                    }
                }
            }
        }
        Err(match last_err {
            Some(e) => GatewayError::from(e),
            None => GatewayError::Unavailable("request body not retryable".to_string()),
        })
    }

    async fn parse_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GatewayError::Rejected(format!("HTTP {}: {}", status, body)));
        }

        let envelope: ApiEnvelope<T> = serde_json::from_str(&body)
            .map_err(|e| GatewayError::InvalidResponse(format!("bad envelope: {}", e)))?;
        if envelope.status != "success" {
            return Err(GatewayError::Rejected(
                envelope.message.unwrap_or_else(|| envelope.status.clone()),
            ));
        }
        envelope
            .data
            .ok_or_else(|| GatewayError::InvalidResponse("missing data field".to_string()))
    }
}

fn map_verified_status(s: &str) -> VerifiedStatus {
    match s {
        "successful" => VerifiedStatus::Successful,
        "pending" => VerifiedStatus::Pending,
        _ => VerifiedStatus::Failed,
    }
}

#[async_trait]
impl PaymentGateway for FlutterwaveClient {
    async fn initiate_payment(
        &self,
        req: PaymentRequest,
    ) -> Result<InitiatedPayment, GatewayError> {
        let tx_ref = Self::generate_tx_ref(req.user_id);
        let now = Utc::now();
        let payload = json!({
            "tx_ref": tx_ref,
            "amount": req.amount,
            "currency": req.currency,
            "redirect_url": self.config.redirect_url,
            "customer": { "email": req.email },
            "payment_options": self.config.payment_options.join(", "),
            "meta": { "user_id": req.user_id },
        });

        debug!("Initiating payment {} for user {}", tx_ref, req.user_id);
        let data: PaymentData = self
            .request(
                self.client
                    .post(self.url("/payments"))
                    .bearer_auth(&self.config.secret_key)
                    .json(&payload),
            )
            .await?;

        Ok(InitiatedPayment {
            reference: tx_ref,
            link: data.link,
            created_at: now,
        })
    }

    async fn initiate_transfer(
        &self,
        req: TransferRequest,
    ) -> Result<InitiatedTransfer, GatewayError> {
        let tx_ref = Self::generate_tx_ref(req.user_id);
        let now = Utc::now();
        let payload = json!({
            "reference": tx_ref,
            "amount": req.amount,
            "currency": req.currency,
            "account_bank": req.bank_code,
            "account_number": req.account_number,
            "meta": { "user_id": req.user_id },
            "narration": format!("Transfer to {}", req.account_number),
        });

        debug!("Initiating transfer {} for user {}", tx_ref, req.user_id);
        let _data: TransferData = self
            .request(
                self.client
                    .post(self.url("/transfers"))
                    .bearer_auth(&self.config.secret_key)
                    .json(&payload),
            )
            .await?;

        Ok(InitiatedTransfer {
            reference: tx_ref,
            created_at: now,
        })
    }

    async fn verify_transaction(
        &self,
        provider_tx_id: &str,
    ) -> Result<VerifiedTransaction, GatewayError> {
        let data: VerifyData = self
            .request(
                self.client
                    .get(self.url(&format!("/transactions/{}/verify", provider_tx_id)))
                    .bearer_auth(&self.config.secret_key),
            )
            .await?;

        Ok(VerifiedTransaction {
            status: map_verified_status(&data.status),
            amount: data.amount,
            currency: data.currency,
        })
    }

    async fn list_banks(&self) -> Result<Vec<Bank>, GatewayError> {
        self.request(
            self.client
                .get(self.url(&format!("/banks/{}", self.config.country)))
                .bearer_auth(&self.config.secret_key),
        )
        .await
    }

    async fn resolve_account(
        &self,
        bank_code: &str,
        account_number: &str,
    ) -> Result<ResolvedAccount, GatewayError> {
        let payload = json!({
            "account_number": account_number,
            "account_bank": bank_code,
        });
        let data: ResolveData = self
            .request(
                self.client
                    .post(self.url("/accounts/resolve"))
                    .bearer_auth(&self.config.secret_key)
                    .json(&payload),
            )
            .await?;

        Ok(ResolvedAccount {
            account_number: data.account_number,
            account_name: data.account_name,
            bank_code: bank_code.to_string(),
        })
    }
}
