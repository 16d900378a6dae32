//! VTPass Airtime Provider Adapter
//!
//! HTTPS client for the VTPass airtime API. Provider responses carry a
//! code/status pair; `normalize_response` folds that into the closed
//! `AirtimeOutcome` set so callers never branch on provider strings.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{FixedOffset, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::error::GatewayError;
use super::types::{AirtimeOutcome, AirtimePurchase, AirtimeService};
use super::AirtimeProvider;

const SUCCESS_CODE: &str = "000";
const REQUERY_CODE: &str = "099";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// VTPass connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct VtPassConfig {
    pub api_key: String,
    pub public_key: String,
    pub secret_key: String,
    #[serde(default = "default_sandbox")]
    pub sandbox: bool,
}

fn default_sandbox() -> bool {
    true
}

impl VtPassConfig {
    fn base_url(&self) -> &'static str {
        if self.sandbox {
            "https://sandbox.vtpass.com/api"
        } else {
            "https://vtpass.com/api"
        }
    }
}

#[derive(Deserialize)]
struct PayResponse {
    #[serde(default)]
    code: Option<String>,
    #[serde(rename = "requestId", default)]
    request_id: Option<String>,
    #[serde(default)]
    response_description: Option<String>,
    #[serde(default)]
    content: Option<PayContent>,
}

#[derive(Deserialize)]
struct PayContent {
    #[serde(default)]
    transactions: Option<PayTransaction>,
}

#[derive(Deserialize)]
struct PayTransaction {
    #[serde(default)]
    status: Option<String>,
}

#[derive(Deserialize)]
struct ServicesResponse {
    content: Vec<ServiceEntry>,
}

#[derive(Deserialize)]
struct ServiceEntry {
    #[serde(rename = "serviceID")]
    service_id: String,
    name: String,
    minimum_amount: Decimal,
    maximum_amount: Decimal,
}

/// VTPass API client
pub struct VtPassClient {
    config: VtPassConfig,
    client: reqwest::Client,
}

impl VtPassClient {
    pub fn new(config: VtPassConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { config, client })
    }

    /// Provider-mandated request id: a Lagos-local `YYYYMMDDHHMM` timestamp
    /// followed by the user id.
    pub fn generate_request_id(user_id: i64) -> String {
        // Lagos is UTC+1 year-round.
        let timestamp = match FixedOffset::east_opt(3600) {
            Some(lagos) => Utc::now().with_timezone(&lagos).format("%Y%m%d%H%M").to_string(),
            None => Utc::now().format("%Y%m%d%H%M").to_string(),
        };
        format!("{}{}", timestamp, user_id)
    }

    fn get_headers(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("api-key", &self.config.api_key)
            .header("public-key", &self.config.public_key)
    }

    fn post_headers(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("api-key", &self.config.api_key)
            .header("secret-key", &self.config.secret_key)
    }

    async fn pay_request(
        &self,
        req: reqwest::RequestBuilder,
        fallback_request_id: &str,
    ) -> Result<AirtimePurchase, GatewayError> {
        let response = req.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GatewayError::Rejected(format!("HTTP {}: {}", status, body)));
        }
        let parsed: PayResponse = serde_json::from_str(&body)
            .map_err(|e| GatewayError::InvalidResponse(format!("bad pay response: {}", e)))?;
        Ok(normalize_response(parsed, fallback_request_id))
    }
}

/// Fold the provider's code/status pair into an `AirtimeOutcome`.
///
/// Code `000` is a processed request: its transaction status decides
/// success, pending (`pending`/`initiated`) or failure. Code `099` means
/// the provider wants a re-query. Anything else is an error.
fn normalize_response(response: PayResponse, fallback_request_id: &str) -> AirtimePurchase {
    let request_id = response
        .request_id
        .unwrap_or_else(|| fallback_request_id.to_string());
    let description = response
        .response_description
        .unwrap_or_else(|| "no description".to_string());

    let outcome = match response.code.as_deref() {
        Some(SUCCESS_CODE) => {
            let tx_status = response
                .content
                .and_then(|c| c.transactions)
                .and_then(|t| t.status);
            match tx_status.as_deref() {
                Some("success") => AirtimeOutcome::Success,
                Some("pending") | Some("initiated") => AirtimeOutcome::Pending,
                _ => AirtimeOutcome::Failed(description.clone()),
            }
        }
        Some(REQUERY_CODE) => AirtimeOutcome::Requery,
        _ => AirtimeOutcome::Error(description.clone()),
    };

    AirtimePurchase {
        request_id,
        outcome,
        message: description,
    }
}

#[async_trait]
impl AirtimeProvider for VtPassClient {
    async fn list_services(&self) -> Result<Vec<AirtimeService>, GatewayError> {
        let url = format!("{}/services?identifier=airtime", self.config.base_url());
        let response = self.get_headers(self.client.get(url)).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GatewayError::Rejected(format!("HTTP {}: {}", status, body)));
        }
        let parsed: ServicesResponse = serde_json::from_str(&body)
            .map_err(|e| GatewayError::InvalidResponse(format!("bad services list: {}", e)))?;
        Ok(parsed
            .content
            .into_iter()
            .map(|s| AirtimeService {
                service_id: s.service_id,
                name: s.name,
                minimum_amount: s.minimum_amount,
                maximum_amount: s.maximum_amount,
            })
            .collect())
    }

    async fn buy_airtime(
        &self,
        user_id: i64,
        service_id: &str,
        amount: Decimal,
        phone_number: &str,
    ) -> Result<AirtimePurchase, GatewayError> {
        let request_id = Self::generate_request_id(user_id);
        let payload = json!({
            "serviceID": service_id,
            "amount": amount,
            "phone": phone_number,
            "request_id": request_id,
        });
        debug!("Buying airtime {} for user {}", request_id, user_id);
        let url = format!("{}/pay", self.config.base_url());
        self.pay_request(
            self.post_headers(self.client.post(url)).json(&payload),
            &request_id,
        )
        .await
    }

    async fn requery(&self, request_id: &str) -> Result<AirtimePurchase, GatewayError> {
        let payload = json!({ "request_id": request_id });
        let url = format!("{}/requery", self.config.base_url());
        self.pay_request(
            self.post_headers(self.client.post(url)).json(&payload),
            request_id,
        )
        .await
    }
}
