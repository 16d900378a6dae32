//! Gateway Error Types

use thiserror::Error;

/// Errors from external provider calls.
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    /// Transport-level failure after bounded retries. Transient: the caller
    /// must release any held wallet lock and fail the pending transaction.
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),

    /// The provider processed the request and said no.
    #[error("Gateway rejected the request: {0}")]
    Rejected(String),

    /// A 2xx response that does not carry the fields the contract needs.
    #[error("Invalid gateway response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Unavailable(_) => "GATEWAY_UNAVAILABLE",
            GatewayError::Rejected(_) => "GATEWAY_REJECTED",
            GatewayError::InvalidResponse(_) => "GATEWAY_INVALID_RESPONSE",
        }
    }

    /// Transient errors are worth retrying at the adapter layer; everything
    /// else is final.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::Unavailable(e.to_string())
    }
}
