//! Provider Notification Events
//!
//! Closed sum over the two notification kinds the reconciler handles.
//! Parsing is strict: an event missing any required field is rejected
//! outright, never partially processed. Authenticity is a constant field
//! compare against the configured webhook secret.

use rust_decimal::Decimal;
use serde_json::Value;
use thiserror::Error;

/// A payment (wallet funding) notification
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentEvent {
    pub reference: String,
    pub provider_transaction_id: String,
    pub status: String,
    pub user_id: i64,
}

/// A bank transfer (withdrawal) notification
#[derive(Debug, Clone, PartialEq)]
pub struct TransferEvent {
    pub reference: String,
    pub status: String,
    pub amount: Decimal,
    pub currency: String,
    pub user_id: i64,
}

/// One inbound provider notification, already validated.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    Payment(PaymentEvent),
    Transfer(TransferEvent),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventParseError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid field: {0}")]
    InvalidField(&'static str),

    #[error("Invalid webhook signature")]
    BadSignature,

    #[error("Unsupported event kind")]
    UnsupportedKind,
}

impl ProviderEvent {
    /// Parse and authenticate a raw notification.
    ///
    /// Payment events carry `{reference, provider_transaction_id, status,
    /// signature, meta: {user_id}}` at top level; transfer events nest
    /// `{reference, status, amount, currency, meta: {user_id}}` under
    /// `data` with the signature alongside. Anything else is an
    /// unsupported kind.
    pub fn parse(raw: &Value, webhook_secret: &str) -> Result<Self, EventParseError> {
        let signature = str_field(raw, "signature")?;
        if signature != webhook_secret {
            return Err(EventParseError::BadSignature);
        }

        if let Some(data) = raw.get("data") {
            if !data.is_object() {
                return Err(EventParseError::InvalidField("data"));
            }
            Ok(ProviderEvent::Transfer(TransferEvent {
                reference: str_field(data, "reference")?.to_string(),
                status: str_field(data, "status")?.to_string(),
                amount: decimal_field(data, "amount")?,
                currency: str_field(data, "currency")?.to_string(),
                user_id: meta_user_id(data)?,
            }))
        } else if raw.get("reference").is_some() {
            Ok(ProviderEvent::Payment(PaymentEvent {
                reference: str_field(raw, "reference")?.to_string(),
                provider_transaction_id: id_field(raw, "provider_transaction_id")?,
                status: str_field(raw, "status")?.to_string(),
                user_id: meta_user_id(raw)?,
            }))
        } else {
            Err(EventParseError::UnsupportedKind)
        }
    }

    pub fn reference(&self) -> &str {
        match self {
            ProviderEvent::Payment(e) => &e.reference,
            ProviderEvent::Transfer(e) => &e.reference,
        }
    }

    pub fn user_id(&self) -> i64 {
        match self {
            ProviderEvent::Payment(e) => e.user_id,
            ProviderEvent::Transfer(e) => e.user_id,
        }
    }

    /// Whether the provider reported this transaction successful.
    /// Providers disagree on casing ("successful" vs "SUCCESSFUL").
    pub fn is_success(&self) -> bool {
        let status = match self {
            ProviderEvent::Payment(e) => &e.status,
            ProviderEvent::Transfer(e) => &e.status,
        };
        status.eq_ignore_ascii_case("successful")
    }
}

fn str_field<'a>(value: &'a Value, name: &'static str) -> Result<&'a str, EventParseError> {
    match value.get(name) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(EventParseError::InvalidField(name)),
        None => Err(EventParseError::MissingField(name)),
    }
}

/// Provider ids arrive as either a JSON string or a bare number.
fn id_field(value: &Value, name: &'static str) -> Result<String, EventParseError> {
    match value.get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(_) => Err(EventParseError::InvalidField(name)),
        None => Err(EventParseError::MissingField(name)),
    }
}

fn decimal_field(value: &Value, name: &'static str) -> Result<Decimal, EventParseError> {
    match value.get(name) {
        Some(v) => serde_json::from_value::<Decimal>(v.clone())
            .map_err(|_| EventParseError::InvalidField(name)),
        None => Err(EventParseError::MissingField(name)),
    }
}

fn meta_user_id(value: &Value) -> Result<i64, EventParseError> {
    let meta = match value.get("meta") {
        Some(Value::Object(m)) => m,
        Some(_) => return Err(EventParseError::InvalidField("meta")),
        None => return Err(EventParseError::MissingField("meta")),
    };
    match meta.get("user_id") {
        Some(Value::Number(n)) => n.as_i64().ok_or(EventParseError::InvalidField("user_id")),
        Some(Value::String(s)) => s
            .parse::<i64>()
            .map_err(|_| EventParseError::InvalidField("user_id")),
        Some(_) => Err(EventParseError::InvalidField("user_id")),
        None => Err(EventParseError::MissingField("user_id")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    const SECRET: &str = "test-hash";

    fn payment_event() -> Value {
        json!({
            "reference": "tx_ref-1-AAAA",
            "provider_transaction_id": 884213,
            "status": "successful",
            "signature": SECRET,
            "meta": { "user_id": 1 },
        })
    }

    fn transfer_event() -> Value {
        json!({
            "signature": SECRET,
            "data": {
                "reference": "tx_ref-2-BBBB",
                "status": "SUCCESSFUL",
                "amount": 400,
                "currency": "NGN",
                "meta": { "user_id": 2 },
            },
        })
    }

    #[test]
    fn test_parse_payment() {
        let event = ProviderEvent::parse(&payment_event(), SECRET).unwrap();
        match event {
            ProviderEvent::Payment(ref p) => {
                assert_eq!(p.reference, "tx_ref-1-AAAA");
                assert_eq!(p.provider_transaction_id, "884213");
                assert_eq!(p.user_id, 1);
            }
            _ => panic!("expected payment event"),
        }
        assert!(event.is_success());
    }

    #[test]
    fn test_parse_transfer() {
        let event = ProviderEvent::parse(&transfer_event(), SECRET).unwrap();
        match event {
            ProviderEvent::Transfer(ref t) => {
                assert_eq!(t.reference, "tx_ref-2-BBBB");
                assert_eq!(t.amount, dec!(400));
                assert_eq!(t.user_id, 2);
            }
            _ => panic!("expected transfer event"),
        }
        assert!(event.is_success());
    }

    #[test]
    fn test_bad_signature_rejected() {
        let err = ProviderEvent::parse(&payment_event(), "other-secret").unwrap_err();
        assert_eq!(err, EventParseError::BadSignature);
    }

    #[test]
    fn test_missing_fields_rejected() {
        let mut event = payment_event();
        event.as_object_mut().unwrap().remove("status");
        let err = ProviderEvent::parse(&event, SECRET).unwrap_err();
        assert_eq!(err, EventParseError::MissingField("status"));

        let mut event = transfer_event();
        event["data"].as_object_mut().unwrap().remove("amount");
        let err = ProviderEvent::parse(&event, SECRET).unwrap_err();
        assert_eq!(err, EventParseError::MissingField("amount"));
    }

    #[test]
    fn test_missing_user_id_rejected() {
        let mut event = payment_event();
        event["meta"].as_object_mut().unwrap().remove("user_id");
        let err = ProviderEvent::parse(&event, SECRET).unwrap_err();
        assert_eq!(err, EventParseError::MissingField("user_id"));
    }

    #[test]
    fn test_string_user_id_accepted() {
        let mut event = payment_event();
        event["meta"]["user_id"] = json!("17");
        let parsed = ProviderEvent::parse(&event, SECRET).unwrap();
        assert_eq!(parsed.user_id(), 17);
    }

    #[test]
    fn test_unknown_shape_is_unsupported() {
        let event = json!({ "signature": SECRET, "ping": true });
        let err = ProviderEvent::parse(&event, SECRET).unwrap_err();
        assert_eq!(err, EventParseError::UnsupportedKind);
    }

    #[test]
    fn test_failure_status() {
        let mut event = payment_event();
        event["status"] = json!("failed");
        let parsed = ProviderEvent::parse(&event, SECRET).unwrap();
        assert!(!parsed.is_success());
    }
}
