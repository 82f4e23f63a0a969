//! Parsing of the 402 payment-required challenge header.
//!
//! Providers answer an unpaid request with HTTP 402 and a
//! `PAYMENT-REQUIRED` header holding a base64-encoded JSON document.
//! The document either carries an `accepts` array of payment options
//! (first entry wins) or the option fields inline.

use agora_types::{AgoraError, Result};
use base64::Engine;
use serde::Deserialize;

pub const PAYMENT_REQUIRED_HEADER: &str = "payment-required";

/// One challenge/response round's worth of payment terms. Immutable
/// once parsed; `raw` keeps the header value as received.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentChallenge {
    pub scheme: String,
    pub price: String,
    pub network: String,
    pub pay_to: String,
    pub raw: String,
}

#[derive(Deserialize)]
struct PaymentOption {
    #[serde(default = "default_scheme")]
    scheme: String,
    price: String,
    network: String,
    #[serde(rename = "payTo")]
    pay_to: String,
}

fn default_scheme() -> String {
    "exact".to_string()
}

#[derive(Deserialize)]
struct ChallengeDocument {
    #[serde(default)]
    accepts: Vec<PaymentOption>,
}

impl PaymentChallenge {
    /// Parse the base64 header value into a challenge.
    pub fn from_header(raw: &str) -> Result<Self> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(raw.trim())
            .map_err(|e| AgoraError::MalformedChallenge(format!("invalid base64: {}", e)))?;
        let value: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| AgoraError::MalformedChallenge(format!("invalid json: {}", e)))?;

        // Either an `accepts` array (first entry wins) or the option
        // fields inline at the top level.
        let doc: ChallengeDocument = serde_json::from_value(value.clone())
            .unwrap_or(ChallengeDocument { accepts: vec![] });
        let option = match doc.accepts.into_iter().next() {
            Some(option) => option,
            None => serde_json::from_value::<PaymentOption>(value).map_err(|_| {
                AgoraError::MalformedChallenge("no payment option in challenge".to_string())
            })?,
        };

        Ok(Self {
            scheme: option.scheme,
            price: option.price,
            network: option.network,
            pay_to: option.pay_to,
            raw: raw.to_string(),
        })
    }

    /// Extract and parse the challenge from a 402 response's headers.
    /// Header lookup is case-insensitive.
    pub fn from_response_headers(headers: &reqwest::header::HeaderMap) -> Result<Self> {
        let raw = headers
            .get(PAYMENT_REQUIRED_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AgoraError::MalformedChallenge(
                    "402 response missing PAYMENT-REQUIRED header".to_string(),
                )
            })?;
        Self::from_header(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: serde_json::Value) -> String {
        base64::engine::general_purpose::STANDARD.encode(value.to_string())
    }

    #[test]
    fn test_parse_accepts_array_first_entry_wins() {
        let raw = encode(serde_json::json!({
            "accepts": [
                { "scheme": "exact", "price": "$0.001", "network": "eip155:84532", "payTo": "0xrecipient" },
                { "scheme": "exact", "price": "$9.99", "network": "eip155:1", "payTo": "0xother" }
            ],
            "description": "Upload files to decentralized storage"
        }));
        let challenge = PaymentChallenge::from_header(&raw).unwrap();
        assert_eq!(challenge.scheme, "exact");
        assert_eq!(challenge.price, "$0.001");
        assert_eq!(challenge.network, "eip155:84532");
        assert_eq!(challenge.pay_to, "0xrecipient");
        assert_eq!(challenge.raw, raw);
    }

    #[test]
    fn test_parse_flat_document() {
        let raw = encode(serde_json::json!({
            "price": "$0.01",
            "network": "eip155:84532",
            "payTo": "0xabc"
        }));
        let challenge = PaymentChallenge::from_header(&raw).unwrap();
        assert_eq!(challenge.scheme, "exact");
        assert_eq!(challenge.price, "$0.01");
    }

    #[test]
    fn test_undecodable_header_is_malformed() {
        assert!(matches!(
            PaymentChallenge::from_header("%%%not-base64%%%"),
            Err(AgoraError::MalformedChallenge(_))
        ));
        let not_json = base64::engine::general_purpose::STANDARD.encode("plain text");
        assert!(matches!(
            PaymentChallenge::from_header(&not_json),
            Err(AgoraError::MalformedChallenge(_))
        ));
    }

    #[test]
    fn test_empty_accepts_is_malformed() {
        let raw = encode(serde_json::json!({ "accepts": [] }));
        assert!(matches!(
            PaymentChallenge::from_header(&raw),
            Err(AgoraError::MalformedChallenge(_))
        ));
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let raw = encode(serde_json::json!({
            "accepts": [{ "price": "$0.001", "network": "n", "payTo": "p" }]
        }));
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("PAYMENT-REQUIRED", raw.parse().unwrap());
        let challenge = PaymentChallenge::from_response_headers(&headers).unwrap();
        assert_eq!(challenge.pay_to, "p");
    }
}
