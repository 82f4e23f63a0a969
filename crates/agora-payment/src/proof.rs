//! Payment proof construction and header encoding.

use crate::challenge::PaymentChallenge;
use crate::signer::PaymentSigner;
use agora_types::Result;
use base64::Engine;
use serde::{Deserialize, Serialize};

pub const PAYMENT_HEADER: &str = "X-PAYMENT";

/// Typed authorization derived from a challenge. Signed as canonical
/// JSON; the provider's facilitator verifies it against the settlement
/// network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthorizationPayload {
    pub price: String,
    pub network: String,
    #[serde(rename = "payTo")]
    pub pay_to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facilitator: Option<String>,
    /// Unix milliseconds at signing time
    pub timestamp: i64,
}

/// A signed authorization plus its encoded header value. One-to-one
/// with a successful challenge; discarded after the paid retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentProof {
    pub payload: AuthorizationPayload,
    pub signature: String,
}

impl PaymentProof {
    /// Build and sign a proof for a parsed challenge.
    pub async fn create(
        challenge: &PaymentChallenge,
        signer: &dyn PaymentSigner,
        facilitator: Option<&str>,
    ) -> Result<Self> {
        let payload = AuthorizationPayload {
            price: challenge.price.clone(),
            network: challenge.network.clone(),
            pay_to: challenge.pay_to.clone(),
            facilitator: facilitator.map(str::to_string),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        let message = serde_json::to_vec(&payload)?;
        let signature = signer.sign_message(&message).await?;
        Ok(Self { payload, signature })
    }

    /// Encode for the `X-PAYMENT` retry header.
    pub fn header_value(&self) -> Result<String> {
        let json = serde_json::to_vec(self)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(json))
    }

    /// Decode a header value back into a proof.
    pub fn from_header(raw: &str) -> Option<Self> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(raw).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::LocalSigner;

    fn challenge() -> PaymentChallenge {
        PaymentChallenge {
            scheme: "exact".into(),
            price: "$0.01".into(),
            network: "eip155:84532".into(),
            pay_to: "0xrecipient".into(),
            raw: String::new(),
        }
    }

    #[tokio::test]
    async fn test_proof_references_challenge_terms() {
        let signer = LocalSigner::generate();
        let proof = PaymentProof::create(&challenge(), &signer, Some("https://facilitator"))
            .await
            .unwrap();
        assert_eq!(proof.payload.network, "eip155:84532");
        assert_eq!(proof.payload.pay_to, "0xrecipient");
        assert_eq!(proof.payload.price, "$0.01");
        assert!(!proof.signature.is_empty());
    }

    #[tokio::test]
    async fn test_header_roundtrip() {
        let signer = LocalSigner::generate();
        let proof = PaymentProof::create(&challenge(), &signer, None).await.unwrap();
        let header = proof.header_value().unwrap();
        let decoded = PaymentProof::from_header(&header).unwrap();
        assert_eq!(decoded.payload, proof.payload);
        assert_eq!(decoded.signature, proof.signature);
    }
}
