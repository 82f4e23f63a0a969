//! The 402 challenge/response exchange against a provider endpoint.
//!
//! Per request the exchange walks Unpaid → Challenged → Paid →
//! Completed. A 200 on the unpaid attempt short-circuits to Settled
//! (test deployments run without payment enforcement). Network errors
//! are not retried here; retry policy belongs to the caller.

use crate::challenge::PaymentChallenge;
use crate::proof::{PaymentProof, PAYMENT_HEADER};
use crate::signer::PaymentSigner;
use agora_types::{AgoraError, Result};
use base64::Engine;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Request shape for one capability, selected once during task
/// preparation.
#[derive(Debug, Clone)]
pub enum PreparedPayload {
    /// JSON body referencing a previously staged input blob
    Analysis {
        input_cid: String,
        requirements: String,
    },
    /// Raw file bytes sent as a multipart body
    Upload {
        bytes: Vec<u8>,
        file_name: String,
        content_type: String,
    },
    /// No body; content address goes in the query string
    Retrieve { cid: String },
}

/// What the provider delivered after settlement.
#[derive(Debug, Clone)]
pub enum ServiceOutcome {
    Analysis {
        result_cid: String,
        summary: Option<String>,
        statistics: Option<serde_json::Value>,
        insights: Option<Vec<String>>,
    },
    Stored {
        cid: String,
        file_name: Option<String>,
        file_size: Option<u64>,
    },
    Retrieved {
        data: Vec<u8>,
        content_type: String,
    },
}

/// Outcome plus the best-effort settlement reference. Absence of the
/// transaction hash is not an error.
#[derive(Debug, Clone)]
pub struct PaidDelivery {
    pub outcome: ServiceOutcome,
    pub settlement_tx: Option<String>,
}

pub struct PaymentClient {
    client: reqwest::Client,
    facilitator_url: Option<String>,
}

#[derive(Deserialize)]
struct AnalysisResponse {
    #[serde(rename = "resultCID")]
    result_cid: Option<String>,
    summary: Option<String>,
    statistics: Option<serde_json::Value>,
    insights: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct UploadData {
    cid: String,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Deserialize)]
struct UploadResponse {
    data: UploadData,
}

impl PaymentClient {
    pub fn new(timeout: Duration, facilitator_url: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgoraError::ProviderUnreachable(e.to_string()))?;
        Ok(Self {
            client,
            facilitator_url,
        })
    }

    /// Run the full exchange and return the provider's deliverable.
    #[instrument(skip(self, payload, signer))]
    pub async fn execute(
        &self,
        endpoint: &str,
        payload: &PreparedPayload,
        signer: &dyn PaymentSigner,
    ) -> Result<PaidDelivery> {
        // Unpaid attempt
        let response = self
            .build_request(endpoint, payload)?
            .send()
            .await
            .map_err(Self::map_transport_err)?;

        match response.status() {
            StatusCode::OK => {
                debug!(endpoint, "Settled without payment challenge");
                let settlement_tx = settlement_tx_from_headers(response.headers());
                let outcome = self.parse_outcome(payload, response).await?;
                Ok(PaidDelivery {
                    outcome,
                    settlement_tx,
                })
            }
            StatusCode::PAYMENT_REQUIRED => {
                let challenge = PaymentChallenge::from_response_headers(response.headers())?;
                info!(
                    endpoint,
                    price = %challenge.price,
                    network = %challenge.network,
                    pay_to = %challenge.pay_to,
                    "Payment challenge received"
                );

                let proof =
                    PaymentProof::create(&challenge, signer, self.facilitator_url.as_deref())
                        .await?;
                let header = proof.header_value()?;

                // Paid retry: identical request body plus the proof header
                let paid = self
                    .build_request(endpoint, payload)?
                    .header(PAYMENT_HEADER, header)
                    .send()
                    .await
                    .map_err(Self::map_transport_err)?;

                if paid.status() != StatusCode::OK {
                    let status = paid.status();
                    let body = paid.text().await.unwrap_or_default();
                    warn!(endpoint, %status, "Paid retry rejected");
                    return Err(AgoraError::PaymentRejected(format!(
                        "{}: {}",
                        status, body
                    )));
                }

                let settlement_tx = settlement_tx_from_headers(paid.headers());
                let outcome = self.parse_outcome(payload, paid).await?;
                Ok(PaidDelivery {
                    outcome,
                    settlement_tx,
                })
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(AgoraError::BadProviderResponse(format!(
                    "unexpected status {}: {}",
                    status, body
                )))
            }
        }
    }

    fn build_request(
        &self,
        endpoint: &str,
        payload: &PreparedPayload,
    ) -> Result<reqwest::RequestBuilder> {
        let builder = match payload {
            PreparedPayload::Analysis {
                input_cid,
                requirements,
            } => self.client.post(endpoint).json(&serde_json::json!({
                "inputCID": input_cid,
                "requirements": requirements,
            })),
            PreparedPayload::Upload {
                bytes,
                file_name,
                content_type,
            } => {
                // Multipart forms are consumed on send, so the body is
                // rebuilt for the paid retry from the staged bytes.
                let part = reqwest::multipart::Part::bytes(bytes.clone())
                    .file_name(file_name.clone())
                    .mime_str(content_type)
                    .map_err(|e| AgoraError::ProviderUnreachable(e.to_string()))?;
                self.client
                    .post(endpoint)
                    .multipart(reqwest::multipart::Form::new().part("file", part))
            }
            PreparedPayload::Retrieve { cid } => {
                self.client.get(endpoint).query(&[("cid", cid.as_str())])
            }
        };
        Ok(builder)
    }

    async fn parse_outcome(
        &self,
        payload: &PreparedPayload,
        response: reqwest::Response,
    ) -> Result<ServiceOutcome> {
        match payload {
            PreparedPayload::Analysis { .. } => {
                let body: AnalysisResponse = response
                    .json()
                    .await
                    .map_err(|e| AgoraError::BadProviderResponse(e.to_string()))?;
                let result_cid = body.result_cid.ok_or_else(|| {
                    AgoraError::BadProviderResponse(
                        "analysis response carried no result CID".to_string(),
                    )
                })?;
                Ok(ServiceOutcome::Analysis {
                    result_cid,
                    summary: body.summary,
                    statistics: body.statistics,
                    insights: body.insights,
                })
            }
            PreparedPayload::Upload { .. } => {
                let body: UploadResponse = response
                    .json()
                    .await
                    .map_err(|e| AgoraError::BadProviderResponse(e.to_string()))?;
                Ok(ServiceOutcome::Stored {
                    cid: body.data.cid,
                    file_name: body.data.filename,
                    file_size: body.data.size,
                })
            }
            PreparedPayload::Retrieve { .. } => {
                // Opaque byte stream; content type comes from the
                // response header, never assumed JSON.
                let content_type = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = response
                    .bytes()
                    .await
                    .map_err(|e| AgoraError::BadProviderResponse(e.to_string()))?
                    .to_vec();
                Ok(ServiceOutcome::Retrieved { data, content_type })
            }
        }
    }

    fn map_transport_err(e: reqwest::Error) -> AgoraError {
        if e.is_timeout() {
            AgoraError::Timeout(format!("provider: {}", e))
        } else {
            AgoraError::ProviderUnreachable(e.to_string())
        }
    }
}

/// Best-effort settlement reference from the payment-response header.
fn settlement_tx_from_headers(headers: &HeaderMap) -> Option<String> {
    let raw = headers
        .get("x-payment-response")
        .or_else(|| headers.get("payment-response"))
        .and_then(|v| v.to_str().ok())?;
    let bytes = base64::engine::general_purpose::STANDARD.decode(raw).ok()?;
    let doc: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    doc.get("transaction")
        .and_then(|t| t.as_str())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::LocalSigner;
    use wiremock::matchers::{header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn challenge_header(price: &str, network: &str, pay_to: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(
            serde_json::json!({
                "accepts": [{ "scheme": "exact", "price": price, "network": network, "payTo": pay_to }]
            })
            .to_string(),
        )
    }

    fn payment_response_header(tx: &str) -> String {
        base64::engine::general_purpose::STANDARD
            .encode(serde_json::json!({ "transaction": tx }).to_string())
    }

    #[tokio::test]
    async fn test_challenge_then_paid_retry_carries_matching_proof() {
        let server = MockServer::start().await;

        // Unpaid attempt: 402 with challenge
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(
                ResponseTemplate::new(402).insert_header(
                    "PAYMENT-REQUIRED",
                    challenge_header("$0.01", "eip155:84532", "0xpayee").as_str(),
                ),
            )
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;

        // Paid retry: requires the payment header
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .and(header_exists("X-PAYMENT"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(
                        "X-PAYMENT-RESPONSE",
                        payment_response_header("0xsettled").as_str(),
                    )
                    .set_body_json(serde_json::json!({
                        "resultCID": "bafyresult",
                        "summary": "5 rows",
                        "statistics": { "rowCount": 5 },
                        "insights": ["flat trend"]
                    })),
            )
            .with_priority(2)
            .mount(&server)
            .await;

        let client = PaymentClient::new(Duration::from_secs(5), None).unwrap();
        let signer = LocalSigner::generate();
        let payload = PreparedPayload::Analysis {
            input_cid: "bafyinput".into(),
            requirements: "statistical summary and trend analysis".into(),
        };
        let delivery = client
            .execute(&format!("{}/analyze", server.uri()), &payload, &signer)
            .await
            .unwrap();

        assert_eq!(delivery.settlement_tx.as_deref(), Some("0xsettled"));
        match delivery.outcome {
            ServiceOutcome::Analysis { result_cid, .. } => assert_eq!(result_cid, "bafyresult"),
            other => panic!("unexpected outcome: {:?}", other),
        }

        // The retry's proof must reference exactly the challenged
        // network and payee.
        let requests = server.received_requests().await.unwrap();
        let paid = requests
            .iter()
            .find(|r| r.headers.contains_key("x-payment"))
            .expect("paid retry request");
        let raw = paid.headers.get("x-payment").unwrap().to_str().unwrap();
        let proof = PaymentProof::from_header(raw).unwrap();
        assert_eq!(proof.payload.network, "eip155:84532");
        assert_eq!(proof.payload.pay_to, "0xpayee");
        assert_eq!(proof.payload.price, "$0.01");
    }

    #[tokio::test]
    async fn test_402_without_header_is_malformed_and_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(ResponseTemplate::new(402))
            .expect(1)
            .mount(&server)
            .await;

        let client = PaymentClient::new(Duration::from_secs(5), None).unwrap();
        let signer = LocalSigner::generate();
        let payload = PreparedPayload::Analysis {
            input_cid: "bafy".into(),
            requirements: "stats".into(),
        };
        let err = client
            .execute(&format!("{}/analyze", server.uri()), &payload, &signer)
            .await
            .unwrap_err();
        assert!(matches!(err, AgoraError::MalformedChallenge(_)));
        // expect(1) verifies no retry happened on drop
    }

    #[tokio::test]
    async fn test_rejected_retry_carries_provider_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .and(header_exists("X-PAYMENT"))
            .respond_with(ResponseTemplate::new(403).set_body_string("payment not settled"))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(402).insert_header(
                "PAYMENT-REQUIRED",
                challenge_header("$0.001", "eip155:84532", "0xpayee").as_str(),
            ))
            .with_priority(2)
            .mount(&server)
            .await;

        let client = PaymentClient::new(Duration::from_secs(5), None).unwrap();
        let signer = LocalSigner::generate();
        let payload = PreparedPayload::Upload {
            bytes: vec![1, 2, 3],
            file_name: "f.bin".into(),
            content_type: "application/octet-stream".into(),
        };
        let err = client
            .execute(&format!("{}/upload", server.uri()), &payload, &signer)
            .await
            .unwrap_err();
        match err {
            AgoraError::PaymentRejected(msg) => assert!(msg.contains("payment not settled")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_settled_without_challenge() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/retrieve"))
            .and(query_param("cid", "bafyblob"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(vec![0x89u8, 0x50, 0x4e, 0x47]),
            )
            .mount(&server)
            .await;

        let client = PaymentClient::new(Duration::from_secs(5), None).unwrap();
        let signer = LocalSigner::generate();
        let payload = PreparedPayload::Retrieve {
            cid: "bafyblob".into(),
        };
        let delivery = client
            .execute(&format!("{}/retrieve", server.uri()), &payload, &signer)
            .await
            .unwrap();
        assert!(delivery.settlement_tx.is_none());
        match delivery.outcome {
            ServiceOutcome::Retrieved { data, content_type } => {
                assert_eq!(content_type, "image/png");
                assert_eq!(data.len(), 4);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
