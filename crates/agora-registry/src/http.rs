use crate::client::RegistryClient;
use agora_types::{AgoraError, ReputationRecord, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

/// Where the registry gateway lives and which deployed contracts it
/// fronts. The contract addresses are forwarded so one gateway can
/// serve several deployments.
#[derive(Debug, Clone)]
pub struct RegistryEndpoints {
    pub gateway_url: String,
    pub identity_registry: String,
    pub reputation_registry: String,
}

/// REST client for the registry gateway.
///
/// Every call carries the configured timeout; a hung gateway surfaces
/// as `AgoraError::Timeout`, any other transport or status failure as
/// `RegistryCallFailed`.
pub struct HttpRegistryClient {
    endpoints: RegistryEndpoints,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct DiscoverResponse {
    agents: Vec<String>,
    #[serde(default)]
    #[allow(dead_code)]
    total: u64,
}

#[derive(Deserialize)]
struct CardResponse {
    cid: String,
}

#[derive(Deserialize)]
struct ReputationResponse {
    /// Score scaled by 100 on chain: 480 means 4.8 out of 5.
    score: u64,
    #[serde(rename = "totalRatings")]
    total_ratings: u64,
}

#[derive(Deserialize)]
struct CanRateResponse {
    allowed: bool,
    #[serde(rename = "nextAllowedTime", default)]
    next_allowed_time: u64,
}

#[derive(Deserialize)]
struct PostReputationResponse {
    #[serde(rename = "txHash")]
    tx_hash: String,
}

impl HttpRegistryClient {
    pub fn new(endpoints: RegistryEndpoints, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgoraError::RegistryCallFailed(e.to_string()))?;
        Ok(Self { endpoints, client })
    }

    fn map_err(e: reqwest::Error) -> AgoraError {
        if e.is_timeout() {
            AgoraError::Timeout(format!("registry: {}", e))
        } else {
            AgoraError::RegistryCallFailed(e.to_string())
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String) -> Result<T> {
        let response = self
            .client
            .get(&url)
            .header("x-identity-registry", &self.endpoints.identity_registry)
            .header("x-reputation-registry", &self.endpoints.reputation_registry)
            .send()
            .await
            .map_err(Self::map_err)?
            .error_for_status()
            .map_err(Self::map_err)?;
        response.json().await.map_err(Self::map_err)
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    #[instrument(skip(self))]
    async fn discover_by_capability(&self, tag: &str) -> Result<Vec<String>> {
        let url = format!(
            "{}/agents?capability={}",
            self.endpoints.gateway_url, tag
        );
        let resp: DiscoverResponse = self.get_json(url).await?;
        debug!(tag, count = resp.agents.len(), "Capability discovery");
        Ok(resp.agents)
    }

    #[instrument(skip(self))]
    async fn discover_paginated(&self, offset: u64, limit: u64) -> Result<Vec<String>> {
        let url = format!(
            "{}/agents/page?offset={}&limit={}",
            self.endpoints.gateway_url, offset, limit
        );
        let resp: DiscoverResponse = self.get_json(url).await?;
        debug!(offset, limit, count = resp.agents.len(), "Paginated discovery");
        Ok(resp.agents)
    }

    #[instrument(skip(self))]
    async fn get_reputation(&self, address: &str) -> Result<(f64, u64)> {
        let url = format!(
            "{}/agents/{}/reputation",
            self.endpoints.gateway_url, address
        );
        let resp: ReputationResponse = self.get_json(url).await?;
        Ok((resp.score as f64 / 100.0, resp.total_ratings))
    }

    #[instrument(skip(self))]
    async fn get_agent_card(&self, address: &str) -> Result<String> {
        let url = format!("{}/agents/{}/card", self.endpoints.gateway_url, address);
        let resp: CardResponse = self.get_json(url).await?;
        Ok(resp.cid)
    }

    #[instrument(skip(self))]
    async fn can_rate(&self, rater: &str, target: &str) -> Result<(bool, u64)> {
        let url = format!(
            "{}/reputation/can-rate?rater={}&target={}",
            self.endpoints.gateway_url, rater, target
        );
        let resp: CanRateResponse = self.get_json(url).await?;
        Ok((resp.allowed, resp.next_allowed_time))
    }

    #[instrument(skip(self, record), fields(target = %record.target, rating = record.rating))]
    async fn post_reputation(&self, record: &ReputationRecord) -> Result<String> {
        let url = format!("{}/reputation", self.endpoints.gateway_url);
        let response = self
            .client
            .post(&url)
            .header("x-reputation-registry", &self.endpoints.reputation_registry)
            .json(record)
            .send()
            .await
            .map_err(Self::map_err)?
            .error_for_status()
            .map_err(Self::map_err)?;
        let resp: PostReputationResponse =
            response.json().await.map_err(Self::map_err)?;
        debug!(tx_hash = %resp.tx_hash, "Reputation posted");
        Ok(resp.tx_hash)
    }
}
