//! Maps a capability intent to one ranked, fully resolved provider.
//!
//! Resolution order: classify the intent, discover candidate addresses
//! (direct capability lookup, then paginated fallback), rank by
//! reputation, then fetch the winner's agent card for its endpoint and
//! price table. A card that cannot be fetched or parsed degrades to the
//! hard-coded per-capability endpoint; only an empty registry is fatal.

use agora_registry::RegistryClient;
use agora_storage::StorageClient;
use agora_types::{AgentCard, AgoraError, CapabilityTag, ProviderCandidate, Result};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const DISCOVERY_PAGE_LIMIT: u64 = 50;

/// A resolved provider plus the capability tag the rest of the pipeline
/// routes by.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub candidate: ProviderCandidate,
    pub tag: CapabilityTag,
    /// True when the agent card was unusable and the hard-coded
    /// endpoint/price fallback was applied.
    pub degraded: bool,
    /// How many candidates the registry returned before ranking.
    pub candidate_count: usize,
}

pub struct ProviderResolver {
    registry: Arc<dyn RegistryClient>,
    storage: Arc<dyn StorageClient>,
}

impl ProviderResolver {
    pub fn new(registry: Arc<dyn RegistryClient>, storage: Arc<dyn StorageClient>) -> Self {
        Self { registry, storage }
    }

    /// Resolve an intent to the top-ranked provider for it.
    #[instrument(skip(self))]
    pub async fn resolve(&self, intent: &str) -> Result<Resolution> {
        let tag = CapabilityTag::classify(intent);
        debug!(intent, %tag, "Classified capability intent");

        let addresses = self.discover(tag).await?;
        if addresses.is_empty() {
            return Err(AgoraError::NoProviderFound(tag.to_string()));
        }
        let candidate_count = addresses.len();

        let ranked = self.rank(addresses).await;
        let Some((address, reputation, total_ratings)) = ranked.into_iter().next() else {
            return Err(AgoraError::NoProviderFound(tag.to_string()));
        };

        info!(
            %address,
            reputation,
            total_ratings,
            candidates = candidate_count,
            "Selected top provider"
        );

        let (candidate, degraded) = self
            .materialize(tag, address, reputation, total_ratings)
            .await;

        Ok(Resolution {
            candidate,
            tag,
            degraded,
            candidate_count,
        })
    }

    /// Direct capability lookup, then paginated discovery as fallback.
    async fn discover(&self, tag: CapabilityTag) -> Result<Vec<String>> {
        let direct = self.registry.discover_by_capability(tag.as_str()).await?;
        if !direct.is_empty() {
            return Ok(direct);
        }
        debug!(%tag, "Direct lookup empty, trying paginated discovery");
        self.registry.discover_paginated(0, DISCOVERY_PAGE_LIMIT).await
    }

    /// Score every candidate, then stable-sort descending by
    /// reputation. A failed reputation lookup scores zero; absence of
    /// ratings is not disqualification.
    async fn rank(&self, addresses: Vec<String>) -> Vec<(String, f64, u64)> {
        let mut scored = Vec::with_capacity(addresses.len());
        for address in addresses {
            let (reputation, total_ratings) =
                match self.registry.get_reputation(&address).await {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(%address, error = %e, "Reputation lookup failed, scoring zero");
                        (0.0, 0)
                    }
                };
            scored.push((address, reputation, total_ratings));
        }
        // sort_by is stable: equal scores keep registry return order
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
    }

    /// Fill in endpoint, payee and price from the agent card, falling
    /// back to the capability defaults when the card is unusable.
    async fn materialize(
        &self,
        tag: CapabilityTag,
        address: String,
        reputation: f64,
        total_ratings: u64,
    ) -> (ProviderCandidate, bool) {
        match self.fetch_card(&address).await {
            Ok((card_cid, card)) => {
                if let Some(endpoint) = card.endpoint_for(tag) {
                    let candidate = ProviderCandidate {
                        endpoint: endpoint.to_string(),
                        price: card.price_for(tag),
                        pay_to: card.pay_to.clone(),
                        card_cid: Some(card_cid),
                        address,
                        reputation,
                        total_ratings,
                    };
                    return (candidate, false);
                }
                warn!(%address, %tag, "Agent card declares no endpoint for capability");
                (self.fallback(tag, address, reputation, total_ratings, Some(card_cid)), true)
            }
            Err(e) => {
                warn!(%address, error = %e, "Agent card fetch failed, using fallback route");
                (self.fallback(tag, address, reputation, total_ratings, None), true)
            }
        }
    }

    async fn fetch_card(&self, address: &str) -> Result<(String, AgentCard)> {
        let card_cid = self.registry.get_agent_card(address).await?;
        let blob = self.storage.download(&card_cid).await?;
        let card: AgentCard = serde_json::from_slice(&blob.data)
            .map_err(|e| AgoraError::StorageCallFailed(format!("bad agent card: {}", e)))?;
        Ok((card_cid, card))
    }

    fn fallback(
        &self,
        tag: CapabilityTag,
        address: String,
        reputation: f64,
        total_ratings: u64,
        card_cid: Option<String>,
    ) -> ProviderCandidate {
        ProviderCandidate {
            endpoint: tag.fallback_endpoint().to_string(),
            price: tag.fallback_price().to_string(),
            pay_to: address.clone(),
            card_cid,
            address,
            reputation,
            total_ratings,
        }
    }
}
