//! Provider candidates and the agent card metadata document

use crate::capability::CapabilityTag;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A fully resolved provider for one task. Fetched fresh per task and
/// never cached across tasks since reputation may change between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCandidate {
    /// On-chain address of the provider
    pub address: String,
    /// Reputation score on a 0-5 scale
    pub reputation: f64,
    /// Total number of ratings behind the score
    pub total_ratings: u64,
    /// Content address of the provider's agent card, if known
    pub card_cid: Option<String>,
    /// Service endpoint the paid request goes to
    pub endpoint: String,
    /// Payment recipient address
    pub pay_to: String,
    /// Unit price, e.g. "$0.001"
    pub price: String,
}

/// Off-chain metadata document referenced by a provider's card CID.
///
/// `endpoints` and `prices` are keyed by capability tag string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCard {
    #[serde(default)]
    pub name: Option<String>,
    pub endpoints: HashMap<String, String>,
    #[serde(rename = "payTo")]
    pub pay_to: String,
    #[serde(default)]
    pub prices: HashMap<String, String>,
}

impl AgentCard {
    /// Endpoint for a capability, if this card declares one.
    pub fn endpoint_for(&self, tag: CapabilityTag) -> Option<&str> {
        self.endpoints.get(tag.as_str()).map(String::as_str)
    }

    /// Price for a capability, falling back to the tag default.
    pub fn price_for(&self, tag: CapabilityTag) -> String {
        self.prices
            .get(tag.as_str())
            .cloned()
            .unwrap_or_else(|| tag.fallback_price().to_string())
    }
}

/// On-chain rating event tying a rater, target, score and proof CID.
/// Posted at most once per task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationRecord {
    pub target: String,
    pub rating: u8,
    pub comment: String,
    #[serde(rename = "proofCid")]
    pub proof_cid: String,
}
