use agora_types::{ReputationRecord, Result};
use async_trait::async_trait;

/// Read/write contract surface of the capability registry and
/// reputation ledger.
///
/// Implementations must be stateless per call so a single client can be
/// shared across concurrent tasks.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Addresses of providers registered under a capability tag.
    async fn discover_by_capability(&self, tag: &str) -> Result<Vec<String>>;

    /// Paginated discovery across all providers; fallback path when the
    /// direct capability lookup returns nothing.
    async fn discover_paginated(&self, offset: u64, limit: u64) -> Result<Vec<String>>;

    /// Reputation score (0-5) and total rating count for a provider.
    async fn get_reputation(&self, address: &str) -> Result<(f64, u64)>;

    /// Content address of the provider's agent card document.
    async fn get_agent_card(&self, address: &str) -> Result<String>;

    /// Whether `rater` may currently rate `target`, and if not, the unix
    /// time at which the cooldown window ends.
    async fn can_rate(&self, rater: &str, target: &str) -> Result<(bool, u64)>;

    /// Post a rating record; returns the settlement transaction hash.
    async fn post_reputation(&self, record: &ReputationRecord) -> Result<String>;
}
