//! The task pipeline: discover a provider, stage inputs, run the paid
//! exchange, then record reputation.
//!
//! Each run publishes numbered step events through the broker and ends
//! with exactly one terminal event. Reputation posting is best-effort:
//! a cooldown or a registry write failure downgrades to a logged skip,
//! never a task failure.

use crate::broker::TaskBroker;
use crate::metrics::Metrics;
use agora_payment::{PaidDelivery, PaymentClient, PaymentSigner, PreparedPayload, ServiceOutcome};
use agora_registry::RegistryClient;
use agora_resolver::{ProviderResolver, Resolution};
use agora_storage::StorageClient;
use agora_types::{
    AgoraError, CapabilityTag, ErrorResult, ReputationRecord, Result, StepEvent, TaskEvent,
    TaskId, TaskResult,
};
use base64::Engine;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Fixed analysis instruction forwarded to providers.
const ANALYSIS_REQUIREMENTS: &str = "statistical summary and trend analysis";
const DEFAULT_RATING: u8 = 5;

/// An uploaded file captured from the start-task request.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub content_type: String,
}

/// Everything the pipeline needs from one start-task request.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub intent: String,
    pub file: Option<StagedFile>,
    pub cid: Option<String>,
}

/// Step numbers for each pipeline stage, per capability. Numbers are
/// non-decreasing within a run but need not be contiguous.
struct StepPlan {
    prepare: u32,
    pay: u32,
    delivered: u32,
    reputation: u32,
    done: u32,
}

impl StepPlan {
    fn for_tag(tag: CapabilityTag) -> Self {
        match tag {
            CapabilityTag::Analysis => Self {
                prepare: 3,
                pay: 4,
                delivered: 5,
                reputation: 5,
                done: 6,
            },
            CapabilityTag::StorageUpload | CapabilityTag::Retrieval => Self {
                prepare: 2,
                pay: 2,
                delivered: 3,
                reputation: 4,
                done: 4,
            },
        }
    }
}

/// Accumulates the live log and mirrors every line to subscribers.
struct Progress {
    broker: TaskBroker,
    metrics: Metrics,
    task_id: TaskId,
    log: Vec<String>,
}

impl Progress {
    fn step(&mut self, step_num: u32, msg: impl Into<String>) {
        let msg = msg.into();
        info!(task_id = %self.task_id, step_num, "{}", msg);
        self.log.push(msg.clone());
        self.metrics.events_emitted_total.inc();
        self.broker.publish(
            self.task_id,
            TaskEvent::Step(StepEvent {
                step_num,
                msg,
                live_log: self.log.clone(),
            }),
        );
    }
}

pub struct TaskCoordinator {
    resolver: ProviderResolver,
    payment: PaymentClient,
    registry: Arc<dyn RegistryClient>,
    storage: Arc<dyn StorageClient>,
    signer: Arc<dyn PaymentSigner>,
    broker: TaskBroker,
    metrics: Metrics,
}

impl TaskCoordinator {
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        storage: Arc<dyn StorageClient>,
        payment: PaymentClient,
        signer: Arc<dyn PaymentSigner>,
        broker: TaskBroker,
        metrics: Metrics,
    ) -> Self {
        Self {
            resolver: ProviderResolver::new(Arc::clone(&registry), Arc::clone(&storage)),
            payment,
            registry,
            storage,
            signer,
            broker,
            metrics,
        }
    }

    /// Drive a task to its terminal event. Infallible from the caller's
    /// perspective: failures become the task's `error` event.
    pub async fn run(&self, task_id: TaskId, request: TaskRequest) {
        let started = Instant::now();
        let mut progress = Progress {
            broker: self.broker.clone(),
            metrics: self.metrics.clone(),
            task_id,
            log: Vec::new(),
        };

        match self.pipeline(&mut progress, &request).await {
            Ok(result) => {
                self.metrics.tasks_completed.inc();
                self.metrics
                    .task_duration
                    .observe(started.elapsed().as_secs_f64());
                info!(%task_id, intent = %request.intent, "Task completed");
                self.broker.publish(task_id, TaskEvent::Done(result));
            }
            Err(e) => {
                let msg = e.to_string();
                error!(%task_id, intent = %request.intent, error = %msg, "Task failed");
                self.metrics.tasks_failed.inc();
                progress.log.push(format!("❌ {}", msg));
                self.broker.publish(
                    task_id,
                    TaskEvent::Error(ErrorResult {
                        error: msg,
                        live_log: progress.log.clone(),
                    }),
                );
            }
        }
    }

    async fn pipeline(&self, progress: &mut Progress, request: &TaskRequest) -> Result<TaskResult> {
        let tag = CapabilityTag::classify(&request.intent);
        let plan = StepPlan::for_tag(tag);

        // Discovering
        progress.step(
            1,
            format!("🔍 Discovering \"{}\" providers on the registry...", tag),
        );
        let resolution = self.resolver.resolve(&request.intent).await?;

        // Preparing. Inputs are validated before the stage's first log
        // line so a missing input fails with only the discovery line in
        // the log.
        let payload = self.prepare(progress, &plan, tag, request).await?;

        // Paying
        let provider = &resolution.candidate;
        progress.step(
            plan.pay,
            format!(
                "💳 Requesting service from {} at {} ({})",
                short_address(&provider.address),
                provider.endpoint,
                provider.price
            ),
        );
        let delivery = self
            .payment
            .execute(&provider.endpoint, &payload, self.signer.as_ref())
            .await?;
        if delivery.settlement_tx.is_some() {
            self.metrics.payments_settled.inc();
        }

        // Delivered
        let mut result = self.delivered(progress, &plan, request, &delivery);

        // RecordingReputation
        result.reputation_tx_hash = self
            .record_reputation(progress, &plan, tag, &resolution, &result)
            .await;

        // Done
        progress.step(plan.done, "🏆 Task complete");
        result.success = true;
        result.service = request.intent.clone();
        result.live_log = progress.log.clone();
        Ok(result)
    }

    /// Validate and stage the capability's input, producing the request
    /// payload for the paid exchange.
    async fn prepare(
        &self,
        progress: &mut Progress,
        plan: &StepPlan,
        tag: CapabilityTag,
        request: &TaskRequest,
    ) -> Result<PreparedPayload> {
        match tag {
            CapabilityTag::Analysis => {
                let file = request.file.as_ref().ok_or_else(|| {
                    AgoraError::InputMissing("a CSV file is required for analysis".to_string())
                })?;
                progress.step(
                    plan.prepare,
                    format!("📤 Staging input \"{}\" to storage...", file.file_name),
                );
                let input_cid = self
                    .storage
                    .upload(file.bytes.clone(), &file.file_name, &file.content_type)
                    .await?;
                progress.step(plan.prepare, format!("✅ Input staged at {}", input_cid));
                Ok(PreparedPayload::Analysis {
                    input_cid,
                    requirements: ANALYSIS_REQUIREMENTS.to_string(),
                })
            }
            CapabilityTag::StorageUpload => {
                let file = request.file.as_ref().ok_or_else(|| {
                    AgoraError::InputMissing("a file is required for storage".to_string())
                })?;
                progress.step(
                    plan.prepare,
                    format!(
                        "📦 Preparing \"{}\" ({} bytes) for paid storage",
                        file.file_name,
                        file.bytes.len()
                    ),
                );
                Ok(PreparedPayload::Upload {
                    bytes: file.bytes.clone(),
                    file_name: file.file_name.clone(),
                    content_type: file.content_type.clone(),
                })
            }
            CapabilityTag::Retrieval => {
                let cid = request
                    .cid
                    .as_deref()
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| {
                        AgoraError::InputMissing(
                            "a content address is required for retrieval".to_string(),
                        )
                    })?;
                progress.step(plan.prepare, format!("🔎 Preparing retrieval of {}", cid));
                Ok(PreparedPayload::Retrieve {
                    cid: cid.to_string(),
                })
            }
        }
    }

    /// Record the delivery into the result and emit the delivered line.
    fn delivered(
        &self,
        progress: &mut Progress,
        plan: &StepPlan,
        request: &TaskRequest,
        delivery: &PaidDelivery,
    ) -> TaskResult {
        let mut result = TaskResult::default();
        match &delivery.outcome {
            ServiceOutcome::Analysis {
                result_cid,
                summary,
                statistics,
                insights,
            } => {
                progress.step(
                    plan.delivered,
                    format!("⚙️ Analysis complete, result at {}", result_cid),
                );
                result.result_cid = Some(result_cid.clone());
                result.summary = summary.clone();
                result.statistics = statistics.clone();
                result.insights = insights.clone();
            }
            ServiceOutcome::Stored {
                cid,
                file_name,
                file_size,
            } => {
                progress.step(plan.delivered, format!("📤 File stored at {}", cid));
                result.cid = Some(cid.clone());
                result.file_name = file_name.clone().or_else(|| {
                    request.file.as_ref().map(|f| f.file_name.clone())
                });
                result.file_size = file_size
                    .or_else(|| request.file.as_ref().map(|f| f.bytes.len() as u64));
            }
            ServiceOutcome::Retrieved { data, content_type } => {
                progress.step(
                    plan.delivered,
                    format!("📥 Retrieved {} bytes ({})", data.len(), content_type),
                );
                result.retrieved_cid = request.cid.clone();
                result.retrieved_content_type = Some(content_type.clone());
                result.retrieved_data_base64 =
                    Some(base64::engine::general_purpose::STANDARD.encode(data));
            }
        }
        result
    }

    /// Best-effort reputation post. Returns the transaction hash when a
    /// rating lands; any other path logs and returns `None`.
    async fn record_reputation(
        &self,
        progress: &mut Progress,
        plan: &StepPlan,
        tag: CapabilityTag,
        resolution: &Resolution,
        result: &TaskResult,
    ) -> Option<String> {
        let target = &resolution.candidate.address;
        let rater = self.signer.address();

        match self.registry.can_rate(&rater, target).await {
            Ok((true, _)) => {
                progress.step(
                    plan.reputation,
                    format!(
                        "⭐ Posting {}-star rating for {}",
                        DEFAULT_RATING,
                        short_address(target)
                    ),
                );
                let record = ReputationRecord {
                    target: target.clone(),
                    rating: DEFAULT_RATING,
                    comment: tag.reputation_comment().to_string(),
                    proof_cid: proof_cid_for(result),
                };
                match self.registry.post_reputation(&record).await {
                    Ok(tx_hash) => {
                        self.metrics.reputation_posts.inc();
                        progress.step(
                            plan.reputation,
                            format!("✅ Reputation recorded, tx {}", tx_hash),
                        );
                        Some(tx_hash)
                    }
                    Err(e) => {
                        warn!(%target, error = %e, "Reputation post failed");
                        self.metrics.reputation_skips.inc();
                        progress.step(
                            plan.reputation,
                            format!("⚠️ Reputation post failed: {}", e),
                        );
                        None
                    }
                }
            }
            Ok((false, next_allowed)) => {
                self.metrics.reputation_skips.inc();
                progress.step(
                    plan.reputation,
                    format!(
                        "⏳ Rating cooldown active until {}, skipping reputation",
                        next_allowed
                    ),
                );
                None
            }
            Err(e) => {
                // Unknown eligibility is treated as a cooldown: never
                // risk a double rating.
                warn!(%target, error = %e, "Rating eligibility check failed");
                self.metrics.reputation_skips.inc();
                progress.step(
                    plan.reputation,
                    format!("⚠️ Eligibility check failed ({}), skipping reputation", e),
                );
                None
            }
        }
    }
}

/// Delivery artifact referenced by the reputation record.
fn proof_cid_for(result: &TaskResult) -> String {
    result
        .result_cid
        .as_deref()
        .or(result.cid.as_deref())
        .or(result.retrieved_cid.as_deref())
        .unwrap_or_default()
        .to_string()
}

fn short_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() > 10 {
        let head: String = chars[..6].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        address.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_plan_is_non_decreasing() {
        for tag in [
            CapabilityTag::Analysis,
            CapabilityTag::StorageUpload,
            CapabilityTag::Retrieval,
        ] {
            let plan = StepPlan::for_tag(tag);
            assert!(plan.prepare >= 1);
            assert!(plan.pay >= plan.prepare);
            assert!(plan.delivered >= plan.pay);
            assert!(plan.reputation >= plan.delivered || plan.reputation >= plan.pay);
            assert!(plan.done >= plan.delivered);
            assert!(plan.done >= plan.reputation);
        }
    }

    #[test]
    fn test_proof_cid_prefers_capability_artifact() {
        let analysis = TaskResult {
            result_cid: Some("bafyresult".into()),
            ..Default::default()
        };
        assert_eq!(proof_cid_for(&analysis), "bafyresult");

        let stored = TaskResult {
            cid: Some("QmStored".into()),
            ..Default::default()
        };
        assert_eq!(proof_cid_for(&stored), "QmStored");

        let retrieved = TaskResult {
            retrieved_cid: Some("QmBlob".into()),
            ..Default::default()
        };
        assert_eq!(proof_cid_for(&retrieved), "QmBlob");
    }

    #[test]
    fn test_short_address() {
        assert_eq!(
            short_address("0x1234567890abcdef1234567890abcdef12345678"),
            "0x1234...5678"
        );
        assert_eq!(short_address("0xabc"), "0xabc");
    }

    #[test]
    fn test_short_address_handles_multibyte_names() {
        // Registries may hand back ENS-style names, not hex
        assert_eq!(short_address("プロバイダー一号店です"), "プロバイダー...号店です");
        assert_eq!(short_address("短い名前"), "短い名前");
    }
}
