use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,

    // Task pipeline
    pub tasks_started: IntCounter,
    pub tasks_completed: IntCounter,
    pub tasks_failed: IntCounter,
    pub task_duration: Histogram,

    // Payment exchange
    pub payments_settled: IntCounter,

    // Reputation
    pub reputation_posts: IntCounter,
    pub reputation_skips: IntCounter,

    // Event streaming
    pub events_emitted_total: IntCounter,
    pub sse_connections: IntGauge,
    pub sse_messages_sent: IntCounter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Arc::new(Registry::new());

        let tasks_started =
            IntCounter::new("agora_tasks_started_total", "Total tasks accepted").unwrap();
        let tasks_completed =
            IntCounter::new("agora_tasks_completed_total", "Total tasks completed").unwrap();
        let tasks_failed =
            IntCounter::new("agora_tasks_failed_total", "Total tasks failed").unwrap();
        let task_duration = Histogram::with_opts(HistogramOpts::new(
            "agora_task_duration_seconds",
            "End-to-end task pipeline duration",
        ))
        .unwrap();

        let payments_settled = IntCounter::new(
            "agora_payments_settled_total",
            "Paid exchanges with a settlement reference",
        )
        .unwrap();

        let reputation_posts = IntCounter::new(
            "agora_reputation_posts_total",
            "Reputation ratings posted on-chain",
        )
        .unwrap();
        let reputation_skips = IntCounter::new(
            "agora_reputation_skips_total",
            "Reputation posts skipped (cooldown or eligibility failure)",
        )
        .unwrap();

        let events_emitted_total = IntCounter::new(
            "agora_events_emitted_total",
            "Total task events emitted to subscribers",
        )
        .unwrap();
        let sse_connections =
            IntGauge::new("agora_sse_connections", "Active SSE connections").unwrap();
        let sse_messages_sent =
            IntCounter::new("agora_sse_messages_sent_total", "Total SSE messages sent").unwrap();

        registry.register(Box::new(tasks_started.clone())).unwrap();
        registry
            .register(Box::new(tasks_completed.clone()))
            .unwrap();
        registry.register(Box::new(tasks_failed.clone())).unwrap();
        registry.register(Box::new(task_duration.clone())).unwrap();
        registry
            .register(Box::new(payments_settled.clone()))
            .unwrap();
        registry
            .register(Box::new(reputation_posts.clone()))
            .unwrap();
        registry
            .register(Box::new(reputation_skips.clone()))
            .unwrap();
        registry
            .register(Box::new(events_emitted_total.clone()))
            .unwrap();
        registry
            .register(Box::new(sse_connections.clone()))
            .unwrap();
        registry
            .register(Box::new(sse_messages_sent.clone()))
            .unwrap();

        Self {
            registry,
            tasks_started,
            tasks_completed,
            tasks_failed,
            task_duration,
            payments_settled,
            reputation_posts,
            reputation_skips,
            events_emitted_total,
            sse_connections,
            sse_messages_sent,
        }
    }

    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }
}
