//! Task identity, progress events and terminal results

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque unique task identity. Never reused after a terminal event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// One pipeline transition, broadcast at most once.
///
/// Step numbers within a task are non-decreasing; `live_log` is the full
/// accumulated log up to and including this event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepEvent {
    #[serde(rename = "stepNum")]
    pub step_num: u32,
    pub msg: String,
    #[serde(rename = "liveLog")]
    pub live_log: Vec<String>,
}

/// Terminal success payload. Capability-specific fields are optional and
/// absent for the capabilities they do not apply to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    pub service: String,
    #[serde(rename = "liveLog")]
    pub live_log: Vec<String>,

    // analysis
    #[serde(rename = "resultCID", skip_serializing_if = "Option::is_none")]
    pub result_cid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insights: Option<Vec<String>>,

    // storage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
    #[serde(rename = "fileName", skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(rename = "fileSize", skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,

    // retrieval
    #[serde(rename = "retrievedCID", skip_serializing_if = "Option::is_none")]
    pub retrieved_cid: Option<String>,
    #[serde(
        rename = "retrievedContentType",
        skip_serializing_if = "Option::is_none"
    )]
    pub retrieved_content_type: Option<String>,
    #[serde(
        rename = "retrievedDataBase64",
        skip_serializing_if = "Option::is_none"
    )]
    pub retrieved_data_base64: Option<String>,

    // best-effort, never required for success
    #[serde(rename = "reputationTxHash", skip_serializing_if = "Option::is_none")]
    pub reputation_tx_hash: Option<String>,
}

/// Terminal failure payload: human-readable message plus the log
/// accumulated up to the failure point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResult {
    pub error: String,
    #[serde(rename = "liveLog")]
    pub live_log: Vec<String>,
}

/// Everything a task observer can see on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskEvent {
    Step(StepEvent),
    Done(TaskResult),
    Error(ErrorResult),
}

impl TaskEvent {
    /// SSE event name for this variant.
    pub fn event_type(&self) -> &'static str {
        match self {
            TaskEvent::Step(_) => "step",
            TaskEvent::Done(_) => "done",
            TaskEvent::Error(_) => "error",
        }
    }

    /// Whether this event ends the stream for its task.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskEvent::Step(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_roundtrip() {
        let id = TaskId::new();
        let parsed = TaskId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
        assert!(TaskId::parse("not-a-uuid").is_none());
    }

    #[test]
    fn test_result_omits_absent_fields() {
        let result = TaskResult {
            success: true,
            service: "store".into(),
            live_log: vec!["done".into()],
            cid: Some("bafy123".into()),
            file_size: Some(10),
            ..Default::default()
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["cid"], "bafy123");
        assert_eq!(json["fileSize"], 10);
        assert!(json.get("resultCID").is_none());
        assert!(json.get("retrievedDataBase64").is_none());
    }

    #[test]
    fn test_event_types() {
        let step = TaskEvent::Step(StepEvent {
            step_num: 1,
            msg: "m".into(),
            live_log: vec![],
        });
        assert_eq!(step.event_type(), "step");
        assert!(!step.is_terminal());

        let err = TaskEvent::Error(ErrorResult {
            error: "boom".into(),
            live_log: vec![],
        });
        assert_eq!(err.event_type(), "error");
        assert!(err.is_terminal());
    }
}
