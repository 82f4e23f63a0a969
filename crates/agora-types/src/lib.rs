//! Shared types for the Agora paid-service coordinator.
//!
//! Everything here is plain data: capability classification, task and
//! event payloads, provider metadata and the error taxonomy shared by
//! every crate in the workspace.

pub mod capability;
pub mod error;
pub mod provider;
pub mod task;

pub use capability::CapabilityTag;
pub use error::{AgoraError, Result};
pub use provider::{AgentCard, ProviderCandidate, ReputationRecord};
pub use task::{ErrorResult, StepEvent, TaskEvent, TaskId, TaskResult};
