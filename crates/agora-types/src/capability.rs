//! Capability tags and intent classification
//!
//! A capability tag is the canonical name a provider registers under and
//! the key the coordinator routes payloads by. Free-text intents from the
//! start-task API are classified into a tag with fixed keyword rules.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical service capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CapabilityTag {
    /// CSV statistical analysis of a previously staged input
    #[serde(rename = "csv-analysis")]
    Analysis,
    /// Paid upload of raw file bytes to content-addressed storage
    #[serde(rename = "file-storage")]
    StorageUpload,
    /// Paid retrieval of a blob by content address
    #[serde(rename = "file-retrieval")]
    Retrieval,
}

impl CapabilityTag {
    /// Classify a free-text intent into a capability tag.
    ///
    /// The most specific keyword wins: analysis keywords are checked
    /// first, then retrieval, and anything else defaults to storage
    /// upload.
    pub fn classify(intent: &str) -> Self {
        let intent = intent.to_lowercase();
        if intent.contains("analy") || intent.contains("csv") {
            CapabilityTag::Analysis
        } else if intent.contains("retriev") || intent.contains("download") {
            CapabilityTag::Retrieval
        } else {
            CapabilityTag::StorageUpload
        }
    }

    /// Registry capability string providers register under.
    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityTag::Analysis => "csv-analysis",
            CapabilityTag::StorageUpload => "file-storage",
            CapabilityTag::Retrieval => "file-retrieval",
        }
    }

    /// Path suffix the provider serves this capability on.
    pub fn endpoint_suffix(&self) -> &'static str {
        match self {
            CapabilityTag::Analysis => "/analyze",
            CapabilityTag::StorageUpload => "/upload",
            CapabilityTag::Retrieval => "/retrieve",
        }
    }

    /// Hard-coded endpoint used when the provider's agent card cannot
    /// be fetched or parsed. Degraded but non-fatal.
    pub fn fallback_endpoint(&self) -> &'static str {
        match self {
            CapabilityTag::Analysis => "http://localhost:8001/analyze",
            CapabilityTag::StorageUpload => "http://localhost:8000/upload",
            CapabilityTag::Retrieval => "http://localhost:8000/retrieve",
        }
    }

    /// Default unit price matching the fallback endpoint.
    pub fn fallback_price(&self) -> &'static str {
        match self {
            CapabilityTag::Analysis => "$0.01",
            CapabilityTag::StorageUpload => "$0.001",
            CapabilityTag::Retrieval => "$0.0005",
        }
    }

    /// Fixed reputation comment posted after a successful delivery.
    pub fn reputation_comment(&self) -> &'static str {
        match self {
            CapabilityTag::Analysis => "Excellent analysis service",
            CapabilityTag::StorageUpload => "Excellent storage service",
            CapabilityTag::Retrieval => "Excellent retrieval service",
        }
    }
}

impl fmt::Display for CapabilityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_keywords_win() {
        assert_eq!(CapabilityTag::classify("analyze"), CapabilityTag::Analysis);
        assert_eq!(
            CapabilityTag::classify("please analyse my csv"),
            CapabilityTag::Analysis
        );
        assert_eq!(CapabilityTag::classify("CSV stats"), CapabilityTag::Analysis);
    }

    #[test]
    fn test_analysis_beats_retrieval_on_tie() {
        // "analyze the download" contains both keyword families; the
        // more specific analysis match wins.
        assert_eq!(
            CapabilityTag::classify("analyze the download"),
            CapabilityTag::Analysis
        );
    }

    #[test]
    fn test_retrieval_keywords() {
        assert_eq!(
            CapabilityTag::classify("retrieve"),
            CapabilityTag::Retrieval
        );
        assert_eq!(
            CapabilityTag::classify("download my file"),
            CapabilityTag::Retrieval
        );
    }

    #[test]
    fn test_default_is_storage_upload() {
        assert_eq!(CapabilityTag::classify("store"), CapabilityTag::StorageUpload);
        assert_eq!(
            CapabilityTag::classify("something else entirely"),
            CapabilityTag::StorageUpload
        );
        assert_eq!(CapabilityTag::classify(""), CapabilityTag::StorageUpload);
    }

    #[test]
    fn test_fallback_tables_are_consistent() {
        for tag in [
            CapabilityTag::Analysis,
            CapabilityTag::StorageUpload,
            CapabilityTag::Retrieval,
        ] {
            assert!(tag.fallback_endpoint().ends_with(tag.endpoint_suffix()));
            assert!(tag.fallback_price().starts_with('$'));
        }
    }
}
