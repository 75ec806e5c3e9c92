use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::confidence::ConfidenceLevel;
use crate::coverage::RetrievalMetadata;
use crate::document::SourceRef;

/// A validated span of generated content. `sources` and `warnings` are always
/// present, possibly empty, so retrieval metadata is never silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedSection {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub content: String,
    pub sources: Vec<SourceRef>,
    pub confidence: ConfidenceLevel,
    pub warnings: Vec<String>,
    #[serde(default)]
    pub is_user_edited: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    pub generation_id: Uuid,
    pub sections: Vec<GeneratedSection>,
    pub retrieval_metadata: RetrievalMetadata,
    pub total_sources_used: usize,
    pub generation_time_ms: f64,
    pub model_used: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegenerationResult {
    pub section: GeneratedSection,
    pub retrieval_metadata: RetrievalMetadata,
    pub generation_time_ms: f64,
    pub model_used: String,
}

/// Warning kinds used across retrieval and validation. Surfaces may strip
/// the `kind:` prefix for display.
pub mod warning {
    pub const NO_SOURCES: &str = "no_sources";
    pub const NO_CONTEXT: &str = "no_context";
    pub const ZERO_CITATIONS: &str = "zero_citations";
    pub const INVALID_CITATIONS_REMOVED: &str = "invalid_citations_removed";
    pub const INSUFFICIENT_CONTEXT: &str = "insufficient_context";
    pub const LOW_RELEVANCE_SOURCES: &str = "low_relevance_sources";
    pub const SOURCE_OVER_RELIANCE: &str = "source_over_reliance";

    pub fn format(kind: &str, detail: &str) -> String {
        format!("{kind}: {detail}")
    }
}
