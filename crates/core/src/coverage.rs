use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::Region;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalType {
    Similarity,
    Diverse,
}

impl RetrievalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalType::Similarity => "similarity",
            RetrievalType::Diverse => "diverse",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentCoverage {
    pub document_id: Uuid,
    pub document_title: String,
    pub chunks_seen: usize,
    pub chunks_total: usize,
    pub regions_covered: Vec<Region>,
    pub regions_missing: Vec<Region>,
}

impl DocumentCoverage {
    pub fn coverage_percentage(&self) -> f32 {
        if self.chunks_total == 0 {
            return 0.0;
        }
        self.chunks_seen as f32 / self.chunks_total as f32 * 100.0
    }
}

/// Computed from retrieval, never guessed by the model. Injected into the
/// prompt so the model knows its own limits, and returned to the caller so
/// the surface can display them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageDescriptor {
    pub retrieval_type: RetrievalType,
    pub chunks_seen: usize,
    pub chunks_total: usize,
    pub coverage_percentage: f32,
    pub documents: BTreeMap<Uuid, DocumentCoverage>,
    pub blind_spots: Vec<String>,
    pub summary: String,
}

impl CoverageDescriptor {
    pub fn empty(retrieval_type: RetrievalType) -> Self {
        Self {
            retrieval_type,
            chunks_seen: 0,
            chunks_total: 0,
            coverage_percentage: 0.0,
            documents: BTreeMap::new(),
            blind_spots: vec!["No documents available".to_string()],
            summary: "No documents are available for retrieval.".to_string(),
        }
    }
}

/// Metadata about one retrieval call, kept for auditability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalMetadata {
    pub query: String,
    pub top_k: usize,
    pub similarity_threshold: f32,
    pub chunks_retrieved: usize,
    pub chunks_above_threshold: usize,
    pub retrieval_time_ms: f64,
    pub retrieval_type: RetrievalType,
    #[serde(default)]
    pub coverage: Option<CoverageDescriptor>,
    #[serde(default)]
    pub intent: Option<crate::intent::IntentClassification>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_descriptor_reports_blind_spot() {
        let coverage = CoverageDescriptor::empty(RetrievalType::Diverse);
        assert_eq!(coverage.chunks_seen, 0);
        assert_eq!(coverage.blind_spots.len(), 1);
    }

    #[test]
    fn document_coverage_percentage() {
        let cov = DocumentCoverage {
            document_id: Uuid::new_v4(),
            document_title: "t".into(),
            chunks_seen: 5,
            chunks_total: 20,
            regions_covered: vec![],
            regions_missing: vec![],
        };
        assert!((cov.coverage_percentage() - 25.0).abs() < 1e-5);
    }
}
