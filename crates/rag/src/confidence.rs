use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use grounded_core::{CoverageDescriptor, SourceRef};

const HIGH_QUALITY_THRESHOLD: f32 = 0.70;

/// Appended to the system prompt when retrieval quality is poor, so the
/// model hedges instead of confabulating.
pub const LOW_CONFIDENCE_SUFFIX: &str = "\
IMPORTANT: the retrieved context has LOW relevance to this request.
- Be conservative in claims
- State uncertainty explicitly
- Prefer \"I don't have enough information\" over speculation
- Only make statements directly supported by the provided sources";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalConfidenceLevel {
    High,
    Medium,
    Low,
}

/// Aggregate quality of a retrieval, assessed before generation. Distinct
/// from section confidence, which grades the generated text afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalConfidence {
    pub level: RetrievalConfidenceLevel,
    pub avg_relevance: f32,
    pub max_relevance: f32,
    pub high_quality_count: usize,
    pub coverage_percentage: f32,
    /// 1 - (largest single-document share); higher means sources spread
    /// across more documents.
    pub source_diversity: f32,
    pub reasoning: String,
}

pub fn assess_retrieval(
    sources: &[SourceRef],
    coverage: Option<&CoverageDescriptor>,
) -> RetrievalConfidence {
    let coverage_percentage = coverage.map(|c| c.coverage_percentage).unwrap_or(0.0);
    if sources.is_empty() {
        return RetrievalConfidence {
            level: RetrievalConfidenceLevel::Low,
            avg_relevance: 0.0,
            max_relevance: 0.0,
            high_quality_count: 0,
            coverage_percentage,
            source_diversity: 0.0,
            reasoning: "No sources retrieved".to_string(),
        };
    }

    let scores: Vec<f32> = sources.iter().map(|s| s.relevance_score).collect();
    let avg_relevance = scores.iter().sum::<f32>() / scores.len() as f32;
    let max_relevance = scores.iter().cloned().fold(0.0f32, f32::max);
    let high_quality_count = scores
        .iter()
        .filter(|score| **score >= HIGH_QUALITY_THRESHOLD)
        .count();

    let mut doc_counts: HashMap<Uuid, usize> = HashMap::new();
    for source in sources {
        *doc_counts.entry(source.document_id).or_default() += 1;
    }
    let max_share = doc_counts.values().copied().max().unwrap_or(0) as f32 / sources.len() as f32;
    let source_diversity = 1.0 - max_share;

    let (level, reasoning) = if avg_relevance >= 0.75 && high_quality_count >= 3 {
        (
            RetrievalConfidenceLevel::High,
            "Strong relevance with multiple high-quality sources".to_string(),
        )
    } else if avg_relevance >= 0.55 && high_quality_count >= 1 {
        (
            RetrievalConfidenceLevel::Medium,
            "Moderate relevance with at least one strong source".to_string(),
        )
    } else {
        (
            RetrievalConfidenceLevel::Low,
            "Low relevance; generation will be prompted for uncertainty".to_string(),
        )
    };

    RetrievalConfidence {
        level,
        avg_relevance,
        max_relevance,
        high_quality_count,
        coverage_percentage,
        source_diversity,
        reasoning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(document_id: Uuid, score: f32) -> SourceRef {
        SourceRef {
            document_id,
            chunk_id: Uuid::new_v4(),
            excerpt: "excerpt".into(),
            relevance_score: score,
            title: "doc".into(),
            filename: "doc.txt".into(),
        }
    }

    #[test]
    fn empty_retrieval_is_low() {
        let confidence = assess_retrieval(&[], None);
        assert_eq!(confidence.level, RetrievalConfidenceLevel::Low);
        assert_eq!(confidence.reasoning, "No sources retrieved");
    }

    #[test]
    fn strong_sources_are_high() {
        let doc = Uuid::new_v4();
        let sources: Vec<SourceRef> = (0..4).map(|_| source(doc, 0.85)).collect();
        let confidence = assess_retrieval(&sources, None);
        assert_eq!(confidence.level, RetrievalConfidenceLevel::High);
        assert_eq!(confidence.high_quality_count, 4);
    }

    #[test]
    fn moderate_sources_are_medium() {
        let doc = Uuid::new_v4();
        let sources = vec![source(doc, 0.75), source(doc, 0.5), source(doc, 0.5)];
        let confidence = assess_retrieval(&sources, None);
        assert_eq!(confidence.level, RetrievalConfidenceLevel::Medium);
    }

    #[test]
    fn weak_sources_are_low() {
        let doc = Uuid::new_v4();
        let sources: Vec<SourceRef> = (0..5).map(|_| source(doc, 0.3)).collect();
        let confidence = assess_retrieval(&sources, None);
        assert_eq!(confidence.level, RetrievalConfidenceLevel::Low);
    }

    #[test]
    fn diversity_reflects_document_spread() {
        let doc_a = Uuid::new_v4();
        let doc_b = Uuid::new_v4();
        let spread = vec![source(doc_a, 0.8), source(doc_b, 0.8)];
        let confidence = assess_retrieval(&spread, None);
        assert!((confidence.source_diversity - 0.5).abs() < 1e-5);

        let concentrated = vec![source(doc_a, 0.8), source(doc_a, 0.8)];
        let confidence = assess_retrieval(&concentrated, None);
        assert!(confidence.source_diversity.abs() < 1e-5);
    }
}
