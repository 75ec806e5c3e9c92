use std::collections::{BTreeMap, HashMap, HashSet};

use uuid::Uuid;

use grounded_core::{
    region_for, CoverageDescriptor, DocumentChunk, DocumentCoverage, Region, RetrievalType,
};

/// Compute the coverage descriptor for a retrieval over `eligible` chunks
/// (all chunks of every eligible document) given the chunk ids actually
/// selected. Region membership is the ordinal tertile within each document,
/// so the result is reproducible from the chunk table alone.
pub fn compute_coverage(
    retrieval_type: RetrievalType,
    eligible: &[&DocumentChunk],
    selected: &HashSet<Uuid>,
) -> CoverageDescriptor {
    if eligible.is_empty() {
        return CoverageDescriptor::empty(retrieval_type);
    }

    let mut by_document: HashMap<Uuid, Vec<&DocumentChunk>> = HashMap::new();
    for chunk in eligible {
        by_document.entry(chunk.document_id).or_default().push(chunk);
    }

    let mut documents: BTreeMap<Uuid, DocumentCoverage> = BTreeMap::new();
    let mut blind_spots: Vec<String> = Vec::new();
    let mut ordered_ids: Vec<Uuid> = by_document.keys().copied().collect();
    ordered_ids.sort();

    for document_id in ordered_ids {
        let chunks = &by_document[&document_id];
        let total = chunks.len();
        let title = chunks
            .first()
            .map(|c| c.title.clone())
            .unwrap_or_else(|| document_id.to_string());

        let mut covered: HashSet<Region> = HashSet::new();
        let mut seen = 0usize;
        for chunk in chunks.iter() {
            if selected.contains(&chunk.id) {
                seen += 1;
                covered.insert(region_for(chunk.ordinal, total));
            }
        }

        let regions_covered: Vec<Region> = Region::ALL
            .iter()
            .copied()
            .filter(|r| covered.contains(r))
            .collect();
        let regions_missing: Vec<Region> = Region::ALL
            .iter()
            .copied()
            .filter(|r| !covered.contains(r))
            .collect();

        if seen == 0 {
            blind_spots.push(format!("{title} not sampled"));
        } else {
            for region in &regions_missing {
                blind_spots.push(format!("{} of {title} not sampled", region.as_str()));
            }
        }

        documents.insert(
            document_id,
            DocumentCoverage {
                document_id,
                document_title: title,
                chunks_seen: seen,
                chunks_total: total,
                regions_covered,
                regions_missing,
            },
        );
    }

    let chunks_total = eligible.len();
    let chunks_seen = documents.values().map(|d| d.chunks_seen).sum();
    let coverage_percentage = if chunks_total > 0 {
        chunks_seen as f32 / chunks_total as f32 * 100.0
    } else {
        0.0
    };
    let summary = build_summary(chunks_seen, chunks_total, coverage_percentage, documents.len());

    CoverageDescriptor {
        retrieval_type,
        chunks_seen,
        chunks_total,
        coverage_percentage,
        documents,
        blind_spots,
        summary,
    }
}

/// The first sentence is injected verbatim into the system prompt; the rest
/// calibrates how assertive the model is allowed to be at this coverage.
fn build_summary(seen: usize, total: usize, pct: f32, doc_count: usize) -> String {
    let mut parts = vec![format!(
        "You are seeing ~{pct:.0}% of the document set ({seen} of {total} chunks across {doc_count} document(s))."
    )];
    if pct < 15.0 {
        parts.push(
            "With less than 15% coverage, provide only exploratory observations and use \
             tentative language such as 'appears to indicate' or 'based on a limited view'."
                .to_string(),
        );
    } else if pct < 40.0 {
        parts.push(
            "With moderate coverage, you can identify patterns but should note potential \
             blind spots."
                .to_string(),
        );
    } else {
        parts.push(
            "With broader coverage, you can make more confident observations while still \
             citing sources."
                .to_string(),
        );
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(document_id: Uuid, ordinal: usize, title: &str) -> DocumentChunk {
        DocumentChunk {
            id: Uuid::new_v4(),
            document_id,
            ordinal,
            text: format!("chunk {ordinal}"),
            page: None,
            section_title: None,
            title: title.to_string(),
            filename: format!("{title}.txt"),
        }
    }

    #[test]
    fn full_selection_has_no_blind_spots() {
        let doc = Uuid::new_v4();
        let chunks: Vec<DocumentChunk> = (0..9).map(|i| chunk(doc, i, "a")).collect();
        let refs: Vec<&DocumentChunk> = chunks.iter().collect();
        let selected: HashSet<Uuid> = chunks.iter().map(|c| c.id).collect();
        let coverage = compute_coverage(RetrievalType::Diverse, &refs, &selected);
        assert!(coverage.blind_spots.is_empty());
        assert!((coverage.coverage_percentage - 100.0).abs() < 1e-4);
    }

    #[test]
    fn missing_region_is_a_blind_spot() {
        let doc = Uuid::new_v4();
        let chunks: Vec<DocumentChunk> = (0..9).map(|i| chunk(doc, i, "handbook")).collect();
        let refs: Vec<&DocumentChunk> = chunks.iter().collect();
        // Select only intro chunks (ordinals 0..=2 of 9).
        let selected: HashSet<Uuid> = chunks.iter().take(3).map(|c| c.id).collect();
        let coverage = compute_coverage(RetrievalType::Diverse, &refs, &selected);
        assert!(coverage
            .blind_spots
            .contains(&"middle of handbook not sampled".to_string()));
        assert!(coverage
            .blind_spots
            .contains(&"conclusion of handbook not sampled".to_string()));
    }

    #[test]
    fn unsampled_document_is_reported_once() {
        let doc_a = Uuid::new_v4();
        let doc_b = Uuid::new_v4();
        let chunks_a: Vec<DocumentChunk> = (0..3).map(|i| chunk(doc_a, i, "alpha")).collect();
        let chunks_b: Vec<DocumentChunk> = (0..3).map(|i| chunk(doc_b, i, "beta")).collect();
        let refs: Vec<&DocumentChunk> = chunks_a.iter().chain(chunks_b.iter()).collect();
        let selected: HashSet<Uuid> = chunks_a.iter().map(|c| c.id).collect();
        let coverage = compute_coverage(RetrievalType::Similarity, &refs, &selected);
        assert!(coverage.blind_spots.contains(&"beta not sampled".to_string()));
        assert!(!coverage
            .blind_spots
            .iter()
            .any(|b| b.contains("of beta")));
    }

    #[test]
    fn summary_declares_percentage() {
        let doc = Uuid::new_v4();
        let chunks: Vec<DocumentChunk> = (0..10).map(|i| chunk(doc, i, "a")).collect();
        let refs: Vec<&DocumentChunk> = chunks.iter().collect();
        let selected: HashSet<Uuid> = chunks.iter().take(5).map(|c| c.id).collect();
        let coverage = compute_coverage(RetrievalType::Diverse, &refs, &selected);
        assert!(coverage.summary.starts_with("You are seeing ~50%"));
    }

    #[test]
    fn empty_eligible_set_is_the_empty_descriptor() {
        let coverage = compute_coverage(RetrievalType::Similarity, &[], &HashSet::new());
        assert_eq!(coverage.chunks_total, 0);
        assert_eq!(coverage.blind_spots, vec!["No documents available".to_string()]);
    }
}
