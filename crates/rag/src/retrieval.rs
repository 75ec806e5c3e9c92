use std::collections::HashSet;
use std::time::Instant;

use tracing::info;
use uuid::Uuid;

use grounded_core::{warning, Result, RetrievalMetadata, RetrievalType, SourceRef};

use crate::coverage::compute_coverage;
use crate::embedding::EmbeddingClient;
use crate::store::VectorStore;

#[derive(Debug, Clone, Copy)]
pub struct SimilarityParams {
    pub top_k: usize,
    pub threshold: f32,
}

/// Top-k similarity retrieval over the eligible documents. An empty store or
/// an empty eligible set yields an empty result with a retrieval warning,
/// never an error.
pub async fn retrieve_similarity(
    store: &VectorStore,
    embedder: &EmbeddingClient,
    query: &str,
    document_ids: Option<&[Uuid]>,
    params: SimilarityParams,
) -> Result<(Vec<SourceRef>, RetrievalMetadata)> {
    let start = Instant::now();

    let eligible: Vec<_> = match document_ids {
        Some(ids) => store
            .chunks()
            .iter()
            .filter(|c| ids.contains(&c.document_id))
            .collect(),
        None => store.chunks().iter().collect(),
    };

    if eligible.is_empty() {
        let metadata = RetrievalMetadata {
            query: query.to_string(),
            top_k: params.top_k,
            similarity_threshold: params.threshold,
            chunks_retrieved: 0,
            chunks_above_threshold: 0,
            retrieval_time_ms: start.elapsed().as_secs_f64() * 1000.0,
            retrieval_type: RetrievalType::Similarity,
            coverage: Some(compute_coverage(
                RetrievalType::Similarity,
                &eligible,
                &HashSet::new(),
            )),
            intent: None,
            warnings: vec![warning::format(
                warning::NO_CONTEXT,
                "no ready documents were eligible for retrieval",
            )],
        };
        return Ok((Vec::new(), metadata));
    }

    let query_vector = embedder.embed(query).await?;
    let hits = store.search(&query_vector, params.top_k, params.threshold, document_ids);

    let sources: Vec<SourceRef> = hits
        .iter()
        .map(|(chunk, score)| SourceRef::from_chunk(chunk, *score))
        .collect();
    let selected: HashSet<Uuid> = sources.iter().map(|s| s.chunk_id).collect();
    let coverage = compute_coverage(RetrievalType::Similarity, &eligible, &selected);

    let retrieval_time_ms = start.elapsed().as_secs_f64() * 1000.0;
    info!(
        results = sources.len(),
        top_k = params.top_k,
        threshold = params.threshold,
        time_ms = retrieval_time_ms,
        "similarity retrieval completed"
    );

    let mut warnings = Vec::new();
    if sources.is_empty() {
        warnings.push(warning::format(
            warning::NO_CONTEXT,
            "no chunks scored above the similarity threshold",
        ));
    }

    let metadata = RetrievalMetadata {
        query: query.to_string(),
        top_k: params.top_k,
        similarity_threshold: params.threshold,
        chunks_retrieved: sources.len(),
        chunks_above_threshold: sources.len(),
        retrieval_time_ms,
        retrieval_type: RetrievalType::Similarity,
        coverage: Some(coverage),
        intent: None,
        warnings,
    };

    Ok((sources, metadata))
}
