use std::collections::{HashMap, HashSet};
use std::time::Instant;

use tracing::info;
use uuid::Uuid;

use grounded_core::{
    warning, CoverageDescriptor, DocumentChunk, Region, Result, RetrievalMetadata, RetrievalType,
    SourceRef,
};

use crate::coverage::compute_coverage;
use crate::embedding::EmbeddingClient;
use crate::store::VectorStore;

/// Region allocation for diverse sampling: intro 30%, middle 40%,
/// conclusion 30%.
const REGION_WEIGHTS: [(Region, f32); 3] = [
    (Region::Intro, 0.30),
    (Region::Middle, 0.40),
    (Region::Conclusion, 0.30),
];

/// Floor on the sample size so tiny targets still produce a usable spread.
const MIN_TARGET_CHUNKS: usize = 6;

#[derive(Debug, Clone, Copy)]
pub struct DiverseParams {
    pub target_pct: f32,
    pub max_pct: f32,
    pub escalate: bool,
}

/// Region-stratified sampling for analysis. The target count is a coverage
/// percentage of the eligible chunk population, allocated 30/40/30 across
/// intro/middle/conclusion; within a region chunks are ranked by similarity
/// to the query with ordinal as the tie-break, and under-populated regions
/// spill into their neighbors.
pub async fn retrieve_diverse(
    store: &VectorStore,
    embedder: &EmbeddingClient,
    query: &str,
    document_ids: Option<&[Uuid]>,
    params: DiverseParams,
) -> Result<(Vec<SourceRef>, RetrievalMetadata, CoverageDescriptor)> {
    let start = Instant::now();

    let pct = if params.escalate {
        (params.target_pct + 15.0).min(params.max_pct)
    } else {
        params.target_pct.min(params.max_pct)
    };

    let query_vector = embedder.embed(query).await?;
    let scored = store.score_all(&query_vector, document_ids);
    let total = scored.len();

    if total == 0 {
        let coverage = CoverageDescriptor::empty(RetrievalType::Diverse);
        let metadata = RetrievalMetadata {
            query: query.to_string(),
            top_k: 0,
            similarity_threshold: 0.0,
            chunks_retrieved: 0,
            chunks_above_threshold: 0,
            retrieval_time_ms: start.elapsed().as_secs_f64() * 1000.0,
            retrieval_type: RetrievalType::Diverse,
            coverage: Some(coverage.clone()),
            intent: None,
            warnings: vec![warning::format(
                warning::NO_CONTEXT,
                "no ready documents were eligible for retrieval",
            )],
        };
        return Ok((Vec::new(), metadata, coverage));
    }

    let ceiling = ((total as f32) * params.max_pct / 100.0).ceil() as usize;
    let target = (((total as f32) * pct / 100.0).ceil() as usize)
        .max(MIN_TARGET_CHUNKS)
        .min(ceiling.max(MIN_TARGET_CHUNKS))
        .min(total);

    // Per-document totals fix each chunk's region.
    let mut doc_totals: HashMap<Uuid, usize> = HashMap::new();
    for (chunk, _) in &scored {
        *doc_totals.entry(chunk.document_id).or_default() += 1;
    }

    let mut pools: HashMap<Region, Vec<(&DocumentChunk, f32)>> = HashMap::new();
    for (chunk, score) in &scored {
        let region = chunk.region(doc_totals[&chunk.document_id]);
        pools.entry(region).or_default().push((*chunk, *score));
    }
    for pool in pools.values_mut() {
        pool.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.ordinal.cmp(&b.0.ordinal))
                .then_with(|| a.0.document_id.cmp(&b.0.document_id))
        });
    }

    let allocations = allocate(target, &pools);

    let mut selected: Vec<(&DocumentChunk, f32)> = Vec::with_capacity(target);
    let mut taken: HashSet<Uuid> = HashSet::new();
    for (region, count) in &allocations {
        if let Some(pool) = pools.get(region) {
            for (chunk, score) in pool.iter().take(*count) {
                if taken.insert(chunk.id) {
                    selected.push((*chunk, *score));
                }
            }
        }
    }

    // Spill any remaining deficit into neighboring regions.
    if selected.len() < target {
        for (region, _) in REGION_WEIGHTS.iter() {
            for neighbor in spill_order(*region) {
                if selected.len() >= target {
                    break;
                }
                if let Some(pool) = pools.get(&neighbor) {
                    for (chunk, score) in pool.iter() {
                        if selected.len() >= target {
                            break;
                        }
                        if taken.insert(chunk.id) {
                            selected.push((*chunk, *score));
                        }
                    }
                }
            }
        }
    }

    // Stable reading order: by document, then ordinal.
    selected.sort_by(|a, b| {
        a.0.document_id
            .cmp(&b.0.document_id)
            .then_with(|| a.0.ordinal.cmp(&b.0.ordinal))
    });

    let sources: Vec<SourceRef> = selected
        .iter()
        .map(|(chunk, score)| SourceRef::from_chunk(chunk, score.max(0.0)))
        .collect();

    let eligible: Vec<&DocumentChunk> = scored.iter().map(|(chunk, _)| *chunk).collect();
    let selected_ids: HashSet<Uuid> = sources.iter().map(|s| s.chunk_id).collect();
    let coverage = compute_coverage(RetrievalType::Diverse, &eligible, &selected_ids);

    let retrieval_time_ms = start.elapsed().as_secs_f64() * 1000.0;
    info!(
        target,
        selected = sources.len(),
        coverage_pct = coverage.coverage_percentage,
        escalated = params.escalate,
        time_ms = retrieval_time_ms,
        "diverse retrieval completed"
    );

    let metadata = RetrievalMetadata {
        query: query.to_string(),
        top_k: target,
        similarity_threshold: 0.0,
        chunks_retrieved: sources.len(),
        chunks_above_threshold: sources.len(),
        retrieval_time_ms,
        retrieval_type: RetrievalType::Diverse,
        coverage: Some(coverage.clone()),
        intent: None,
        warnings: Vec::new(),
    };

    Ok((sources, metadata, coverage))
}

/// Largest-remainder allocation of the target across the three regions,
/// clipped to what each region actually holds. Each region's share deviates
/// from its weight by at most one, subject to availability.
fn allocate(target: usize, pools: &HashMap<Region, Vec<(&DocumentChunk, f32)>>) -> Vec<(Region, usize)> {
    let mut shares: Vec<(Region, usize, f32)> = REGION_WEIGHTS
        .iter()
        .map(|(region, weight)| {
            let exact = target as f32 * weight;
            (*region, exact.floor() as usize, exact - exact.floor())
        })
        .collect();
    let mut assigned: usize = shares.iter().map(|(_, base, _)| base).sum();
    // Hand out the remainder to the largest fractional parts, middle first
    // on ties to honor its larger weight.
    shares.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
    let mut idx = 0;
    while assigned < target && !shares.is_empty() {
        let len = shares.len();
        shares[idx % len].1 += 1;
        assigned += 1;
        idx += 1;
    }
    shares
        .into_iter()
        .map(|(region, count, _)| {
            let available = pools.get(&region).map(|p| p.len()).unwrap_or(0);
            (region, count.min(available))
        })
        .collect()
}

fn spill_order(region: Region) -> [Region; 2] {
    match region {
        Region::Intro => [Region::Middle, Region::Conclusion],
        Region::Middle => [Region::Intro, Region::Conclusion],
        Region::Conclusion => [Region::Middle, Region::Intro],
    }
}
