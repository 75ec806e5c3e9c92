use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use grounded_core::{
    warning, GeneratedSection, GenerationResult, GroundedError, IntentClassification, QueryIntent,
    RegenerationResult, Result, RetrievalMetadata, RetrievalType, SourceRef,
};
use grounded_rag::{
    assemble, assess_retrieval, build_regeneration_prompt, build_suggested_questions_prompt,
    check_retrieval_quality, classify_intent, parse_questions, retrieve_diverse,
    retrieve_similarity, validate_output, DiverseParams, PromptSource, RetrievalConfidenceLevel,
    SimilarityParams, LOW_CONFIDENCE_SUFFIX,
};

use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default)]
    pub document_ids: Option<Vec<Uuid>>,
    #[serde(default)]
    pub escalate_coverage: bool,
    #[serde(default)]
    pub intent_override: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegenerateRequest {
    pub section_id: String,
    pub original_content: String,
    #[serde(default)]
    pub refinement_prompt: Option<String>,
    #[serde(default)]
    pub document_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuggestionsRequest {
    #[serde(default)]
    pub document_ids: Option<Vec<Uuid>>,
    #[serde(default = "default_num_questions")]
    pub num_questions: usize,
}

fn default_num_questions() -> usize {
    5
}

#[derive(Debug, Clone, Serialize)]
pub struct SuggestionsResult {
    pub questions: Vec<String>,
    pub source_documents: Vec<Uuid>,
    pub generation_time_ms: f64,
}

/// The top-level pipeline: intent -> retrieval -> prompt -> generation ->
/// validation. Persistence is not involved; generation is stateless.
pub async fn run_generate(state: &Arc<AppState>, req: GenerateRequest) -> Result<GenerationResult> {
    let start = Instant::now();
    let generation_id = Uuid::new_v4();

    if req.prompt.trim().is_empty() {
        return Err(GroundedError::InputInvalid("prompt must not be empty".into()));
    }

    let intent = resolve_intent(req.intent_override.as_deref(), &req.prompt)?;
    let eligible = state.eligible_documents(req.document_ids.as_deref()).await;

    info!(
        generation_id = %generation_id,
        intent = intent.intent.as_str(),
        retrieval = intent.suggested_retrieval.as_str(),
        eligible = eligible.len(),
        "generation started"
    );

    let (sources, mut metadata, coverage_summary, prompt_sources) = {
        let store = state.store.read().await;
        let (sources, metadata) = match intent.suggested_retrieval {
            RetrievalType::Diverse => {
                let (sources, metadata, _) = retrieve_diverse(
                    &store,
                    &state.embedder,
                    &req.prompt,
                    Some(&eligible[..]),
                    DiverseParams {
                        target_pct: state.config.default_coverage_pct,
                        max_pct: state.config.max_coverage_pct,
                        escalate: req.escalate_coverage,
                    },
                )
                .await?;
                (sources, metadata)
            }
            RetrievalType::Similarity => {
                retrieve_similarity(
                    &store,
                    &state.embedder,
                    &req.prompt,
                    Some(&eligible[..]),
                    SimilarityParams {
                        top_k: state.config.top_k,
                        threshold: state.config.similarity_threshold,
                    },
                )
                .await?
            }
        };
        let coverage_summary = metadata
            .coverage
            .as_ref()
            .map(|c| c.summary.clone())
            .unwrap_or_default();
        let prompt_sources = resolve_prompt_sources(&store, &sources);
        (sources, metadata, coverage_summary, prompt_sources)
    };
    metadata.intent = Some(intent.clone());

    let quality_warnings = check_retrieval_quality(&sources);
    let retrieval_confidence = assess_retrieval(&sources, metadata.coverage.as_ref());
    let (mut system_prompt, user_prompt) =
        assemble(&intent, &req.prompt, &prompt_sources, &coverage_summary);
    if retrieval_confidence.level == RetrievalConfidenceLevel::Low {
        system_prompt.push('\n');
        system_prompt.push_str(LOW_CONFIDENCE_SUFFIX);
    }
    info!(
        retrieval_confidence = ?retrieval_confidence.level,
        avg_relevance = retrieval_confidence.avg_relevance,
        high_quality = retrieval_confidence.high_quality_count,
        "retrieval assessed"
    );

    let model = state.config.model_for_intent(intent.intent).to_string();
    let response = state.llm.generate(&system_prompt, &user_prompt, &model).await?;

    let mut sections = validate_output(&response, intent.intent, &sources, &generation_id.to_string());
    annotate_sections(&mut sections, &quality_warnings, &metadata, &intent);

    let total_sources_used = distinct_documents(&sources);
    let generation_time_ms = start.elapsed().as_secs_f64() * 1000.0;
    info!(
        generation_id = %generation_id,
        sections = sections.len(),
        sources = sources.len(),
        model,
        time_ms = generation_time_ms,
        "generation completed"
    );

    Ok(GenerationResult {
        generation_id,
        sections,
        retrieval_metadata: metadata,
        total_sources_used,
        generation_time_ms,
        model_used: model,
        created_at: Utc::now(),
    })
}

/// Re-run retrieval and generation for one section. The replacement always
/// comes back with `is_user_edited = false`.
pub async fn run_regenerate(
    state: &Arc<AppState>,
    req: RegenerateRequest,
) -> Result<RegenerationResult> {
    let start = Instant::now();

    if req.original_content.trim().is_empty() {
        return Err(GroundedError::InputInvalid(
            "original_content must not be empty".into(),
        ));
    }

    let query = req
        .refinement_prompt
        .clone()
        .unwrap_or_else(|| head_chars(&req.original_content, 500));
    let eligible = state.eligible_documents(req.document_ids.as_deref()).await;

    let (sources, metadata, prompt_sources) = {
        let store = state.store.read().await;
        let (sources, metadata) = retrieve_similarity(
            &store,
            &state.embedder,
            &query,
            Some(&eligible[..]),
            SimilarityParams {
                top_k: state.config.top_k,
                threshold: state.config.similarity_threshold,
            },
        )
        .await?;
        let prompt_sources = resolve_prompt_sources(&store, &sources);
        (sources, metadata, prompt_sources)
    };

    let (system_prompt, user_prompt) = build_regeneration_prompt(
        &req.original_content,
        &prompt_sources,
        req.refinement_prompt.as_deref(),
    );
    let model = state.config.model_for_intent(QueryIntent::Writing).to_string();
    let response = state.llm.generate(&system_prompt, &user_prompt, &model).await?;

    let mut sections = validate_output(&response, QueryIntent::Writing, &sources, &req.section_id);
    let mut section = sections.remove(0);
    section.id = req.section_id.clone();
    section.is_user_edited = false;
    for warning_text in check_retrieval_quality(&sources) {
        section.warnings.push(warning_text);
    }

    Ok(RegenerationResult {
        section,
        retrieval_metadata: metadata,
        generation_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        model_used: model,
    })
}

/// Suggested questions derived from a generic sweep of the document set.
pub async fn run_suggestions(
    state: &Arc<AppState>,
    req: SuggestionsRequest,
) -> Result<SuggestionsResult> {
    let start = Instant::now();
    let num_questions = req.num_questions.clamp(1, 10);
    let eligible = state.eligible_documents(req.document_ids.as_deref()).await;

    let (sources, prompt_sources) = {
        let store = state.store.read().await;
        let (sources, _) = retrieve_similarity(
            &store,
            &state.embedder,
            "main topics and key information",
            Some(&eligible[..]),
            SimilarityParams {
                top_k: state.config.top_k,
                threshold: 0.0,
            },
        )
        .await?;
        let prompt_sources = resolve_prompt_sources(&store, &sources);
        (sources, prompt_sources)
    };

    if sources.is_empty() {
        return Ok(SuggestionsResult {
            questions: vec![
                "What topics would you like to explore? Upload documents to get started."
                    .to_string(),
            ],
            source_documents: Vec::new(),
            generation_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        });
    }

    let (system_prompt, user_prompt) =
        build_suggested_questions_prompt(&prompt_sources, num_questions);
    let model = state.config.model_for_intent(QueryIntent::Qa).to_string();
    let response = state.llm.generate(&system_prompt, &user_prompt, &model).await?;

    let mut questions = parse_questions(&response);
    if questions.is_empty() {
        questions = response
            .lines()
            .map(str::trim)
            .filter(|line| line.ends_with('?'))
            .map(|line| line.to_string())
            .take(num_questions)
            .collect();
    }
    questions.truncate(num_questions);

    Ok(SuggestionsResult {
        questions,
        source_documents: distinct_document_ids(&sources),
        generation_time_ms: start.elapsed().as_secs_f64() * 1000.0,
    })
}

fn resolve_intent(
    intent_override: Option<&str>,
    prompt: &str,
) -> Result<IntentClassification> {
    match intent_override {
        Some(value) => IntentClassification::from_override(value).ok_or_else(|| {
            GroundedError::InputInvalid(format!(
                "unknown intent override '{value}'; expected analysis, qa, or writing"
            ))
        }),
        None => Ok(classify_intent(prompt)),
    }
}

/// Prompts need the full chunk text, not the truncated excerpt carried by
/// the source reference.
pub fn resolve_prompt_sources(
    store: &grounded_rag::VectorStore,
    sources: &[SourceRef],
) -> Vec<PromptSource> {
    sources
        .iter()
        .map(|source| PromptSource {
            title: source.title.clone(),
            text: store
                .chunk_text(source.chunk_id)
                .map(|t| t.to_string())
                .unwrap_or_else(|| source.excerpt.clone()),
        })
        .collect()
}

fn annotate_sections(
    sections: &mut [GeneratedSection],
    quality_warnings: &[String],
    metadata: &RetrievalMetadata,
    intent: &IntentClassification,
) {
    let no_context = metadata
        .warnings
        .iter()
        .find(|w| w.starts_with(warning::NO_CONTEXT))
        .cloned();
    let low_coverage_note = metadata.coverage.as_ref().and_then(|coverage| {
        (intent.intent == QueryIntent::Analysis && coverage.coverage_percentage < 20.0).then(|| {
            format!(
                "analysis based on ~{:.0}% document coverage; treat conclusions as exploratory",
                coverage.coverage_percentage
            )
        })
    });
    for section in sections.iter_mut() {
        section.warnings.extend(quality_warnings.iter().cloned());
        if let Some(no_context) = &no_context {
            section.warnings.push(no_context.clone());
        }
        if let Some(note) = &low_coverage_note {
            section.warnings.push(note.clone());
        }
    }
}

fn distinct_documents(sources: &[SourceRef]) -> usize {
    distinct_document_ids(sources).len()
}

fn distinct_document_ids(sources: &[SourceRef]) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = Vec::new();
    for source in sources {
        if !ids.contains(&source.document_id) {
            ids.push(source.document_id);
        }
    }
    ids
}

fn head_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
