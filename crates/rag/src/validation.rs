use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use grounded_core::{
    cited_in_order, grade_confidence, sanitize_citations, warning, GeneratedSection, QueryIntent,
    SourceRef,
};

static SECTION_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^#{2,3}\s*(Observations|Synthesized Patterns|Contradictions|Questions Raised|Blind Spots)\s*$",
    )
    .expect("section heading regex")
});

const MIN_SOURCES_FOR_HIGH_CONFIDENCE: usize = 3;
const MIN_RELEVANCE_SCORE: f32 = 0.7;
const MAX_SINGLE_SOURCE_RELIANCE: f32 = 0.7;

/// The only place that sets `sources`, `confidence`, and `warnings` on
/// generated content. The generator's output is plain text until it passes
/// through here.
pub fn validate_output(
    content: &str,
    intent: QueryIntent,
    sources: &[SourceRef],
    generation_id: &str,
) -> Vec<GeneratedSection> {
    let raw_sections = if intent == QueryIntent::Analysis {
        split_analysis_sections(content)
    } else {
        vec![(None, content.to_string())]
    };

    raw_sections
        .into_iter()
        .enumerate()
        .map(|(idx, (title, body))| {
            build_section(&body, title, sources, &format!("{generation_id}-{idx}"))
        })
        .collect()
}

/// Split analysis output on the five contract headings. Output that ignored
/// the structure comes back as a single untitled section.
fn split_analysis_sections(content: &str) -> Vec<(Option<String>, String)> {
    let mut matches: Vec<(usize, usize, String)> = SECTION_HEADING
        .captures_iter(content)
        .map(|caps| {
            let whole = caps.get(0).expect("match");
            (whole.start(), whole.end(), caps[1].to_string())
        })
        .collect();
    if matches.is_empty() {
        return vec![(None, content.trim().to_string())];
    }
    matches.sort_by_key(|(start, _, _)| *start);

    let mut sections = Vec::new();
    let preamble = content[..matches[0].0].trim();
    if !preamble.is_empty() {
        sections.push((None, preamble.to_string()));
    }
    for (i, (_, end, title)) in matches.iter().enumerate() {
        let body_end = matches.get(i + 1).map(|(s, _, _)| *s).unwrap_or(content.len());
        let body = content[*end..body_end].trim();
        sections.push((Some(title.clone()), body.to_string()));
    }
    sections
}

fn build_section(
    body: &str,
    title: Option<String>,
    sources: &[SourceRef],
    section_id: &str,
) -> GeneratedSection {
    let (content, removed_any) = sanitize_citations(body, sources.len());

    let cited = cited_in_order(&content, sources.len());
    let mut section_sources: Vec<SourceRef> = Vec::new();
    let mut seen_chunks: HashSet<uuid::Uuid> = HashSet::new();
    for n in &cited {
        let source = &sources[n - 1];
        if seen_chunks.insert(source.chunk_id) {
            section_sources.push(source.clone());
        }
    }

    let confidence = grade_confidence(&content, cited.len());

    let mut warnings = Vec::new();
    if removed_any {
        warnings.push(warning::format(
            warning::INVALID_CITATIONS_REMOVED,
            "citations referencing non-existent sources were removed",
        ));
    }
    if sources.is_empty() {
        warnings.push(warning::format(
            warning::NO_SOURCES,
            "no sources were available for this generation",
        ));
    } else if cited.is_empty() {
        warnings.push(warning::format(
            warning::ZERO_CITATIONS,
            "the generated content cites none of the provided sources",
        ));
    }

    GeneratedSection {
        id: section_id.to_string(),
        title,
        content,
        sources: section_sources,
        confidence,
        warnings,
        is_user_edited: false,
    }
}

/// Pre-generation quality checks on the retrieved set. These become section
/// warnings so the caller sees retrieval weakness even when generation
/// succeeds.
pub fn check_retrieval_quality(sources: &[SourceRef]) -> Vec<String> {
    let mut warnings = Vec::new();

    if sources.is_empty() {
        warnings.push(warning::format(
            warning::INSUFFICIENT_CONTEXT,
            "no relevant sources found; generated content may not be well-supported",
        ));
        return warnings;
    }
    if sources.len() < MIN_SOURCES_FOR_HIGH_CONFIDENCE {
        warnings.push(warning::format(
            warning::INSUFFICIENT_CONTEXT,
            &format!(
                "only {} source(s) found; consider adding more relevant documents",
                sources.len()
            ),
        ));
    }

    let avg_relevance: f32 =
        sources.iter().map(|s| s.relevance_score).sum::<f32>() / sources.len() as f32;
    if avg_relevance < MIN_RELEVANCE_SCORE {
        warnings.push(warning::format(
            warning::LOW_RELEVANCE_SOURCES,
            &format!("average source relevance is low ({avg_relevance:.2})"),
        ));
    }

    let mut doc_counts: std::collections::HashMap<uuid::Uuid, usize> =
        std::collections::HashMap::new();
    for source in sources {
        *doc_counts.entry(source.document_id).or_default() += 1;
    }
    if doc_counts
        .values()
        .any(|count| *count as f32 / sources.len() as f32 > MAX_SINGLE_SOURCE_RELIANCE)
        && doc_counts.len() > 1
    {
        warnings.push(warning::format(
            warning::SOURCE_OVER_RELIANCE,
            "over-reliance on a single document; consider diversifying sources",
        ));
    }

    warnings
}
