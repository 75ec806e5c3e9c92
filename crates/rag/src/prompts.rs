use grounded_core::{IntentClassification, QueryIntent, SummaryScope};

/// Full-text source block handed to the prompt builders. Retrieval returns
/// truncated excerpts; the orchestrator resolves the complete chunk text
/// before assembly.
#[derive(Debug, Clone)]
pub struct PromptSource {
    pub title: String,
    pub text: String,
}

/// Headings the analysis template demands and the validator splits on.
pub const ANALYSIS_SECTIONS: [&str; 5] = [
    "Observations",
    "Synthesized Patterns",
    "Contradictions",
    "Questions Raised",
    "Blind Spots",
];

const ANALYSIS_SYSTEM: &str = "You are a document analysis assistant that helps users understand their documents.

RULES YOU MUST FOLLOW:
1. Your confidence must not exceed what the stated coverage justifies
2. Separate cited claims from interpretations marked as synthesis
3. Surface contradictions without forcing a resolution
4. Acknowledge what you cannot assess

Intellectual honesty comes first, usefulness second, polish last.";

const WRITING_SYSTEM: &str = "You are a writing assistant that drafts professional documents grounded in provided sources.

CRITICAL RULES:
1. Use ONLY the provided context as your knowledge base
2. NEVER invent information that is not present in the context
3. Label reasoned interpretation as such
4. Cite the supporting source for each claim with [Source N] notation
5. If sources conflict, describe the conflict explicitly

Users must be able to verify every claim you make.";

/// Inject sources as numbered blocks. Returns the context text and K.
pub fn format_context(sources: &[PromptSource]) -> (String, usize) {
    if sources.is_empty() {
        return ("No relevant sources found.".to_string(), 0);
    }
    let blocks: Vec<String> = sources
        .iter()
        .enumerate()
        .map(|(i, source)| format!("[Source {}] (from: {})\n{}", i + 1, source.title, source.text))
        .collect();
    (blocks.join("\n\n---\n\n"), sources.len())
}

/// Pick the template for this intent and scope. Returns (system, user).
pub fn assemble(
    classification: &IntentClassification,
    prompt: &str,
    sources: &[PromptSource],
    coverage_summary: &str,
) -> (String, String) {
    match classification.intent {
        QueryIntent::Analysis => match (&classification.summary_scope, &classification.focus_topic) {
            (SummaryScope::Focused, Some(topic)) => {
                build_focused_summary_prompt(topic, sources, coverage_summary)
            }
            (SummaryScope::Broad, _) => build_exploratory_summary_prompt(sources, coverage_summary),
            _ => build_analysis_prompt(sources, coverage_summary),
        },
        QueryIntent::Qa | QueryIntent::Writing => {
            build_coverage_aware_prompt(prompt, sources, coverage_summary)
        }
    }
}

pub fn build_analysis_prompt(sources: &[PromptSource], coverage_summary: &str) -> (String, String) {
    let (context, num_sources) = format_context(sources);
    let user = format!(
        "Analyze the following documents based on what you can see.

COVERAGE CONTEXT:
{coverage_summary}

Given this coverage level, provide analysis appropriate to what you can actually see.

CONTEXT ({num_sources} sources available):
{context}

OUTPUT STRUCTURE (keep the claim-evidence separation):

## Observations
[Claims backed by evidence, cited with [Source N].]

## Synthesized Patterns
[Interpretations across sources, prefaced with \"Based on available sources...\"]

## Contradictions
[Where sources conflict. Present both views without resolving them.]

## Questions Raised
[What the content raises but does not answer.]

## Blind Spots
[What you could NOT assess due to coverage limitations. Be specific.]

Begin your analysis:"
    );
    (ANALYSIS_SYSTEM.to_string(), user)
}

pub fn build_exploratory_summary_prompt(
    sources: &[PromptSource],
    coverage_summary: &str,
) -> (String, String) {
    let (context, num_sources) = format_context(sources);
    let user = format!(
        "Provide an exploratory overview of this document set based on a representative sample.

THIS IS AN EXPLORATORY OVERVIEW:
{coverage_summary}

You are seeing a sample drawn from different parts of the documents. Identify
the main topics, give the user a map of the content, and suggest areas worth
exploring in depth.

CONTEXT ({num_sources} sources from different document regions):
{context}

OUTPUT STRUCTURE:

## Observations
[The main topics and themes present in the sample, cited with [Source N].]

## Synthesized Patterns
[What the sampled regions collectively suggest about the whole. Use tentative language.]

## Contradictions
[Places where sampled excerpts pull in different directions, if any.]

## Questions Raised
[3-5 focused questions the user could ask next to go deeper.]

## Blind Spots
[Which parts of the documents this sample does not represent.]

Begin your exploratory overview:"
    );
    (ANALYSIS_SYSTEM.to_string(), user)
}

pub fn build_focused_summary_prompt(
    focus_topic: &str,
    sources: &[PromptSource],
    coverage_summary: &str,
) -> (String, String) {
    let (context, num_sources) = format_context(sources);
    let user = format!(
        "Provide a focused analysis of \"{focus_topic}\" based on the document content.

COVERAGE CONTEXT:
{coverage_summary}

The user wants to understand \"{focus_topic}\" specifically. Keep your analysis
narrowly on this topic.

CONTEXT ({num_sources} sources):
{context}

OUTPUT STRUCTURE:

## Observations
[What the documents say about {focus_topic}. Cite every claim with [Source N].]

## Synthesized Patterns
[How the statements about {focus_topic} fit together.]

## Contradictions
[Conflicting statements about {focus_topic}, if any.]

## Questions Raised
[2-3 questions that would deepen understanding of {focus_topic}.]

## Blind Spots
[Aspects of {focus_topic} the available sources do not cover.]

Begin your focused analysis:"
    );
    (ANALYSIS_SYSTEM.to_string(), user)
}

pub fn build_coverage_aware_prompt(
    topic: &str,
    sources: &[PromptSource],
    coverage_summary: &str,
) -> (String, String) {
    let (context, num_sources) = format_context(sources);
    if num_sources == 0 {
        let user = format!(
            "Write the following based on the provided context: {topic}

CONTEXT: No relevant sources found.

There is no retrievable context for this request. State explicitly that you
cannot answer from the provided documents, and do not produce any [Source N]
citations or invented content."
        );
        return (WRITING_SYSTEM.to_string(), user);
    }
    let user = format!(
        "Write the following based on the provided context: {topic}

IMPORTANT CONTEXT LIMITATION:
{coverage_summary}

CONTEXT ({num_sources} sources available - cite [Source 1] through [Source {num_sources}]):
{context}

CRITICAL OUTPUT RULES:
- Output ONLY the requested content, no preamble or meta-commentary
- Write in a clear, professional tone
- MANDATORY: include [Source N] citations inline after claims
- ONLY cite sources that exist: [Source 1] through [Source {num_sources}]
- Every paragraph MUST carry at least one citation
- If the context is insufficient, write what you can and note the gaps; if
  there is no context at all, state explicitly that you cannot answer from
  the provided documents

Begin writing:"
    );
    (WRITING_SYSTEM.to_string(), user)
}

pub fn build_regeneration_prompt(
    original_section: &str,
    sources: &[PromptSource],
    refinement_instructions: Option<&str>,
) -> (String, String) {
    let (context, num_sources) = format_context(sources);
    let instructions = refinement_instructions
        .unwrap_or("Improve clarity and ensure all claims are well-supported.");
    let truncated: String = if original_section.len() > 500 {
        let mut cut = 500;
        while !original_section.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &original_section[..cut])
    } else {
        original_section.to_string()
    };
    let user = format!(
        "Rewrite this section using the provided context: {truncated}

{instructions}

CONTEXT ({num_sources} sources available - cite [Source 1] through [Source {num_sources}]):
{context}

Rewritten section:"
    );
    (WRITING_SYSTEM.to_string(), user)
}

pub fn build_suggested_questions_prompt(
    sources: &[PromptSource],
    num_questions: usize,
) -> (String, String) {
    let (context, _) = format_context(sources);
    let system = "You are a helpful assistant that generates thoughtful questions \
                  based on document content."
        .to_string();
    let user = format!(
        "Based on the following document content, generate {num_questions} thoughtful \
questions that a user might want to explore or write about.

DOCUMENT CONTENT:
{context}

Generate questions that can be answered using the provided content, cover
different aspects of the documents, and range from factual to analytical.

Output ONLY the questions, one per line, numbered 1-{num_questions}:"
    );
    (system, user)
}

pub fn build_chat_prompt(
    user_message: &str,
    sources: &[PromptSource],
    history: &[(String, String)],
    cumulative_coverage_info: &str,
) -> (String, String) {
    let (context, num_sources) = format_context(sources);
    let system = format!(
        "{WRITING_SYSTEM}

CONVERSATION COVERAGE:
{cumulative_coverage_info}"
    );
    let history_block = if history.is_empty() {
        String::new()
    } else {
        let turns: Vec<String> = history
            .iter()
            .map(|(role, content)| format!("{role}: {content}"))
            .collect();
        format!("CONVERSATION SO FAR:\n{}\n\n", turns.join("\n"))
    };
    let user = format!(
        "{history_block}{user_message}

CONTEXT ({num_sources} sources available - cite [Source 1] through [Source {num_sources}]):
{context}

Answer the latest message above, grounding every claim in the numbered
sources. If the context does not contain the answer, say so explicitly."
    );
    (system, user)
}

/// Parse numbered questions ("1. ..." or "1) ...") from model output.
pub fn parse_questions(text: &str) -> Vec<String> {
    let re = regex::Regex::new(r"^\s*\d+[.)]\s*(.+)$").expect("question pattern");
    text.lines()
        .filter_map(|line| {
            re.captures(line.trim())
                .map(|caps| caps[1].trim().to_string())
        })
        .filter(|q| !q.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use grounded_core::RetrievalType;

    fn sources(n: usize) -> Vec<PromptSource> {
        (0..n)
            .map(|i| PromptSource {
                title: format!("doc{i}"),
                text: format!("content {i}"),
            })
            .collect()
    }

    fn classification(intent: QueryIntent, scope: SummaryScope) -> IntentClassification {
        IntentClassification {
            intent,
            confidence: 0.9,
            reasoning: "test".into(),
            suggested_retrieval: RetrievalType::Similarity,
            summary_scope: scope,
            focus_topic: None,
        }
    }

    #[test]
    fn context_blocks_are_numbered_from_one() {
        let (context, k) = format_context(&sources(3));
        assert_eq!(k, 3);
        assert!(context.contains("[Source 1] (from: doc0)"));
        assert!(context.contains("[Source 3] (from: doc2)"));
        assert!(!context.contains("[Source 4]"));
    }

    #[test]
    fn empty_sources_have_placeholder_context() {
        let (context, k) = format_context(&[]);
        assert_eq!(k, 0);
        assert_eq!(context, "No relevant sources found.");
    }

    #[test]
    fn system_prompt_declares_coverage_verbatim() {
        let coverage = "You are seeing ~35% of the document set (105 of 300 chunks across 1 document(s)).";
        let classification = classification(QueryIntent::Qa, SummaryScope::NotApplicable);
        let (_, user) = assemble(&classification, "What is X?", &sources(2), coverage);
        assert!(user.contains("You are seeing ~35%"));
    }

    #[test]
    fn analysis_prompt_demands_five_sections() {
        let (_, user) = build_analysis_prompt(&sources(2), "coverage");
        for heading in ANALYSIS_SECTIONS {
            assert!(user.contains(&format!("## {heading}")), "missing {heading}");
        }
    }

    #[test]
    fn broad_analysis_uses_exploratory_template() {
        let classification = classification(QueryIntent::Analysis, SummaryScope::Broad);
        let (_, user) = assemble(&classification, "Summarize this document", &sources(2), "cov");
        assert!(user.contains("exploratory overview"));
    }

    #[test]
    fn focused_analysis_carries_the_topic() {
        let mut classification = classification(QueryIntent::Analysis, SummaryScope::Focused);
        classification.focus_topic = Some("data ethics".into());
        let (_, user) = assemble(&classification, "Summarize about data ethics", &sources(2), "cov");
        assert!(user.contains("\"data ethics\""));
    }

    #[test]
    fn user_prompt_carries_the_request_unmodified() {
        let classification = classification(QueryIntent::Writing, SummaryScope::NotApplicable);
        let request = "Write a report on coastal erosion";
        let (_, user) = assemble(&classification, request, &sources(1), "cov");
        assert!(user.contains(request));
    }

    #[test]
    fn parses_numbered_questions() {
        let text = "1. What is coverage?\n2) Why regions?\nnot a question line\n3. How to cite?";
        let questions = parse_questions(text);
        assert_eq!(questions.len(), 3);
        assert_eq!(questions[0], "What is coverage?");
        assert_eq!(questions[1], "Why regions?");
    }
}
