use once_cell::sync::Lazy;
use regex::Regex;

use grounded_core::{IntentClassification, QueryIntent, RetrievalType, SummaryScope};

static ANALYSIS_CUES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\bsummari[zs]\w*\b",
        r"\bsummary\b",
        r"\boverviews?\b",
        r"\bmain\s+points?\b",
        r"\bkey\s+takeaways?\b",
        r"\bof\s+this\s+document\b",
        r"\bwrite\s+a\s+summary\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("analysis cue"))
    .collect()
});

static WRITING_CUES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\bwrite\b",
        r"\bdraft\b",
        r"\bcreate\b",
        r"\bcompose\b",
        r"\breport\b",
        r"\bletter\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("writing cue"))
    .collect()
});

static FOCUS_TERMS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\babout\s+(?P<topic>[\w][\w\s-]*)",
        r"\bregarding\s+(?P<topic>[\w][\w\s-]*)",
        r"\bthe\s+(?P<topic>[\w][\w\s-]*?)\s+section\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("focus term"))
    .collect()
});

const INTERROGATIVES: [&str; 10] = [
    "what", "when", "where", "who", "why", "how", "is", "are", "does", "can",
];

/// Deterministic mapping from a prompt to intent, scope, and suggested
/// retrieval. Rules fire in order; analysis is checked before writing so
/// "write a summary" classifies as analysis, and the question rule sits
/// between them to catch short questions that also contain "write".
pub fn classify_intent(prompt: &str) -> IntentClassification {
    let trimmed = prompt.trim();
    let lower = trimmed.to_lowercase();

    let analysis_matches = ANALYSIS_CUES.iter().filter(|re| re.is_match(&lower)).count();
    if analysis_matches > 0 {
        let confidence = (0.70 + 0.20 * (analysis_matches as f32 - 1.0)).min(1.0);
        let (summary_scope, focus_topic) = detect_scope(&lower);
        return IntentClassification {
            intent: QueryIntent::Analysis,
            confidence,
            reasoning: reasoning_for("analysis/summarization", analysis_matches),
            suggested_retrieval: RetrievalType::Diverse,
            summary_scope,
            focus_topic,
        };
    }

    if is_question(&lower) {
        let has_mark = lower.contains('?');
        let confidence = if has_mark { 0.85 } else { 0.70 };
        return IntentClassification {
            intent: QueryIntent::Qa,
            confidence,
            reasoning: reasoning_for("question-answering", 1),
            suggested_retrieval: RetrievalType::Similarity,
            summary_scope: SummaryScope::NotApplicable,
            focus_topic: None,
        };
    }

    let writing_matches = WRITING_CUES.iter().filter(|re| re.is_match(&lower)).count();
    if writing_matches > 0 {
        let confidence = (0.70 + 0.10 * (writing_matches as f32 - 1.0)).min(0.95);
        return IntentClassification {
            intent: QueryIntent::Writing,
            confidence,
            reasoning: reasoning_for("content creation", writing_matches),
            suggested_retrieval: RetrievalType::Similarity,
            summary_scope: SummaryScope::NotApplicable,
            focus_topic: None,
        };
    }

    IntentClassification {
        intent: QueryIntent::Writing,
        confidence: 0.5,
        reasoning: "No specific patterns matched; defaulting to writing mode".to_string(),
        suggested_retrieval: RetrievalType::Similarity,
        summary_scope: SummaryScope::NotApplicable,
        focus_topic: None,
    }
}

fn is_question(lower: &str) -> bool {
    let first = match lower.split_whitespace().next() {
        Some(word) => word.trim_matches(|c: char| !c.is_alphanumeric()),
        None => return false,
    };
    if !INTERROGATIVES.contains(&first) {
        return false;
    }
    lower.contains('?') || lower.split_whitespace().count() <= 15
}

fn detect_scope(lower: &str) -> (SummaryScope, Option<String>) {
    for re in FOCUS_TERMS.iter() {
        if let Some(caps) = re.captures(lower) {
            if let Some(topic) = caps.name("topic") {
                let cleaned = topic
                    .as_str()
                    .trim()
                    .trim_end_matches(|c: char| c.is_ascii_punctuation())
                    .trim()
                    .to_string();
                if !cleaned.is_empty() && cleaned != "this document" {
                    return (SummaryScope::Focused, Some(cleaned));
                }
            }
        }
    }
    (SummaryScope::Broad, None)
}

fn reasoning_for(kind: &str, matches: usize) -> String {
    if matches > 2 {
        format!("Strong {kind} indicators detected ({matches} pattern matches)")
    } else if matches > 1 {
        format!("Multiple {kind} indicators detected")
    } else {
        format!("Query matches {kind} pattern")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_a_summary_is_analysis_not_writing() {
        let intent = classify_intent("Write a summary of the quarterly results");
        assert_eq!(intent.intent, QueryIntent::Analysis);
        assert_eq!(intent.suggested_retrieval, RetrievalType::Diverse);
    }

    #[test]
    fn broad_summary_has_broad_scope() {
        let intent = classify_intent("Summarize this document");
        assert_eq!(intent.intent, QueryIntent::Analysis);
        assert_eq!(intent.summary_scope, SummaryScope::Broad);
        assert!(intent.focus_topic.is_none());
    }

    #[test]
    fn focused_summary_extracts_topic() {
        let intent = classify_intent("Summarize the section about data ethics");
        assert_eq!(intent.intent, QueryIntent::Analysis);
        assert_eq!(intent.summary_scope, SummaryScope::Focused);
        assert_eq!(intent.focus_topic.as_deref(), Some("data ethics"));
    }

    #[test]
    fn section_focus_term_extracts_topic() {
        let intent = classify_intent("Give me an overview of the methodology section");
        assert_eq!(intent.intent, QueryIntent::Analysis);
        assert_eq!(intent.summary_scope, SummaryScope::Focused);
        assert_eq!(intent.focus_topic.as_deref(), Some("methodology"));
    }

    #[test]
    fn short_question_is_qa() {
        let intent = classify_intent("What is data feminism?");
        assert_eq!(intent.intent, QueryIntent::Qa);
        assert_eq!(intent.suggested_retrieval, RetrievalType::Similarity);
        assert!(intent.confidence > 0.70);
    }

    #[test]
    fn question_without_mark_needs_short_prompt() {
        let intent = classify_intent("how does the pipeline work");
        assert_eq!(intent.intent, QueryIntent::Qa);

        let long = format!("how {}", "something ".repeat(16));
        let intent = classify_intent(&long);
        assert_ne!(intent.intent, QueryIntent::Qa);
    }

    #[test]
    fn question_containing_write_stays_qa() {
        let intent = classify_intent("Can you write this in one line?");
        assert_eq!(intent.intent, QueryIntent::Qa);
    }

    #[test]
    fn writing_cues_classify_as_writing() {
        let intent = classify_intent("Draft a cover letter for the engineering role");
        assert_eq!(intent.intent, QueryIntent::Writing);
        assert_eq!(intent.suggested_retrieval, RetrievalType::Similarity);
    }

    #[test]
    fn ambiguous_prompt_falls_through_to_writing() {
        let intent = classify_intent("the annual shareholder meeting");
        assert_eq!(intent.intent, QueryIntent::Writing);
        assert!((intent.confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn multiple_analysis_cues_raise_confidence() {
        let one = classify_intent("Summarize the report");
        let many = classify_intent("Summarize the main points and key takeaways of this document");
        assert!(many.confidence > one.confidence);
        assert!(many.confidence <= 1.0);
    }
}
