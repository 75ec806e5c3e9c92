use serde::{Deserialize, Serialize};

use crate::coverage::RetrievalType;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    Analysis,
    Qa,
    Writing,
}

impl QueryIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryIntent::Analysis => "analysis",
            QueryIntent::Qa => "qa",
            QueryIntent::Writing => "writing",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "analysis" => Some(QueryIntent::Analysis),
            "qa" => Some(QueryIntent::Qa),
            "writing" => Some(QueryIntent::Writing),
            _ => None,
        }
    }

    /// Analysis wants representative coverage; QA and writing want the
    /// closest matches.
    pub fn suggested_retrieval(&self) -> RetrievalType {
        match self {
            QueryIntent::Analysis => RetrievalType::Diverse,
            QueryIntent::Qa | QueryIntent::Writing => RetrievalType::Similarity,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SummaryScope {
    Broad,
    Focused,
    NotApplicable,
}

impl SummaryScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryScope::Broad => "broad",
            SummaryScope::Focused => "focused",
            SummaryScope::NotApplicable => "not_applicable",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentClassification {
    pub intent: QueryIntent,
    pub confidence: f32,
    pub reasoning: String,
    pub suggested_retrieval: RetrievalType,
    pub summary_scope: SummaryScope,
    #[serde(default)]
    pub focus_topic: Option<String>,
}

impl IntentClassification {
    /// A user override carries full confidence and the retrieval strategy
    /// that matches the forced intent.
    pub fn from_override(value: &str) -> Option<Self> {
        let intent = QueryIntent::parse(value)?;
        Some(Self {
            intent,
            confidence: 1.0,
            reasoning: format!("User override: {value}"),
            suggested_retrieval: intent.suggested_retrieval(),
            summary_scope: if intent == QueryIntent::Analysis {
                SummaryScope::Broad
            } else {
                SummaryScope::NotApplicable
            },
            focus_topic: None,
        })
    }
}
