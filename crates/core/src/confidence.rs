use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static HEDGING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(may|might|possibly|unclear|not certain)\b").expect("hedging regex")
});

/// Discrete grade derived from citation count and hedging. `Unknown` means
/// confidence could not be determined, not that it is high.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
    Unknown,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::High => "high",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Unknown => "unknown",
        }
    }
}

/// Pure function of (citation count, hedging match):
/// high when >= 3 citations, medium for 1..=2, unknown for 0.
/// Hedging language downgrades medium to low, but never high.
pub fn grade_confidence(content: &str, citation_count: usize) -> ConfidenceLevel {
    if citation_count == 0 {
        return ConfidenceLevel::Unknown;
    }
    if citation_count >= 3 {
        return ConfidenceLevel::High;
    }
    if HEDGING.is_match(&content.to_lowercase()) {
        return ConfidenceLevel::Low;
    }
    ConfidenceLevel::Medium
}
