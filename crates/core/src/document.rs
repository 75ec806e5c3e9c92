use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Pdf,
    Docx,
    Txt,
}

impl DocumentType {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "pdf" => Some(DocumentType::Pdf),
            "docx" => Some(DocumentType::Docx),
            "txt" => Some(DocumentType::Txt),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Pdf => "pdf",
            DocumentType::Docx => "docx",
            DocumentType::Txt => "txt",
        }
    }
}

/// Lifecycle states move forward only: pending -> processing -> ready | failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Ready,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Ready => "ready",
            DocumentStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    pub filename: String,
    pub doc_type: DocumentType,
    pub status: DocumentStatus,
    #[serde(default)]
    pub chunk_count: usize,
    #[serde(default)]
    pub word_count: Option<usize>,
    #[serde(default)]
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl Document {
    pub fn new(filename: &str, doc_type: DocumentType, title: Option<String>) -> Self {
        let now = Utc::now();
        let stem = filename
            .rsplit('/')
            .next()
            .unwrap_or(filename)
            .trim_end_matches(&format!(".{}", doc_type.as_str()))
            .to_string();
        Self {
            id: Uuid::new_v4(),
            title: title.unwrap_or(stem),
            filename: filename.to_string(),
            doc_type,
            status: DocumentStatus::Pending,
            chunk_count: 0,
            word_count: None,
            author: None,
            created_at: now,
            updated_at: now,
            error_message: None,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Intro/middle/conclusion partition of a document by chunk ordinal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    Intro,
    Middle,
    Conclusion,
}

impl Region {
    pub const ALL: [Region; 3] = [Region::Intro, Region::Middle, Region::Conclusion];

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Intro => "intro",
            Region::Middle => "middle",
            Region::Conclusion => "conclusion",
        }
    }
}

/// Assign a region by ordinal tertile. The boundaries are exact in integer
/// arithmetic: intro covers ordinals with `ordinal * 3 < total`, conclusion
/// covers `ordinal * 3 >= 2 * total`.
pub fn region_for(ordinal: usize, total: usize) -> Region {
    if total == 0 {
        return Region::Intro;
    }
    let scaled = ordinal * 3;
    if scaled < total {
        Region::Intro
    } else if scaled < total * 2 {
        Region::Middle
    } else {
        Region::Conclusion
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: Uuid,
    pub document_id: Uuid,
    /// Zero-based position within the document's chunk sequence.
    pub ordinal: usize,
    pub text: String,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub section_title: Option<String>,
    pub title: String,
    pub filename: String,
}

impl DocumentChunk {
    pub fn region(&self, total: usize) -> Region {
        region_for(self.ordinal, total)
    }
}

/// Value copy of a retrieved chunk. Derived at retrieval time, never
/// persisted, and holds no back-references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub document_id: Uuid,
    pub chunk_id: Uuid,
    pub excerpt: String,
    pub relevance_score: f32,
    pub title: String,
    pub filename: String,
}

impl SourceRef {
    pub fn from_chunk(chunk: &DocumentChunk, score: f32) -> Self {
        Self {
            document_id: chunk.document_id,
            chunk_id: chunk.id,
            excerpt: truncate_excerpt(&chunk.text, 200),
            relevance_score: score.clamp(0.0, 1.0),
            title: chunk.title.clone(),
            filename: chunk.filename.clone(),
        }
    }
}

/// Truncate at a word boundary so the excerpt stays a literal substring of
/// the chunk text (plus an ellipsis marker).
pub fn truncate_excerpt(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    let mut cut = max_len;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let head = &text[..cut];
    match head.rfind(' ') {
        Some(idx) => format!("{}...", &head[..idx]),
        None => format!("{}...", head),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_split_into_tertiles() {
        // 30 chunks: 0..9 intro, 10..19 middle, 20..29 conclusion
        assert_eq!(region_for(0, 30), Region::Intro);
        assert_eq!(region_for(9, 30), Region::Intro);
        assert_eq!(region_for(10, 30), Region::Middle);
        assert_eq!(region_for(19, 30), Region::Middle);
        assert_eq!(region_for(20, 30), Region::Conclusion);
        assert_eq!(region_for(29, 30), Region::Conclusion);
    }

    #[test]
    fn regions_handle_tiny_documents() {
        assert_eq!(region_for(0, 1), Region::Intro);
        assert_eq!(region_for(0, 2), Region::Intro);
        assert_eq!(region_for(1, 2), Region::Middle);
    }

    #[test]
    fn excerpt_is_literal_prefix() {
        let text = "alpha beta gamma delta ".repeat(20);
        let excerpt = truncate_excerpt(&text, 200);
        assert!(excerpt.ends_with("..."));
        let body = excerpt.trim_end_matches("...");
        assert!(text.starts_with(body));
        assert!(body.len() <= 200);
    }

    #[test]
    fn short_excerpt_is_unchanged() {
        assert_eq!(truncate_excerpt("short text", 200), "short text");
    }

    #[test]
    fn document_title_defaults_to_stem() {
        let doc = Document::new("report.txt", DocumentType::Txt, None);
        assert_eq!(doc.title, "report");
        assert_eq!(doc.status, DocumentStatus::Pending);
    }
}
