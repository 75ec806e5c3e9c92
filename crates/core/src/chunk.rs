use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::DocumentChunk;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters carried over from the tail of the previous chunk.
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 100,
        }
    }
}

pub struct Chunker {
    config: ChunkConfig,
}

impl Chunker {
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// Split document text into ordered chunks. Paragraphs (blank-line
    /// separated) are packed greedily up to `chunk_size`; consecutive chunks
    /// share `chunk_overlap` characters so no claim straddles a boundary
    /// invisibly.
    pub fn chunk_document(
        &self,
        document_id: Uuid,
        title: &str,
        filename: &str,
        content: &str,
    ) -> Vec<DocumentChunk> {
        let paragraphs: Vec<&str> = content
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        if paragraphs.is_empty() {
            return Vec::new();
        }

        let chunk_size = self.config.chunk_size.max(1);
        let mut texts: Vec<String> = Vec::new();
        let mut current = String::new();
        for paragraph in paragraphs {
            if !current.is_empty() && current.len() + paragraph.len() + 1 > chunk_size {
                let overlap = self.overlap_tail(&current);
                texts.push(std::mem::take(&mut current));
                current.push_str(&overlap);
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(paragraph);
        }
        if !current.is_empty() {
            texts.push(current);
        }

        texts
            .into_iter()
            .enumerate()
            .map(|(ordinal, text)| DocumentChunk {
                id: Uuid::new_v4(),
                document_id,
                ordinal,
                text,
                page: None,
                section_title: None,
                title: title.to_string(),
                filename: filename.to_string(),
            })
            .collect()
    }

    fn overlap_tail(&self, text: &str) -> String {
        let overlap = self.config.chunk_overlap;
        if overlap == 0 || text.len() <= overlap {
            return String::new();
        }
        let mut start = text.len() - overlap;
        while !text.is_char_boundary(start) {
            start += 1;
        }
        // Break at a word boundary inside the overlap window.
        match text[start..].find(' ') {
            Some(idx) => text[start + idx + 1..].to_string(),
            None => text[start..].to_string(),
        }
    }
}
