mod chat;
mod chunk;
mod citations;
mod confidence;
mod coverage;
mod document;
mod embedding;
mod error;
mod generation;
mod intent;

pub use chat::{ChatMessage, ChatRole, Conversation, ConversationSummary};
pub use chunk::{ChunkConfig, Chunker};
pub use citations::{cited_in_order, extract_citations, sanitize_citations};
pub use confidence::{grade_confidence, ConfidenceLevel};
pub use coverage::{CoverageDescriptor, DocumentCoverage, RetrievalMetadata, RetrievalType};
pub use document::{
    region_for, truncate_excerpt, Document, DocumentChunk, DocumentStatus, DocumentType, Region,
    SourceRef,
};
pub use embedding::{cosine_similarity, normalize, HashEmbedder, HashEmbedderConfig};
pub use error::{GroundedError, Result};
pub use generation::{warning, GeneratedSection, GenerationResult, RegenerationResult};
pub use intent::{IntentClassification, QueryIntent, SummaryScope};
