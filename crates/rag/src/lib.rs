pub mod confidence;
pub mod coverage;
pub mod diverse;
pub mod embedding;
pub mod intent;
pub mod prompts;
pub mod retrieval;
pub mod store;
pub mod validation;

pub use confidence::{
    assess_retrieval, RetrievalConfidence, RetrievalConfidenceLevel, LOW_CONFIDENCE_SUFFIX,
};
pub use coverage::compute_coverage;
pub use diverse::{retrieve_diverse, DiverseParams};
pub use embedding::{EmbeddingBackend, EmbeddingClient};
pub use intent::classify_intent;
pub use prompts::{
    assemble, build_chat_prompt, build_regeneration_prompt, build_suggested_questions_prompt,
    format_context, parse_questions, PromptSource, ANALYSIS_SECTIONS,
};
pub use retrieval::{retrieve_similarity, SimilarityParams};
pub use store::{atomic_write, StoreStats, VectorStore};
pub use validation::{check_retrieval_quality, validate_output};

pub use grounded_llm::{LlmClient, LlmProvider};
