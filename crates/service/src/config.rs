use std::env;
use std::fs;
use std::path::PathBuf;

use grounded_core::{QueryIntent, Result};

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub data_dir: PathBuf,
    pub bind_addr: String,
    pub generation_model: String,
    pub analysis_model: String,
    pub writing_model: String,
    pub qa_model: String,
    pub similarity_threshold: f32,
    pub top_k: usize,
    pub default_coverage_pct: f32,
    pub max_coverage_pct: f32,
    pub history_turns: usize,
    pub max_history_chars: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub ingest_workers: usize,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        let generation_model =
            env::var("GENERATION_MODEL").unwrap_or_else(|_| "gpt-4.1-mini".to_string());
        Self {
            data_dir: PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string())),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
            analysis_model: env::var("ANALYSIS_MODEL")
                .unwrap_or_else(|_| generation_model.clone()),
            writing_model: env::var("WRITING_MODEL").unwrap_or_else(|_| generation_model.clone()),
            qa_model: env::var("QA_MODEL").unwrap_or_else(|_| generation_model.clone()),
            generation_model,
            similarity_threshold: env_parse("SIMILARITY_THRESHOLD", 0.35),
            top_k: env_parse("TOP_K", 10),
            default_coverage_pct: env_parse("DEFAULT_COVERAGE_PCT", 35.0),
            max_coverage_pct: env_parse("MAX_COVERAGE_PCT", 60.0),
            history_turns: env_parse("HISTORY_TURNS", 3),
            max_history_chars: env_parse("MAX_HISTORY_CHARS", 8000),
            chunk_size: env_parse("CHUNK_SIZE", 500),
            chunk_overlap: env_parse("CHUNK_OVERLAP", 100),
            ingest_workers: env_parse("INGEST_WORKERS", 4),
        }
    }

    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        let mut config = Self::from_env();
        config.data_dir = data_dir;
        config
    }

    pub fn documents_dir(&self) -> PathBuf {
        self.data_dir.join("documents")
    }

    pub fn vectors_dir(&self) -> PathBuf {
        self.data_dir.join("vectors")
    }

    pub fn conversations_dir(&self) -> PathBuf {
        self.data_dir.join("conversations")
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(self.documents_dir())?;
        fs::create_dir_all(self.vectors_dir())?;
        fs::create_dir_all(self.conversations_dir())?;
        Ok(())
    }

    pub fn model_for_intent(&self, intent: QueryIntent) -> &str {
        match intent {
            QueryIntent::Analysis => &self.analysis_model,
            QueryIntent::Qa => &self.qa_model,
            QueryIntent::Writing => &self.writing_model,
        }
    }
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> T {
    env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
