use std::env;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use grounded_core::{normalize, GroundedError, HashEmbedder, HashEmbedderConfig, Result};

const EMBEDDER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub enum EmbeddingBackend {
    Hash(HashEmbedder),
    OpenAi(OpenAiEmbeddingClient),
}

/// Capability client for the external embedding model. Vectors come back
/// unit-norm regardless of backend so the index can use dot products.
#[derive(Clone)]
pub struct EmbeddingClient {
    backend: EmbeddingBackend,
}

impl EmbeddingClient {
    pub fn from_env() -> Result<Self> {
        match env::var("EMBEDDING_PROVIDER")
            .unwrap_or_else(|_| "hash".to_string())
            .to_lowercase()
            .as_str()
        {
            "openai" => {
                let model = env::var("EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "text-embedding-3-small".to_string());
                Ok(Self {
                    backend: EmbeddingBackend::OpenAi(OpenAiEmbeddingClient::new(&model)?),
                })
            }
            _ => {
                let dims = env::var("HASH_EMBED_DIMENSIONS")
                    .ok()
                    .and_then(|v| v.parse::<usize>().ok())
                    .unwrap_or(64);
                Ok(Self {
                    backend: EmbeddingBackend::Hash(HashEmbedder::new(HashEmbedderConfig {
                        dimensions: dims,
                        seed: 1337,
                    })),
                })
            }
        }
    }

    pub fn hash() -> Self {
        Self {
            backend: EmbeddingBackend::Hash(HashEmbedder::new(HashEmbedderConfig::default())),
        }
    }

    pub fn model_name(&self) -> String {
        match &self.backend {
            EmbeddingBackend::Hash(_) => "hash".to_string(),
            EmbeddingBackend::OpenAi(client) => client.model.clone(),
        }
    }

    pub async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        match &self.backend {
            EmbeddingBackend::Hash(embedder) => Ok(inputs
                .iter()
                .map(|text| embedder.embed_text(text))
                .collect()),
            EmbeddingBackend::OpenAi(client) => client.embed_batch(inputs).await,
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut output = self.embed_batch(&[text.to_string()]).await?;
        output
            .pop()
            .ok_or_else(|| GroundedError::EmbeddingFailed("empty embedding response".into()))
    }
}

#[derive(Clone)]
pub struct OpenAiEmbeddingClient {
    http: Client,
    model: String,
    api_key: String,
}

impl OpenAiEmbeddingClient {
    pub fn new(model: &str) -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY").map_err(|_| {
            GroundedError::InputInvalid("OPENAI_API_KEY is required for openai embeddings".into())
        })?;
        Ok(Self {
            http: Client::builder()
                .timeout(EMBEDDER_TIMEOUT)
                .build()
                .map_err(|e| GroundedError::EmbeddingFailed(e.to_string()))?,
            model: model.to_string(),
            api_key,
        })
    }

    pub async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let payload = serde_json::json!({
            "model": self.model,
            "input": inputs,
        });
        let response = self
            .http
            .post("https://api.openai.com/v1/embeddings")
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| GroundedError::EmbeddingFailed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(GroundedError::EmbeddingFailed(format!(
                "openai embeddings request failed: {}",
                response.status()
            )));
        }
        let parsed: OpenAiEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| GroundedError::EmbeddingFailed(e.to_string()))?;
        let mut out = Vec::with_capacity(parsed.data.len());
        for data in parsed.data {
            let mut vector = data.embedding;
            normalize(&mut vector);
            out.push(vector);
        }
        Ok(out)
    }
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingData>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingData {
    embedding: Vec<f32>,
}
