use std::env;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::sleep;

use grounded_core::{GroundedError, Result};

const GENERATOR_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_RETRIES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Gemini,
    Deepseek,
    Local,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "openai",
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::Gemini => "gemini",
            LlmProvider::Deepseek => "deepseek",
            LlmProvider::Local => "local",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "openai" => Some(LlmProvider::OpenAi),
            "anthropic" => Some(LlmProvider::Anthropic),
            "gemini" => Some(LlmProvider::Gemini),
            "deepseek" => Some(LlmProvider::Deepseek),
            "local" => Some(LlmProvider::Local),
            _ => None,
        }
    }
}

#[derive(Clone)]
enum ProviderConfig {
    OpenAi { api_key: String, base_url: String },
    Anthropic { api_key: String, max_tokens: u32 },
    Gemini { api_key: String },
    Deepseek { api_key: String },
    Local,
    /// Replays a canned response. Used by tests that need to inject exact
    /// generator output through the full pipeline.
    Fixed(String),
}

/// Capability client for the generation LLM: `generate(system, user, model)`.
/// Transport faults are retried with exponential backoff, then surfaced as
/// `GenerationFailed`.
#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    provider: LlmProvider,
    config: ProviderConfig,
}

impl LlmClient {
    pub fn new(provider: LlmProvider) -> Result<Self> {
        let config = match provider {
            LlmProvider::OpenAi => ProviderConfig::OpenAi {
                api_key: read_api_key("OPENAI_API_KEY")?,
                base_url: env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            },
            LlmProvider::Anthropic => ProviderConfig::Anthropic {
                api_key: read_api_key("ANTHROPIC_API_KEY")?,
                max_tokens: env::var("ANTHROPIC_MAX_TOKENS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(2048),
            },
            LlmProvider::Gemini => ProviderConfig::Gemini {
                api_key: read_api_key("GEMINI_API_KEY")?,
            },
            LlmProvider::Deepseek => ProviderConfig::Deepseek {
                api_key: read_api_key("DEEPSEEK_API_KEY")?,
            },
            LlmProvider::Local => ProviderConfig::Local,
        };
        Ok(Self {
            http: Client::builder()
                .timeout(GENERATOR_TIMEOUT)
                .build()
                .map_err(|e| GroundedError::GenerationFailed(e.to_string()))?,
            provider,
            config,
        })
    }

    pub fn from_env() -> Result<Self> {
        let name = env::var("LLM_PROVIDER").unwrap_or_else(|_| "local".to_string());
        let provider = LlmProvider::parse(&name)
            .ok_or_else(|| GroundedError::InputInvalid(format!("unknown provider {name}")))?;
        Self::new(provider)
    }

    pub fn local() -> Self {
        Self {
            http: Client::new(),
            provider: LlmProvider::Local,
            config: ProviderConfig::Local,
        }
    }

    pub fn fixed(response: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            provider: LlmProvider::Local,
            config: ProviderConfig::Fixed(response.into()),
        }
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub async fn generate(&self, system: &str, user: &str, model: &str) -> Result<String> {
        match &self.config {
            ProviderConfig::OpenAi { api_key, base_url } => {
                let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
                let payload = json!({
                    "model": model,
                    "messages": [
                        { "role": "system", "content": system },
                        { "role": "user", "content": user },
                    ],
                });
                let value = self
                    .post_with_retry(&url, Some(api_key.as_str()), &payload, "openai")
                    .await?;
                extract_chat_text(&value)
                    .ok_or_else(|| GroundedError::GenerationFailed("missing text in OpenAI response".into()))
            }
            ProviderConfig::Anthropic { api_key, max_tokens } => {
                let payload = json!({
                    "model": model,
                    "max_tokens": max_tokens,
                    "system": system,
                    "messages": [ { "role": "user", "content": user } ],
                });
                let value = self
                    .post_anthropic("https://api.anthropic.com/v1/messages", api_key, &payload)
                    .await?;
                let parsed: AnthropicResponse = serde_json::from_value(value)
                    .map_err(|e| GroundedError::GenerationFailed(e.to_string()))?;
                parsed
                    .content
                    .into_iter()
                    .find_map(|part| part.text)
                    .ok_or_else(|| {
                        GroundedError::GenerationFailed("missing text in Anthropic response".into())
                    })
            }
            ProviderConfig::Gemini { api_key } => {
                let url = format!(
                    "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
                    model, api_key
                );
                let prompt = format!("[SYSTEM]\n{}\n\n{}", system.trim(), user);
                let payload = json!({
                    "contents": [ { "parts": [ { "text": prompt } ] } ]
                });
                let value = self.post_with_retry(&url, None, &payload, "gemini").await?;
                let parsed: GeminiResponse = serde_json::from_value(value)
                    .map_err(|e| GroundedError::GenerationFailed(e.to_string()))?;
                parsed
                    .candidates
                    .and_then(|mut c| {
                        if c.is_empty() {
                            None
                        } else {
                            Some(c.remove(0))
                        }
                    })
                    .and_then(|candidate| candidate.content.parts.into_iter().find_map(|p| p.text))
                    .ok_or_else(|| {
                        GroundedError::GenerationFailed("missing text in Gemini response".into())
                    })
            }
            ProviderConfig::Deepseek { api_key } => {
                let payload = json!({
                    "model": model,
                    "messages": [
                        { "role": "system", "content": system },
                        { "role": "user", "content": user },
                    ],
                });
                let value = self
                    .post_with_retry(
                        "https://api.deepseek.com/v1/chat/completions",
                        Some(api_key.as_str()),
                        &payload,
                        "deepseek",
                    )
                    .await?;
                extract_chat_text(&value).ok_or_else(|| {
                    GroundedError::GenerationFailed("missing text in DeepSeek response".into())
                })
            }
            ProviderConfig::Local => Ok(synthesize_local_response(user)),
            ProviderConfig::Fixed(response) => Ok(response.clone()),
        }
    }

    async fn post_with_retry(
        &self,
        url: &str,
        bearer: Option<&str>,
        payload: &Value,
        label: &str,
    ) -> Result<Value> {
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let mut request = self.http.post(url).json(payload);
            if let Some(token) = bearer {
                request = request.bearer_auth(token);
            }
            let response = match request.send().await {
                Ok(resp) => resp,
                Err(err) => {
                    if attempt > MAX_RETRIES {
                        return Err(GroundedError::GenerationFailed(format!(
                            "{label} request failed after {MAX_RETRIES} retries: {err}"
                        )));
                    }
                    sleep(backoff_delay(attempt)).await;
                    continue;
                }
            };
            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                if attempt > MAX_RETRIES {
                    return Err(GroundedError::GenerationFailed(format!(
                        "{label} returned {status} after {MAX_RETRIES} retries"
                    )));
                }
                sleep(backoff_delay(attempt)).await;
                continue;
            }
            let body = response.text().await.unwrap_or_default();
            if !status.is_success() {
                return Err(GroundedError::GenerationFailed(format!(
                    "{label} returned error (status {status}): {body}"
                )));
            }
            return serde_json::from_str(&body)
                .map_err(|e| GroundedError::GenerationFailed(e.to_string()));
        }
    }

    async fn post_anthropic(&self, url: &str, api_key: &str, payload: &Value) -> Result<Value> {
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let response = match self
                .http
                .post(url)
                .header("x-api-key", api_key)
                .header("anthropic-version", "2023-06-01")
                .json(payload)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(err) => {
                    if attempt > MAX_RETRIES {
                        return Err(GroundedError::GenerationFailed(format!(
                            "anthropic request failed after {MAX_RETRIES} retries: {err}"
                        )));
                    }
                    sleep(backoff_delay(attempt)).await;
                    continue;
                }
            };
            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                if attempt > MAX_RETRIES {
                    return Err(GroundedError::GenerationFailed(format!(
                        "anthropic returned {status} after {MAX_RETRIES} retries"
                    )));
                }
                sleep(backoff_delay(attempt)).await;
                continue;
            }
            let body = response.text().await.unwrap_or_default();
            if !status.is_success() {
                return Err(GroundedError::GenerationFailed(format!(
                    "anthropic returned error (status {status}): {body}"
                )));
            }
            return serde_json::from_str(&body)
                .map_err(|e| GroundedError::GenerationFailed(e.to_string()));
        }
    }
}

fn backoff_delay(attempt: usize) -> Duration {
    Duration::from_secs(1u64 << attempt.min(4) as u32)
}

/// Offline fallback: echoes a grounded-sounding answer citing the sources
/// that appear in the prompt. Keeps the full pipeline runnable with no
/// external model.
fn synthesize_local_response(user: &str) -> String {
    let max_label = (1..=16)
        .rev()
        .find(|n| user.contains(&format!("[Source {n}]")))
        .unwrap_or(0);
    if max_label == 0 {
        return "I don't have enough information to answer this from the provided documents."
            .to_string();
    }
    let mut out = String::from("Based on the provided excerpts, the documents address the requested topic");
    for n in 1..=max_label.min(3) {
        out.push_str(&format!(" [Source {n}]"));
    }
    out.push('.');
    out
}

fn read_api_key(var: &str) -> Result<String> {
    env::var(var).map_err(|_| GroundedError::InputInvalid(format!("{var} is not set")))
}

fn extract_chat_text(value: &Value) -> Option<String> {
    value
        .get("choices")
        .and_then(|v| v.as_array())
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|content| content.as_str())
        .map(|text| text.to_string())
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    text: Option<String>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_backend_cites_available_sources() {
        let client = LlmClient::local();
        let user = "CONTEXT:\n[Source 1] alpha\n[Source 2] beta\n";
        let out = client.generate("system", user, "local").await.unwrap();
        assert!(out.contains("[Source 1]"));
        assert!(out.contains("[Source 2]"));
        assert!(!out.contains("[Source 3]"));
    }

    #[tokio::test]
    async fn local_backend_declines_without_sources() {
        let client = LlmClient::local();
        let out = client.generate("system", "no context here", "local").await.unwrap();
        assert!(out.contains("don't have enough information"));
    }

    #[tokio::test]
    async fn fixed_backend_replays_response() {
        let client = LlmClient::fixed("canned [Source 1]");
        let out = client.generate("s", "u", "m").await.unwrap();
        assert_eq!(out, "canned [Source 1]");
    }

    #[test]
    fn extract_chat_text_reads_message_content() {
        let value = serde_json::json!({
            "choices": [ { "message": { "content": "hello" } } ]
        });
        assert_eq!(extract_chat_text(&value).as_deref(), Some("hello"));
    }
}
