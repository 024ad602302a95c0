use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::{Collaborator, CollaboratorConfig};

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },

    #[error("response contained no text")]
    EmptyContent,

    #[error("{0} is not set (environment or .env)")]
    MissingApiKey(String),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl GenerateResponse {
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

/// Gemini `generateContent` over HTTPS. Retries 429 and 5xx with exponential backoff.
pub struct GeminiCollaborator {
    client: Client,
    url: String,
    api_key: Option<String>,
    api_key_env: String,
    temperature: f32,
    max_retries: u32,
    label: String,
}

impl GeminiCollaborator {
    pub fn new(cfg: &CollaboratorConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .build()
            .context("build HTTP client")?;
        let url = format!(
            "{}/models/{}:generateContent",
            cfg.endpoint.trim_end_matches('/'),
            cfg.model
        );
        Ok(Self {
            client,
            url,
            api_key: cfg.api_key.clone(),
            api_key_env: cfg.api_key_env.clone(),
            temperature: cfg.temperature,
            max_retries: cfg.max_retries,
            label: format!("gemini:{}", cfg.model),
        })
    }

    async fn call(&self, prompt: &str) -> Result<String, GeminiError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| GeminiError::MissingApiKey(self.api_key_env.clone()))?;
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        };

        // One initial attempt plus `max_retries` retries.
        let attempts = self.max_retries.saturating_add(1);
        let mut last_error: Option<GeminiError> = None;
        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = backoff_delay(attempt);
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "collaborator call failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }

            let response = match self
                .client
                .post(&self.url)
                .header("x-goog-api-key", api_key)
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(GeminiError::Http(e));
                    continue;
                }
            };

            let status = response.status();
            if status.as_u16() == 429 || status.is_server_error() {
                let text = response.text().await.unwrap_or_default();
                last_error = Some(GeminiError::Api {
                    status: status.as_u16(),
                    message: text,
                });
                continue;
            }
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ApiErrorEnvelope>(&text)
                    .map(|e| e.error.message)
                    .unwrap_or(text);
                return Err(GeminiError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let parsed: GenerateResponse = response.json().await?;
            if let Some(u) = parsed.usage_metadata.as_ref() {
                debug!(
                    prompt_tokens = u.prompt_token_count,
                    output_tokens = u.candidates_token_count,
                    "collaborator call succeeded"
                );
            }
            let text = parsed.text();
            if text.trim().is_empty() {
                return Err(GeminiError::EmptyContent);
            }
            return Ok(text);
        }

        Err(GeminiError::Exhausted {
            attempts,
            last: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }
}

/// 1s before the first retry, doubling after that (capped at 32s).
fn backoff_delay(retry: u32) -> Duration {
    Duration::from_secs(1 << retry.saturating_sub(1).min(5))
}

#[async_trait]
impl Collaborator for GeminiCollaborator {
    fn name(&self) -> &str {
        &self.label
    }

    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        let t0 = Instant::now();
        let out = self.call(prompt).await?;
        debug!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            chars = out.len(),
            "collaborator replied"
        );
        Ok(out)
    }
}
