
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::Config;
use crate::llm::{ChatMessage, ChatModel, EmbeddingModel};

const DEFAULT_TIMEOUT_SECONDS: u64 = 60;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Client for an OpenAI-compatible chat and embedding endpoint
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    base_url: Url,
    api_key: String,
    chat_model: String,
    embedding_model: String,
    batch_size: u32,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: String,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Debug, Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub id: String,
}

impl OpenAiClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config
            .llm
            .endpoint_url()
            .context("Failed to build endpoint URL from config")?;

        let api_key = std::env::var(&config.llm.api_key_env).unwrap_or_default();
        if api_key.is_empty() {
            warn!(
                "Environment variable {} is unset or empty, requests will be unauthenticated",
                config.llm.api_key_env
            );
        }

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            api_key,
            chat_model: config.llm.chat_model.clone(),
            embedding_model: config.llm.embedding_model.clone(),
            batch_size: config.llm.batch_size,
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Test that the endpoint is reachable and lists the configured models
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Performing health check against {}", self.base_url);

        let models = self.list_models().context("Failed to list models")?;

        for wanted in [&self.chat_model, &self.embedding_model] {
            if !models.iter().any(|m| &m.id == wanted) {
                let available: Vec<&str> = models.iter().map(|m| m.id.as_str()).collect();
                warn!(
                    "Model {} not advertised by endpoint. Available: {:?}",
                    wanted, available
                );
            }
        }

        info!("Health check passed for endpoint at {}", self.base_url);
        Ok(())
    }

    /// List the models the endpoint advertises
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self
            .base_url
            .join("models")
            .context("Failed to build models URL")?;

        let auth = format!("Bearer {}", self.api_key);
        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .get(url.as_str())
                    .header("Authorization", auth.as_str())
                    .call()
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to fetch models")?;

        let models_response: ModelsResponse =
            serde_json::from_str(&response_text).context("Failed to parse models response")?;

        debug!("Endpoint advertises {} models", models_response.data.len());
        Ok(models_response.data)
    }

    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let url = self
            .base_url
            .join("embeddings")
            .context("Failed to build embeddings URL")?;

        let auth = format!("Bearer {}", self.api_key);
        let mut results = Vec::with_capacity(texts.len());

        // Batched so large populates do not overwhelm the endpoint
        for chunk in texts.chunks(self.batch_size as usize) {
            let request = EmbedRequest {
                model: &self.embedding_model,
                input: chunk,
            };
            let request_json = serde_json::to_string(&request)
                .context("Failed to serialize embedding request")?;

            let response_text = self
                .make_request_with_retry(|| {
                    self.agent
                        .post(url.as_str())
                        .header("Authorization", auth.as_str())
                        .header("Content-Type", "application/json")
                        .send(&request_json)
                        .and_then(|mut resp| resp.body_mut().read_to_string())
                })
                .with_context(|| format!("Failed to embed batch of {} texts", chunk.len()))?;

            let embed_response: EmbedResponse = serde_json::from_str(&response_text)
                .context("Failed to parse embedding response")?;

            if embed_response.data.len() != chunk.len() {
                return Err(anyhow::anyhow!(
                    "Mismatch between request and response counts: {} vs {}",
                    chunk.len(),
                    embed_response.data.len()
                ));
            }

            results.extend(embed_response.data.into_iter().map(|d| d.embedding));
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 {
                                warn!(
                                    "Server error (status {}), attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true
                            } else {
                                warn!("Client error (status {}), not retrying", status);
                                return Err(anyhow::anyhow!("Client error: HTTP {}", status));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => {
                            warn!("Non-retryable error: {}", error);
                            false
                        }
                    };

                    if !should_retry {
                        return Err(anyhow::anyhow!("Non-retryable error: {}", error));
                    }

                    last_error = Some(anyhow::anyhow!("Request error: {}", error));

                    if attempt < self.retry_attempts {
                        let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                        let delay = Duration::from_millis(delay_ms);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Request failed after retries")))
    }
}

impl ChatModel for OpenAiClient {
    #[inline]
    fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        debug!("Requesting chat completion for {} messages", messages.len());

        let url = self
            .base_url
            .join("chat/completions")
            .context("Failed to build chat completions URL")?;

        let request = ChatRequest {
            model: &self.chat_model,
            messages,
        };
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize chat request")?;

        let auth = format!("Bearer {}", self.api_key);
        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .post(url.as_str())
                    .header("Authorization", auth.as_str())
                    .header("Content-Type", "application/json")
                    .send(&request_json)
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to request chat completion")?;

        let parsed: ChatResponse =
            serde_json::from_str(&response_text).context("Failed to parse chat response")?;

        let reply = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow::anyhow!("Chat response contained no choices"))?;

        debug!("Received reply of {} chars", reply.len());
        Ok(reply)
    }
}

impl EmbeddingModel for OpenAiClient {
    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let texts = [text.to_string()];
        let mut embeddings = self.embed_texts(&texts)?;
        embeddings
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Embedding response contained no data"))
    }

    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed_texts(texts)
    }
}
