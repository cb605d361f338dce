//! Inference backend abstraction and implementations.
//!
//! Concrete backends are dispatched through the [`LlmBackend`] enum, which
//! implements the [`InferenceBackend`] trait the rest of the agent depends
//! on. Tests substitute their own trait implementations.
//!
//! Inference is a best-effort oracle: [`InferenceClient`] enforces a hard
//! deadline, strips reasoning blocks, and reports every failure as an
//! [`InferenceError`]. Callers always have a deterministic fallback.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::config::{BackendType, InferenceConfig};
use crate::parse::clean_generated_text;
use crate::prompt::RenderedPrompt;

/// Errors from the inference backend. None of them are fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InferenceError {
    /// No reply within the deadline.
    #[error("inference timed out after {0:?}")]
    Timeout(Duration),

    /// HTTP failure or non-success status.
    #[error("inference backend error: {0}")]
    Backend(String),

    /// A reply arrived but holds nothing usable.
    #[error("unusable inference output: {0}")]
    Unusable(String),
}

/// One generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// System prompt.
    pub system: String,
    /// User prompt.
    pub prompt: String,
    /// Token budget.
    pub max_tokens: u32,
    /// Stop sequences.
    pub stop: Vec<String>,
}

impl GenerationRequest {
    /// Build a request from a rendered prompt.
    pub fn from_prompt(prompt: RenderedPrompt, max_tokens: u32) -> Self {
        Self {
            system: prompt.system,
            prompt: prompt.user,
            max_tokens,
            stop: Vec::new(),
        }
    }

    /// Add stop sequences.
    #[must_use]
    pub fn with_stop(mut self, stop: &[&str]) -> Self {
        self.stop = stop.iter().map(|s| (*s).to_owned()).collect();
        self
    }
}

/// A text-generation backend.
pub trait InferenceBackend: Send + Sync {
    /// Generate text for `request`.
    fn generate(
        &self,
        request: &GenerationRequest,
    ) -> impl Future<Output = Result<String, InferenceError>> + Send;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

/// Deadline-enforcing wrapper around a backend.
pub struct InferenceClient<B> {
    backend: B,
    timeout: Duration,
}

impl<B: InferenceBackend> InferenceClient<B> {
    /// Wrap `backend` with a per-call deadline.
    pub const fn new(backend: B, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// The per-call deadline.
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The wrapped backend.
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Generate text, never waiting longer than the deadline.
    ///
    /// Reasoning blocks are stripped; an empty remainder is
    /// [`InferenceError::Unusable`].
    pub async fn ask(&self, request: &GenerationRequest) -> Result<String, InferenceError> {
        let raw = tokio::time::timeout(self.timeout, self.backend.generate(request))
            .await
            .map_err(|_elapsed| InferenceError::Timeout(self.timeout))??;
        let cleaned = clean_generated_text(&raw);
        if cleaned.is_empty() {
            return Err(InferenceError::Unusable("empty reply".to_owned()));
        }
        debug!(backend = self.backend.name(), chars = cleaned.len(), "inference reply");
        Ok(cleaned)
    }
}

// ---------------------------------------------------------------------------
// Unified backend enum
// ---------------------------------------------------------------------------

/// The concrete backends, selected by configuration.
pub enum LlmBackend {
    /// Ollama native API.
    Ollama(OllamaBackend),
    /// OpenAI-compatible chat completions API.
    OpenAi(OpenAiBackend),
    /// Anthropic Messages API.
    Anthropic(AnthropicBackend),
}

impl InferenceBackend for LlmBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, InferenceError> {
        match self {
            Self::Ollama(backend) => backend.generate(request).await,
            Self::OpenAi(backend) => backend.generate(request).await,
            Self::Anthropic(backend) => backend.generate(request).await,
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Ollama(_) => "ollama",
            Self::OpenAi(_) => "openai-compatible",
            Self::Anthropic(_) => "anthropic",
        }
    }
}

/// Create the backend selected by `config`.
pub fn create_backend(config: &InferenceConfig) -> Result<LlmBackend, InferenceError> {
    // The HTTP timeout is a backstop; InferenceClient enforces the real one.
    let client = reqwest::Client::builder()
        .timeout(config.timeout().saturating_add(Duration::from_secs(5)))
        .build()
        .map_err(|e| InferenceError::Backend(format!("failed to build HTTP client: {e}")))?;
    let settings = Settings {
        client,
        api_url: config.api_url.trim_end_matches('/').to_owned(),
        api_key: config.api_key.clone(),
        model: config.model.clone(),
        temperature: config.temperature,
        top_p: config.top_p,
    };
    Ok(match config.backend {
        BackendType::Ollama => LlmBackend::Ollama(OllamaBackend(settings)),
        BackendType::OpenAi => LlmBackend::OpenAi(OpenAiBackend(settings)),
        BackendType::Anthropic => LlmBackend::Anthropic(AnthropicBackend(settings)),
    })
}

/// Connection settings shared by every backend.
struct Settings {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    top_p: f32,
}

impl Settings {
    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        headers: &[(&str, &str)],
        label: &str,
    ) -> Result<serde_json::Value, InferenceError> {
        let mut request = self.client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let response = request
            .send()
            .await
            .map_err(|e| InferenceError::Backend(format!("{label} request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_owned());
            return Err(InferenceError::Backend(format!(
                "{label} returned {status}: {error_body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| InferenceError::Backend(format!("{label} response parse failed: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Ollama
// ---------------------------------------------------------------------------

/// Backend for Ollama's native `/api/generate` endpoint.
pub struct OllamaBackend(Settings);

impl OllamaBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, InferenceError> {
        let settings = &self.0;
        let url = format!("{}/api/generate", settings.api_url);
        let body = serde_json::json!({
            "model": settings.model,
            "system": request.system,
            "prompt": request.prompt,
            "stream": false,
            "options": {
                "temperature": settings.temperature,
                "top_p": settings.top_p,
                "top_k": 20,
                "repeat_penalty": 1.2,
                "num_predict": request.max_tokens,
                "stop": request.stop,
            }
        });
        let json = settings.post_json(&url, &body, &[], "Ollama").await?;
        extract_ollama_content(&json)
    }
}

/// Extract the text from an Ollama generate response.
fn extract_ollama_content(json: &serde_json::Value) -> Result<String, InferenceError> {
    json.get("response")
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| InferenceError::Backend("Ollama response missing `response`".to_owned()))
}

// ---------------------------------------------------------------------------
// OpenAI-compatible
// ---------------------------------------------------------------------------

/// Backend for `OpenAI`-compatible chat completions APIs.
///
/// Sends requests to `{api_url}/chat/completions`.
pub struct OpenAiBackend(Settings);

impl OpenAiBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, InferenceError> {
        let settings = &self.0;
        let url = format!("{}/chat/completions", settings.api_url);
        let mut body = serde_json::json!({
            "model": settings.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.prompt}
            ],
            "temperature": settings.temperature,
            "top_p": settings.top_p,
            "max_tokens": request.max_tokens,
        });
        if !request.stop.is_empty()
            && let Some(fields) = body.as_object_mut()
        {
            fields.insert("stop".to_owned(), serde_json::json!(request.stop));
        }
        let auth = format!("Bearer {}", settings.api_key);
        let json = settings
            .post_json(&url, &body, &[("Authorization", auth.as_str())], "OpenAI")
            .await?;
        extract_openai_content(&json)
    }
}

/// Extract the text content from an `OpenAI` chat completions response.
fn extract_openai_content(json: &serde_json::Value) -> Result<String, InferenceError> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| {
            InferenceError::Backend("OpenAI response missing choices[0].message.content".to_owned())
        })
}

// ---------------------------------------------------------------------------
// Anthropic
// ---------------------------------------------------------------------------

/// Backend for the Anthropic Messages API.
///
/// System prompt is a top-level field and the reply text is at
/// `content[0].text`.
pub struct AnthropicBackend(Settings);

impl AnthropicBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, InferenceError> {
        let settings = &self.0;
        let url = format!("{}/messages", settings.api_url);
        let body = serde_json::json!({
            "model": settings.model,
            "max_tokens": request.max_tokens,
            "system": request.system,
            "temperature": settings.temperature,
            "stop_sequences": request.stop,
            "messages": [
                {"role": "user", "content": request.prompt}
            ]
        });
        let json = settings
            .post_json(
                &url,
                &body,
                &[
                    ("x-api-key", settings.api_key.as_str()),
                    ("anthropic-version", "2023-06-01"),
                ],
                "Anthropic",
            )
            .await?;
        extract_anthropic_content(&json)
    }
}

/// Extract the text content from an Anthropic Messages API response.
fn extract_anthropic_content(json: &serde_json::Value) -> Result<String, InferenceError> {
    json.get("content")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("text"))
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| {
            InferenceError::Backend("Anthropic response missing content[0].text".to_owned())
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct Scripted(&'static str);

    impl InferenceBackend for Scripted {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String, InferenceError> {
            Ok(self.0.to_owned())
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct Stalled;

    impl InferenceBackend for Stalled {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String, InferenceError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("too late".to_owned())
        }

        fn name(&self) -> &str {
            "stalled"
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            system: "s".to_owned(),
            prompt: "p".to_owned(),
            max_tokens: 10,
            stop: Vec::new(),
        }
    }

    #[tokio::test]
    async fn ask_strips_reasoning() {
        let client = InferenceClient::new(Scripted("<think>plan</think> Deal?"), Duration::from_secs(1));
        assert_eq!(client.ask(&request()).await.unwrap(), "Deal?");
    }

    #[tokio::test]
    async fn ask_rejects_empty_reply() {
        let client = InferenceClient::new(Scripted("<think>only thoughts</think>"), Duration::from_secs(1));
        assert!(matches!(
            client.ask(&request()).await,
            Err(InferenceError::Unusable(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn ask_times_out() {
        let client = InferenceClient::new(Stalled, Duration::from_secs(30));
        assert_eq!(
            client.ask(&request()).await,
            Err(InferenceError::Timeout(Duration::from_secs(30)))
        );
    }

    #[test]
    fn extract_openai() {
        let json = serde_json::json!({"choices": [{"message": {"content": "hi"}}]});
        assert_eq!(extract_openai_content(&json).unwrap(), "hi");
        assert!(extract_openai_content(&serde_json::json!({})).is_err());
    }

    #[test]
    fn extract_anthropic() {
        let json = serde_json::json!({"content": [{"type": "text", "text": "hola"}]});
        assert_eq!(extract_anthropic_content(&json).unwrap(), "hola");
    }

    #[test]
    fn extract_ollama() {
        let json = serde_json::json!({"response": "ok", "done": true});
        assert_eq!(extract_ollama_content(&json).unwrap(), "ok");
    }

    #[test]
    fn create_backend_follows_config() {
        let config = InferenceConfig {
            backend: BackendType::Anthropic,
            ..InferenceConfig::default()
        };
        assert_eq!(create_backend(&config).unwrap().name(), "anthropic");
    }
}
