//! OpenAI-compatible chat completions client.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::TransformConfig;
use crate::error::{Error, Result, TransformError};

use super::TextTransformer;

/// [`TextTransformer`] backed by the `/chat/completions` endpoint.
///
/// Each chunk is sent as a single user message. The first choice's content is
/// returned with surrounding whitespace trimmed.
#[derive(Clone)]
pub struct OpenAiTransformer {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl std::fmt::Debug for OpenAiTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiTransformer")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

impl OpenAiTransformer {
    /// Build a client from configuration
    pub fn new(config: &TransformConfig) -> Result<Self> {
        let base = url::Url::parse(&config.base_url)
            .map_err(|e| Error::config("OPENAI_BASE_URL", format!("invalid URL: {e}")))?;
        let endpoint = format!("{}/chat/completions", base.as_str().trim_end_matches('/'));

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    /// Full URL requests are sent to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait::async_trait]
impl TextTransformer for OpenAiTransformer {
    async fn transform(&self, chunk: &str) -> std::result::Result<String, TransformError> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: chunk,
            }],
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransformError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| TransformError::InvalidResponse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(TransformError::EmptyResponse)?;

        Ok(content.trim().to_string())
    }
}
