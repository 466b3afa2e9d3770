use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::error::AnthropicError;
use super::types::{Message, MessagesRequest, MessagesResponse};
use crate::error::Result;
use crate::services::CompletionService;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

pub struct AnthropicClient {
    api_key: String,
    client: Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl AnthropicClient {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Result<Self, AnthropicError> {
        Self::with_base_url(api_key, model, API_URL.to_string(), timeout)
    }

    /// Create a client pointing at a custom base URL (useful for testing).
    pub fn with_base_url(
        api_key: String,
        model: String,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self, AnthropicError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            api_key,
            client,
            base_url,
            model,
            timeout,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn send_message(
        &self,
        req: &MessagesRequest,
    ) -> Result<MessagesResponse, AnthropicError> {
        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(req)
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs.saturating_mul(1000))
                .unwrap_or(1000);
            return Err(AnthropicError::RateLimited {
                retry_after_ms: retry_after,
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(AnthropicError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.json::<MessagesResponse>().await?;
        debug!(
            model = %body.model,
            input_tokens = body.usage.input_tokens,
            output_tokens = body.usage.output_tokens,
            "completion received"
        );
        Ok(body)
    }
}

#[async_trait]
impl CompletionService for AnthropicClient {
    fn request_timeout(&self) -> Option<Duration> {
        Some(self.timeout)
    }

    async fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        let req = MessagesRequest {
            model: self.model.clone(),
            max_tokens,
            system: (!system.is_empty()).then(|| system.to_string()),
            temperature: Some(temperature),
            messages: vec![Message {
                role: "user".into(),
                content: user.to_string(),
            }],
        };
        let response = self.send_message(&req).await?;
        Ok(response.text().ok_or(AnthropicError::EmptyResponse)?)
    }
}
