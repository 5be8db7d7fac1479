//! OpenAI-compatible chat-completions client.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Instant;

use super::ProviderClient;
use super::response;
use crate::config::{HttpClientConfig, ProviderConfig, ProviderKind, RetryConfig};
use crate::error::ProviderError;
use crate::retry::{Retried, with_retry};
use crate::types::{ConnectionTestResult, TranslateField, TranslationResult};
use crate::{Error, Result};

const DEFAULT_SYSTEM_PROMPT: &str = "你是一个专业的学术文献翻译助手，请将以下英文翻译为中文，保持学术性和准确性。只返回翻译结果，不要添加任何解释。";

const PROBE_MESSAGE: &str = "Hi";
const PROBE_MAX_TOKENS: u32 = 5;

/// Provider client speaking the chat-completions protocol over HTTP
///
/// Holds two connection pools: one for translations (long timeout) and one for
/// connection probes (short timeout).
pub struct HttpProviderClient {
    provider: ProviderConfig,
    endpoint: String,
    retry: RetryConfig,
    client: reqwest::Client,
    probe_client: reqwest::Client,
}

impl HttpProviderClient {
    /// Create a client for `provider`
    ///
    /// # Errors
    /// Returns error if an HTTP client cannot be created
    pub fn new(provider: ProviderConfig, retry: RetryConfig, http: &HttpClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(http.request_timeout)
            .connect_timeout(http.connect_timeout)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        let probe_client = reqwest::Client::builder()
            .timeout(http.probe_timeout)
            .connect_timeout(http.probe_connect_timeout)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint_url(&provider),
            provider,
            retry,
            client,
            probe_client,
        })
    }

    /// The URL requests are posted to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn translation_body(&self, text: &str, field: TranslateField) -> Value {
        let system_prompt = if self.provider.system_prompt.is_empty() {
            DEFAULT_SYSTEM_PROMPT
        } else {
            self.provider.system_prompt.as_str()
        };
        let user_prompt = format!("请将以下{}翻译为中文：\n\n{}", field.prompt_label(), text);

        let mut body = json!({
            "model": self.provider.model_id,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
            "temperature": self.provider.temperature,
        });
        self.apply_dialect(&mut body);
        body
    }

    fn probe_body(&self) -> Value {
        let mut body = json!({
            "model": self.provider.model_id,
            "messages": [{"role": "user", "content": PROBE_MESSAGE}],
            "max_tokens": PROBE_MAX_TOKENS,
        });
        self.apply_dialect(&mut body);
        body
    }

    fn apply_dialect(&self, body: &mut Value) {
        match self.provider.provider {
            ProviderKind::Xiaomi => {
                let mode = if self.provider.enable_thinking {
                    "enabled"
                } else {
                    "disabled"
                };
                body["thinking"] = json!({ "type": mode });
            }
            ProviderKind::Minimax => {
                body["reasoning_split"] = json!(true);
            }
            ProviderKind::OpenAi => {}
        }
    }

    fn post(&self, client: &reqwest::Client, body: &Value) -> reqwest::RequestBuilder {
        let request = client.post(&self.endpoint).json(body);
        match self.provider.provider {
            ProviderKind::Xiaomi => request.header("api-key", &self.provider.api_key),
            _ => request.bearer_auth(&self.provider.api_key),
        }
    }

    /// One request, no retries
    async fn send_once(&self, body: &Value) -> std::result::Result<String, ProviderError> {
        let response = self.post(&self.client, body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ProviderError::Http {
                status: status.as_u16(),
                message: response::error_message(status.as_u16(), &text),
            });
        }

        response::extract_content(&text)
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn translate(&self, text: &str, field: TranslateField) -> TranslationResult {
        let body = self.translation_body(text, field);

        tracing::debug!(
            provider = %self.provider.display_name(),
            field = field.prompt_label(),
            chars = text.chars().count(),
            "Sending translation request"
        );

        match with_retry(&self.retry, || self.send_once(&body)).await {
            Ok(Retried { value, retries }) => TranslationResult::translated(value, retries),
            Err(Retried { value, retries }) => {
                tracing::warn!(
                    provider = %self.provider.display_name(),
                    error = %value,
                    retries,
                    "Translation failed"
                );
                TranslationResult::failed(value.to_string(), retries)
            }
        }
    }

    async fn test_connection(&self) -> ConnectionTestResult {
        tracing::info!(endpoint = %self.endpoint, "Testing provider connection");

        let started = Instant::now();
        let outcome = self.post(&self.probe_client, &self.probe_body()).send().await;

        let (http_code, error_message) = match outcome {
            Err(e) => (None, Some(e.to_string())),
            Ok(response) => {
                let status = response.status().as_u16();
                if response.status().is_success() {
                    (Some(status), None)
                } else {
                    let body = response.text().await.unwrap_or_default();
                    (Some(status), Some(response::probe_error_message(status, &body)))
                }
            }
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        match &error_message {
            None => tracing::info!(endpoint = %self.endpoint, latency_ms, "Provider connection OK"),
            Some(e) => tracing::warn!(endpoint = %self.endpoint, error = %e, "Provider connection test failed"),
        }

        ConnectionTestResult {
            success: error_message.is_none(),
            http_code,
            error_message,
            latency_ms,
        }
    }
}

/// Request URL for a provider: `url` with `chat/completions` appended when enabled
pub(crate) fn endpoint_url(provider: &ProviderConfig) -> String {
    if !provider.auto_append_path {
        return provider.url.clone();
    }

    let mut url = provider.url.clone();
    if !url.ends_with('/') {
        url.push('/');
    }
    url.push_str("chat/completions");
    url
}
