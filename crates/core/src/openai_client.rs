// crates/core/src/openai_client.rs

//! Blocking client for OpenAI-compatible chat completion endpoints.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ai_client::{AiClient, ChatRequest, ChatResponse, ClientError};

/// Connection settings for [`OpenAiClient`].
///
/// The API key itself is never stored in configuration; only the name of
/// the environment variable holding it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatClientConfig {
    /// Base URL up to and including the version segment, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    /// Send the key as an `api-key` header (Azure) instead of a bearer token.
    pub api_key_header: bool,
    pub request_timeout_secs: u64,
    /// Retries for HTTP 429 and 5xx responses.
    pub max_retries: u32,
}

impl Default for ChatClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_key_header: false,
            request_timeout_secs: 120,
            max_retries: 2,
        }
    }
}

pub struct OpenAiClient {
    client: Client,
    url: String,
    api_key: String,
    api_key_header: bool,
    model: String,
    max_retries: u32,
}

/// Wire body: the request plus the model name.
#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    #[serde(flatten)]
    request: &'a ChatRequest,
}

impl OpenAiClient {
    pub fn new(config: &ChatClientConfig, api_key: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            api_key_header: config.api_key_header,
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }

    /// Build a client reading the key from `config.api_key_env`.
    pub fn from_config(config: &ChatClientConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .with_context(|| format!("{} not set", config.api_key_env))?;
        debug!(model = %config.model, url = %config.base_url, "using chat completions endpoint");
        Self::new(config, &api_key)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn send(&self, body: &CompletionBody<'_>) -> std::result::Result<ChatResponse, ClientError> {
        let mut builder = self.client.post(&self.url).json(body);
        builder = if self.api_key_header {
            builder.header("api-key", &self.api_key)
        } else {
            builder.bearer_auth(&self.api_key)
        };

        let response = builder.send().map_err(classify)?;
        let status = response.status();
        let text = response.text().map_err(classify)?;
        if !status.is_success() {
            return Err(ClientError::Http {
                status: status.as_u16(),
                body: text.chars().take(500).collect(),
            });
        }
        serde_json::from_str(&text).map_err(|e| ClientError::Decode(e.to_string()))
    }
}

fn classify(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout
    } else if err.is_decode() {
        ClientError::Decode(err.to_string())
    } else {
        ClientError::Network(err.to_string())
    }
}

fn is_transient(err: &ClientError) -> bool {
    match err {
        ClientError::Http { status, .. } => *status == 429 || *status >= 500,
        ClientError::Network(_) => true,
        ClientError::Timeout | ClientError::Decode(_) => false,
    }
}

impl AiClient for OpenAiClient {
    fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let body = CompletionBody {
            model: &self.model,
            request: &request,
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.send(&body) {
                Ok(response) => return Ok(response),
                Err(err) if is_transient(&err) && attempt <= self.max_retries => {
                    let delay = Duration::from_secs(2 * attempt as u64 * attempt as u64);
                    warn!(attempt, delay_secs = delay.as_secs(), error = %err, "chat request failed, retrying");
                    std::thread::sleep(delay);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai_client::user_message;

    #[test]
    fn test_body_flattens_request_with_model() {
        let request = ChatRequest::new(vec![user_message("hi")]);
        let body = CompletionBody {
            model: "gpt-4o-mini",
            request: &request,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["model"], "gpt-4o-mini");
        assert_eq!(value["messages"][0]["content"], "hi");
    }

    #[test]
    fn test_transient_classification() {
        assert!(is_transient(&ClientError::Http { status: 429, body: String::new() }));
        assert!(is_transient(&ClientError::Http { status: 503, body: String::new() }));
        assert!(!is_transient(&ClientError::Http { status: 401, body: String::new() }));
        assert!(!is_transient(&ClientError::Timeout));
    }

    #[test]
    fn test_url_is_built_from_base() {
        let config = ChatClientConfig {
            base_url: "http://localhost:11434/v1/".into(),
            ..ChatClientConfig::default()
        };
        let client = OpenAiClient::new(&config, "key").unwrap();
        assert_eq!(client.url, "http://localhost:11434/v1/chat/completions");
        assert_eq!(client.model(), "gpt-4o-mini");
    }
}
