//! HTTP backend for a messages-style LLM endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{LlmBackend, OracleError};

const API_VERSION: &str = "2023-06-01";

/// Connection and sampling settings for [`HttpBackend`].
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// Like `https://api.anthropic.com` (no trailing slash needed).
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".to_string(),
            api_key: String::new(),
            model: "claude-sonnet-4-5".to_string(),
            max_tokens: 1024,
            temperature: 0.0,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// One shared `reqwest` client per backend.
pub struct HttpBackend {
    client: reqwest::Client,
    config: OracleConfig,
    endpoint: String,
}

impl HttpBackend {
    pub fn new(config: OracleConfig) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| OracleError::Unavailable(format!("build HTTP client: {e}")))?;
        let endpoint = format!("{}/v1/messages", config.base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            config,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LlmBackend for HttpBackend {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String, OracleError> {
        let request = MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            system: system_prompt,
            messages: [Message {
                role: "user",
                content: user_prompt,
            }],
        };

        debug!(url = %self.endpoint, model = %self.config.model, "sending oracle request");
        let resp = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| OracleError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "oracle request rejected");
            return Err(OracleError::Unavailable(format!(
                "server returned {}: {body}",
                status.as_u16()
            )));
        }

        let body: MessagesResponse = resp
            .json()
            .await
            .map_err(|e| OracleError::MalformedResponse(format!("response body: {e}")))?;
        collect_text(body)
    }
}

fn collect_text(body: MessagesResponse) -> Result<String, OracleError> {
    let text: String = body
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .map(|block| block.text)
        .collect();
    if text.trim().is_empty() {
        return Err(OracleError::MalformedResponse(
            "response contained no text".to_string(),
        ));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_trims_trailing_slash() {
        let backend = HttpBackend::new(OracleConfig {
            base_url: "http://localhost:8080/".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(backend.endpoint(), "http://localhost:8080/v1/messages");
    }

    #[test]
    fn request_serialises_single_user_message() {
        let request = MessagesRequest {
            model: "m",
            max_tokens: 64,
            temperature: 0.0,
            system: "sys",
            messages: [Message {
                role: "user",
                content: "hi",
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["system"], "sys");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hi");
    }

    #[test]
    fn text_blocks_are_concatenated() {
        let body: MessagesResponse = serde_json::from_str(
            r#"{"content": [
                {"type": "text", "text": "{\"is_true\":"},
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": " true}"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(collect_text(body).unwrap(), "{\"is_true\": true}");
    }

    #[test]
    fn empty_content_is_malformed() {
        let body: MessagesResponse = serde_json::from_str(r#"{"content": []}"#).unwrap();
        assert!(matches!(
            collect_text(body),
            Err(OracleError::MalformedResponse(_))
        ));
    }
}
