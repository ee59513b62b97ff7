use super::verdict::{build_prompt, parse_model_output, SYSTEM_PROMPT};
use super::{is_retryable, next_backoff, ClassifierGateway, ClassifyError, LlmSettings};
use crate::scanner::{Candidate, Verdict};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 1024;

#[derive(Debug, Clone)]
pub struct AnthropicGateway {
    http: Client,
    url: String,
    api_key: String,
    model: String,
    max_retries: u32,
}

impl AnthropicGateway {
    pub fn new(settings: &LlmSettings) -> Result<Self> {
        let api_key = settings
            .require_api_key()?
            .map(str::to_string)
            .unwrap_or_default();
        let url = format!("{}/v1/messages", settings.resolved_base_url()?);
        let http = Client::builder()
            .user_agent(concat!("code-sheriff/", env!("CARGO_PKG_VERSION")))
            .timeout(settings.timeout)
            .build()
            .context("failed to build Anthropic HTTP client")?;
        Ok(Self {
            http,
            url,
            api_key,
            model: settings.resolved_model()?,
            max_retries: settings.max_retries,
        })
    }
}

#[async_trait]
impl ClassifierGateway for AnthropicGateway {
    async fn classify(&self, candidate: &Candidate, content: &str) -> Result<Verdict, ClassifyError> {
        let payload = AnthropicRequest {
            model: self.model.clone(),
            system: SYSTEM_PROMPT.to_string(),
            messages: vec![AnthropicMessage {
                role: "user".into(),
                content: build_prompt(candidate, content),
            }],
            max_tokens: MAX_OUTPUT_TOKENS,
            temperature: 0.1,
        };

        let mut attempt = 0u32;
        let mut backoff = Duration::from_millis(200);
        loop {
            let response = self
                .http
                .post(&self.url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&payload)
                .send()
                .await;

            let response = match response {
                Ok(resp) => resp,
                Err(err) => {
                    if attempt >= self.max_retries {
                        return Err(ClassifyError::Transport {
                            provider: "anthropic".into(),
                            message: err.to_string(),
                        });
                    }
                    warn!(file = %candidate.display_path(), attempt, error = %err, "retrying Anthropic request");
                    sleep(backoff).await;
                    backoff = next_backoff(backoff);
                    attempt += 1;
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(ClassifyError::Authentication {
                    provider: "anthropic".into(),
                    status: status.as_u16(),
                });
            }
            if !status.is_success() {
                if is_retryable(status) && attempt < self.max_retries {
                    warn!(file = %candidate.display_path(), attempt, %status, "retrying Anthropic request");
                    sleep(backoff).await;
                    backoff = next_backoff(backoff);
                    attempt += 1;
                    continue;
                }
                let body = response.text().await.unwrap_or_default();
                return Err(ClassifyError::Api {
                    provider: "anthropic".into(),
                    status: status.as_u16(),
                    body,
                });
            }

            let message: AnthropicResponse = response.json().await.map_err(|err| {
                ClassifyError::MalformedResponse(format!("failed to parse Anthropic response: {err}"))
            })?;
            let content = message
                .content
                .into_iter()
                .find_map(|part| part.text)
                .ok_or_else(|| {
                    ClassifyError::MalformedResponse("Anthropic response missing message content".into())
                })?;
            debug!(file = %candidate.display_path(), attempt, "received Anthropic response");
            return parse_model_output(&content);
        }
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    system: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    _type: String,
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ProviderKind;
    use httpmock::prelude::*;

    fn base_settings(url: String) -> LlmSettings {
        LlmSettings {
            provider: ProviderKind::Anthropic,
            api_key: Some("test-key".into()),
            api_url: Some(url),
            model: Some("claude-test".into()),
            timeout: Duration::from_secs(5),
            max_retries: 0,
        }
    }

    #[test]
    fn requires_api_key() {
        let mut settings = base_settings("https://api.anthropic.com".into());
        settings.api_key = None;
        let err = AnthropicGateway::new(&settings).unwrap_err();
        assert!(err.to_string().contains("anthropic API key"));
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn classify_parses_successful_response() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/messages")
                .header("x-api-key", "test-key");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"content":[{"type":"text","text":"{\"is_malicious\":false,\"malicious_probability\":0.4,\"reasoning\":\"odd eval\",\"identified_threats\":[]}"}]}"#);
        });

        let gateway = AnthropicGateway::new(&base_settings(server.base_url())).unwrap();
        let verdict = gateway
            .classify(&Candidate::new("x.js"), "eval(atob(s))")
            .await
            .unwrap();
        assert_eq!(verdict.probability, 0.4);
        assert_eq!(verdict.reasoning, "odd eval");
        mock.assert();
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn retries_on_failure() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/v1/messages");
            then.status(500);
        });

        let mut settings = base_settings(server.base_url());
        settings.max_retries = 1;
        let gateway = AnthropicGateway::new(&settings).unwrap();
        let err = gateway
            .classify(&Candidate::new("x.js"), "x")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("anthropic API error"));
        mock.assert_hits(2);
    }
}
