use super::verdict::{build_prompt, parse_model_output, SYSTEM_PROMPT};
use super::{is_retryable, next_backoff, ClassifierGateway, ClassifyError, LlmSettings, ProviderKind};
use crate::scanner::{Candidate, Verdict};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Chat-completions client shared by OpenAI, DeepSeek, Azure OpenAI and
/// self-hosted OpenAI-compatible servers.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleGateway {
    http: Client,
    provider: ProviderKind,
    url: String,
    api_key: Option<String>,
    model: String,
    max_retries: u32,
}

impl OpenAiCompatibleGateway {
    pub fn new(settings: &LlmSettings) -> Result<Self> {
        let api_key = settings.require_api_key()?.map(str::to_string);
        let base = settings.resolved_base_url()?;
        let model = match settings.provider {
            // Azure routes by deployment in the URL; the model field is informational.
            ProviderKind::Azure => settings
                .resolved_model()
                .unwrap_or_else(|_| "azure-deployment".to_string()),
            _ => settings.resolved_model()?,
        };
        let url = match settings.provider {
            ProviderKind::Azure => base,
            _ if base.ends_with("/chat/completions") => base,
            _ => format!("{base}/chat/completions"),
        };
        let http = Client::builder()
            .user_agent(concat!("code-sheriff/", env!("CARGO_PKG_VERSION")))
            .timeout(settings.timeout)
            .build()
            .with_context(|| format!("failed to build {} HTTP client", settings.provider))?;
        Ok(Self {
            http,
            provider: settings.provider,
            url,
            api_key,
            model,
            max_retries: settings.max_retries,
        })
    }

    fn request(&self, payload: &ChatCompletionRequest) -> reqwest::RequestBuilder {
        let builder = self.http.post(&self.url).json(payload);
        match (&self.api_key, self.provider) {
            (Some(key), ProviderKind::Azure) => builder.header("api-key", key),
            (Some(key), _) => builder.bearer_auth(key),
            (None, _) => builder,
        }
    }

    fn provider_name(&self) -> String {
        self.provider.to_string()
    }
}

#[async_trait]
impl ClassifierGateway for OpenAiCompatibleGateway {
    async fn classify(&self, candidate: &Candidate, content: &str) -> Result<Verdict, ClassifyError> {
        let payload = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_prompt(candidate, content),
                },
            ],
            temperature: 0.1,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let mut attempt = 0u32;
        let mut backoff = Duration::from_millis(200);
        loop {
            let response = match self.request(&payload).send().await {
                Ok(resp) => resp,
                Err(err) => {
                    if attempt >= self.max_retries {
                        return Err(ClassifyError::Transport {
                            provider: self.provider_name(),
                            message: err.to_string(),
                        });
                    }
                    warn!(file = %candidate.display_path(), attempt, error = %err, "retrying classifier request");
                    sleep(backoff).await;
                    backoff = next_backoff(backoff);
                    attempt += 1;
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(ClassifyError::Authentication {
                    provider: self.provider_name(),
                    status: status.as_u16(),
                });
            }
            if !status.is_success() {
                if is_retryable(status) && attempt < self.max_retries {
                    warn!(file = %candidate.display_path(), attempt, %status, "retrying classifier request");
                    sleep(backoff).await;
                    backoff = next_backoff(backoff);
                    attempt += 1;
                    continue;
                }
                let body = response.text().await.unwrap_or_default();
                return Err(ClassifyError::Api {
                    provider: self.provider_name(),
                    status: status.as_u16(),
                    body,
                });
            }

            let chat: ChatCompletionResponse = response.json().await.map_err(|err| {
                ClassifyError::MalformedResponse(format!(
                    "failed to parse {} response: {err}",
                    self.provider
                ))
            })?;
            let content = chat
                .choices
                .into_iter()
                .find_map(|choice| choice.message.content)
                .ok_or_else(|| {
                    ClassifyError::MalformedResponse(format!(
                        "{} response missing message content",
                        self.provider
                    ))
                })?;
            debug!(file = %candidate.display_path(), attempt, "received classifier response");
            return parse_model_output(&content);
        }
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}
