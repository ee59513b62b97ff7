mod anthropic;
mod openai;
mod settings;
mod verdict;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use crate::scanner::{Candidate, Verdict};

pub use anthropic::AnthropicGateway;
pub use openai::OpenAiCompatibleGateway;
pub use settings::{LlmSettings, ProviderKind, UnknownProvider};
pub use verdict::{build_prompt, parse_model_output};

/// Capability that judges a single file's content.
///
/// Implementations own their transport concerns (timeouts, retries); callers
/// invoke `classify` at most once per candidate.
#[async_trait]
pub trait ClassifierGateway: Send + Sync {
    async fn classify(&self, candidate: &Candidate, content: &str) -> Result<Verdict, ClassifyError>;
}

/// Failures surfaced by a gateway for one candidate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("request to {provider} failed: {message}")]
    Transport { provider: String, message: String },
    #[error("{provider} API error ({status}): {body}")]
    Api {
        provider: String,
        status: u16,
        body: String,
    },
    #[error("{provider} rejected the credentials ({status})")]
    Authentication { provider: String, status: u16 },
    #[error("malformed classifier response: {0}")]
    MalformedResponse(String),
}

/// Offline gateway that judges every file clean.
#[derive(Debug, Default, Clone)]
pub struct NoopGateway;

#[async_trait]
impl ClassifierGateway for NoopGateway {
    async fn classify(&self, _candidate: &Candidate, _content: &str) -> Result<Verdict, ClassifyError> {
        Ok(Verdict {
            probability: 0.0,
            reasoning: "Classifier not configured; noop provider treats every file as clean."
                .into(),
            threats: Vec::new(),
        })
    }
}

/// Build the gateway selected by `settings.provider`.
pub fn build_gateway(settings: &LlmSettings) -> Result<Arc<dyn ClassifierGateway>> {
    let gateway: Arc<dyn ClassifierGateway> = match settings.provider {
        ProviderKind::Noop => Arc::new(NoopGateway),
        ProviderKind::Anthropic => Arc::new(AnthropicGateway::new(settings)?),
        ProviderKind::OpenAi
        | ProviderKind::DeepSeek
        | ProviderKind::Azure
        | ProviderKind::Custom
        | ProviderKind::Local => Arc::new(OpenAiCompatibleGateway::new(settings)?),
    };
    Ok(gateway)
}

/// Shared backoff schedule: 200ms doubling, capped at five seconds.
pub(crate) fn next_backoff(current: std::time::Duration) -> std::time::Duration {
    (current * 2).min(std::time::Duration::from_secs(5))
}

/// Whether an HTTP status is worth another attempt.
pub(crate) fn is_retryable(status: reqwest::StatusCode) -> bool {
    status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn noop_gateway_reports_clean() {
        let verdict = NoopGateway
            .classify(&Candidate::new("a.py"), "print(1)")
            .await
            .unwrap();
        assert_eq!(verdict.probability, 0.0);
        assert!(verdict.threats.is_empty());
    }

    #[test]
    fn builds_noop_gateway_without_credentials() {
        let settings = LlmSettings {
            provider: ProviderKind::Noop,
            ..LlmSettings::default()
        };
        assert!(build_gateway(&settings).is_ok());
    }

    #[test]
    fn remote_provider_without_key_fails_to_build() {
        let settings = LlmSettings {
            provider: ProviderKind::OpenAi,
            ..LlmSettings::default()
        };
        let err = build_gateway(&settings).err().expect("missing key");
        assert!(err.to_string().contains("LLM_API_KEY"));
    }

    #[test]
    fn backoff_is_capped() {
        assert_eq!(next_backoff(Duration::from_millis(200)), Duration::from_millis(400));
        assert_eq!(next_backoff(Duration::from_secs(4)), Duration::from_secs(5));
    }

    #[test]
    fn retries_server_errors_and_rate_limits_only() {
        assert!(is_retryable(reqwest::StatusCode::BAD_GATEWAY));
        assert!(is_retryable(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_retryable(reqwest::StatusCode::BAD_REQUEST));
        assert!(!is_retryable(reqwest::StatusCode::UNAUTHORIZED));
    }
}
