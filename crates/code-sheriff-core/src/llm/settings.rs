use std::{fmt, str::FromStr, time::Duration};

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Supported classifier backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    DeepSeek,
    Anthropic,
    Azure,
    Custom,
    Local,
    Noop,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::DeepSeek => "deepseek",
            Self::Anthropic => "anthropic",
            Self::Azure => "azure",
            Self::Custom => "custom",
            Self::Local => "local",
            Self::Noop => "noop",
        }
    }

    /// Self-hosted backends may run without credentials.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Self::Custom | Self::Local | Self::Noop)
    }

    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("https://api.openai.com/v1"),
            Self::DeepSeek => Some("https://api.deepseek.com/v1"),
            Self::Anthropic => Some("https://api.anthropic.com"),
            Self::Local => Some("http://localhost:11434/v1"),
            Self::Azure | Self::Custom | Self::Noop => None,
        }
    }

    pub fn default_model(&self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("gpt-4o-mini"),
            Self::DeepSeek => Some("deepseek-coder"),
            Self::Anthropic => Some("claude-3-5-haiku-latest"),
            Self::Azure | Self::Custom | Self::Local | Self::Noop => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown LLM provider `{0}` (expected openai, deepseek, anthropic, azure, custom, local or noop)")]
pub struct UnknownProvider(pub String);

impl FromStr for ProviderKind {
    type Err = UnknownProvider;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "deepseek" => Ok(Self::DeepSeek),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "azure" => Ok(Self::Azure),
            "custom" => Ok(Self::Custom),
            "local" => Ok(Self::Local),
            "noop" => Ok(Self::Noop),
            _ => Err(UnknownProvider(raw.trim().to_string())),
        }
    }
}

/// Connection settings for the selected classifier backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmSettings {
    pub provider: ProviderKind,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub model: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::DeepSeek,
            api_key: None,
            api_url: None,
            model: None,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl LlmSettings {
    /// API key, or an error when the provider needs one and none was configured.
    pub fn require_api_key(&self) -> Result<Option<&str>> {
        let key = self.api_key.as_deref().filter(|k| !k.trim().is_empty());
        if key.is_none() && self.provider.requires_api_key() {
            bail!(
                "{} API key must be provided via LLM_API_KEY or --api-key",
                self.provider
            );
        }
        Ok(key)
    }

    pub fn resolved_base_url(&self) -> Result<String> {
        match self
            .api_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .or(self.provider.default_base_url())
        {
            Some(url) => Ok(url.trim().trim_end_matches('/').to_string()),
            None => bail!(
                "provider `{}` requires LLM_API_URL or --api-url to be set",
                self.provider
            ),
        }
    }

    pub fn resolved_model(&self) -> Result<String> {
        match self
            .model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .or(self.provider.default_model())
        {
            Some(model) => Ok(model.trim().to_string()),
            None => bail!(
                "provider `{}` requires LLM_MODEL or --model to be set",
                self.provider
            ),
        }
    }
}
