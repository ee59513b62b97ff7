use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use crate::llm::{LlmSettings, ProviderKind};
use crate::scanner::orchestrator::DEFAULT_MAX_CONCURRENT_REQUESTS;
use crate::scanner::policy::{PolicyFilter, DEFAULT_EXTENSIONS, DEFAULT_MAX_FILE_SIZE};
use crate::scanner::{ThresholdError, VerdictThresholds};

/// Errors raised while loading or validating configuration. All of them are
/// fatal before any scanning starts.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Source(#[from] config::ConfigError),
    #[error(transparent)]
    Provider(#[from] crate::llm::UnknownProvider),
    #[error(transparent)]
    Thresholds(#[from] ThresholdError),
    #[error("LLM_TIMEOUT `{value}` is not a valid duration: {source}")]
    Timeout {
        value: String,
        source: humantime::DurationError,
    },
    #[error("MAX_CONCURRENT_REQUESTS must be at least 1")]
    ZeroConcurrency,
    #[error("SUPPORTED_EXTENSIONS must list at least one extension")]
    NoExtensions,
}

/// Scan-side settings: dispatch limit, bucket thresholds and eligibility policy.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSettings {
    pub max_concurrent_requests: usize,
    pub thresholds: VerdictThresholds,
    pub policy: PolicyFilter,
}

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub llm: LlmSettings,
    pub scan: ScanSettings,
}

/// Command-line values that take precedence over file and environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub workers: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    llm_provider: String,
    llm_api_key: Option<String>,
    llm_api_url: Option<String>,
    llm_model: Option<String>,
    llm_timeout: String,
    llm_max_retries: u32,
    max_concurrent_requests: usize,
    malicious_threshold: f64,
    suspicious_threshold: Option<f64>,
    max_file_size: u64,
    supported_extensions: String,
}

impl AppConfig {
    /// Load defaults, then the optional config file, then process environment.
    ///
    /// File keys use the same flat names as the environment, lowercased
    /// (`llm_provider`, `max_concurrent_requests`, ...).
    pub fn load(config_file: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder = Config::builder()
            .set_default("llm_provider", ProviderKind::DeepSeek.as_str())?
            .set_default("llm_timeout", "60s")?
            .set_default("llm_max_retries", 2_i64)?
            .set_default(
                "max_concurrent_requests",
                DEFAULT_MAX_CONCURRENT_REQUESTS as i64,
            )?
            .set_default("malicious_threshold", VerdictThresholds::default().malicious)?
            .set_default("max_file_size", DEFAULT_MAX_FILE_SIZE as i64)?
            .set_default("supported_extensions", DEFAULT_EXTENSIONS.join(","))?;
        if let Some(path) = config_file {
            builder = builder.add_source(File::from(path).required(true));
        }
        // Values stay strings until deserialization so keys like `000123` survive.
        builder = builder.add_source(Environment::default());

        let raw: RawConfig = builder.build()?.try_deserialize()?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, SettingsError> {
        let provider: ProviderKind = raw.llm_provider.parse()?;
        let timeout = parse_timeout(&raw.llm_timeout)?;
        let thresholds = VerdictThresholds::new(raw.malicious_threshold, raw.suspicious_threshold)?;
        if raw.max_concurrent_requests == 0 {
            return Err(SettingsError::ZeroConcurrency);
        }
        let policy = PolicyFilter::new(raw.supported_extensions.split(','), raw.max_file_size);
        if policy.extensions().is_empty() {
            return Err(SettingsError::NoExtensions);
        }

        Ok(Self {
            llm: LlmSettings {
                provider,
                api_key: non_blank(raw.llm_api_key),
                api_url: non_blank(raw.llm_api_url),
                model: non_blank(raw.llm_model),
                timeout,
                max_retries: raw.llm_max_retries,
            },
            scan: ScanSettings {
                max_concurrent_requests: raw.max_concurrent_requests,
                thresholds,
                policy,
            },
        })
    }

    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply(&mut self, overrides: Overrides) -> Result<(), SettingsError> {
        if let Some(provider) = overrides.provider {
            self.llm.provider = provider.parse()?;
        }
        if let Some(model) = non_blank(overrides.model) {
            self.llm.model = Some(model);
        }
        if let Some(key) = non_blank(overrides.api_key) {
            self.llm.api_key = Some(key);
        }
        if let Some(url) = non_blank(overrides.api_url) {
            self.llm.api_url = Some(url);
        }
        if let Some(workers) = overrides.workers {
            if workers == 0 {
                return Err(SettingsError::ZeroConcurrency);
            }
            self.scan.max_concurrent_requests = workers;
        }
        Ok(())
    }
}

fn parse_timeout(raw: &str) -> Result<Duration, SettingsError> {
    let trimmed = raw.trim();
    // Bare numbers are seconds.
    if let Ok(secs) = trimmed.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(trimmed).map_err(|source| SettingsError::Timeout {
        value: trimmed.to_string(),
        source,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
