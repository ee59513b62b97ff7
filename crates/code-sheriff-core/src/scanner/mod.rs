use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod discovery;
pub mod orchestrator;
pub mod policy;

/// Probability cut-offs that map a classifier verdict into a bucket.
///
/// Both bounds are inclusive: a probability equal to `malicious` is malicious and
/// a probability equal to `suspicious` is suspicious.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VerdictThresholds {
    pub malicious: f64,
    pub suspicious: f64,
}

impl Default for VerdictThresholds {
    fn default() -> Self {
        Self {
            malicious: 0.7,
            suspicious: 0.35,
        }
    }
}

impl VerdictThresholds {
    /// Build thresholds, deriving the suspicious floor as half the malicious
    /// threshold when none is given.
    pub fn new(malicious: f64, suspicious: Option<f64>) -> Result<Self, ThresholdError> {
        let thresholds = Self {
            malicious,
            suspicious: suspicious.unwrap_or(malicious / 2.0),
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> Result<(), ThresholdError> {
        if !(0.0..=1.0).contains(&self.malicious) {
            return Err(ThresholdError::OutOfRange {
                name: "malicious",
                value: self.malicious,
            });
        }
        if !(0.0..=1.0).contains(&self.suspicious) {
            return Err(ThresholdError::OutOfRange {
                name: "suspicious",
                value: self.suspicious,
            });
        }
        if self.suspicious > self.malicious {
            return Err(ThresholdError::Inverted {
                suspicious: self.suspicious,
                malicious: self.malicious,
            });
        }
        Ok(())
    }

    /// Map a malicious probability into its bucket.
    pub fn bucket(&self, probability: f64) -> Bucket {
        if probability >= self.malicious {
            Bucket::Malicious
        } else if probability >= self.suspicious {
            Bucket::Suspicious
        } else {
            Bucket::Clean
        }
    }
}

/// Errors emitted while validating verdict thresholds.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ThresholdError {
    #[error("{name} threshold must be within 0.0..=1.0 (got {value})")]
    OutOfRange { name: &'static str, value: f64 },
    #[error("suspicious threshold {suspicious} must not exceed malicious threshold {malicious}")]
    Inverted { suspicious: f64, malicious: f64 },
}

/// Terminal classification category for a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Malicious,
    Suspicious,
    Clean,
    Error,
}

/// A discovered file plus the language hint inferred from its extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    path: PathBuf,
    language: &'static str,
}

impl Candidate {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let language = language_for(&path);
        Self { path, language }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn language(&self) -> &'static str {
        self.language
    }

    /// Extension including its leading dot, or an empty string.
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default()
    }

    pub fn display_path(&self) -> String {
        self.path.display().to_string()
    }
}

/// Infer a language hint from a path's extension.
pub fn language_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "py" => "python",
        "js" | "mjs" | "cjs" => "javascript",
        "ts" => "typescript",
        "php" => "php",
        "java" => "java",
        "c" => "c",
        "cpp" | "cc" | "cxx" | "h" | "hpp" => "cpp",
        "cs" => "csharp",
        "go" => "go",
        "rb" => "ruby",
        "pl" => "perl",
        "sh" | "bash" => "shell",
        "ps1" => "powershell",
        _ => "unknown",
    }
}

/// The classifier's judgment for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Malicious likelihood within 0.0..=1.0.
    pub probability: f64,
    pub reasoning: String,
    #[serde(default)]
    pub threats: Vec<String>,
}

/// Result recorded for a single candidate once the scan has handled it.
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Classified(Verdict),
    Errored(String),
}

impl FileOutcome {
    pub fn bucket(&self, thresholds: &VerdictThresholds) -> Bucket {
        match self {
            Self::Classified(verdict) => thresholds.bucket(verdict.probability),
            Self::Errored(_) => Bucket::Error,
        }
    }
}
