use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Candidate;

pub const DEFAULT_MAX_FILE_SIZE: u64 = 1_000_000;
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    ".py", ".js", ".ts", ".php", ".java", ".c", ".cpp", ".cs", ".go", ".rb", ".pl", ".sh", ".ps1",
];

/// Eligibility rules applied to every candidate before it may reach the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyFilter {
    extensions: Vec<String>,
    max_file_size: u64,
}

impl Default for PolicyFilter {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSIONS.iter().copied(), DEFAULT_MAX_FILE_SIZE)
    }
}

impl PolicyFilter {
    /// Extensions are normalized to lowercase with a leading dot; blanks are dropped.
    pub fn new<I, S>(extensions: I, max_file_size: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut extensions: Vec<String> = extensions
            .into_iter()
            .filter_map(|ext| normalize_extension(ext.as_ref()))
            .collect();
        extensions.sort();
        extensions.dedup();
        Self {
            extensions,
            max_file_size,
        }
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn allows_extension(&self, candidate: &Candidate) -> bool {
        let ext = candidate.extension().to_ascii_lowercase();
        !ext.is_empty() && self.extensions.iter().any(|allowed| *allowed == ext)
    }

    /// Decide whether a candidate is eligible given the size gathered at discovery.
    ///
    /// Checks run extension first, then the metadata lookup, then the size cap.
    pub fn admit(&self, candidate: &Candidate, size: io::Result<u64>) -> Result<(), PolicyRejection> {
        if !self.allows_extension(candidate) {
            return Err(PolicyRejection::UnsupportedExtension(candidate.extension()));
        }
        let size = size.map_err(PolicyRejection::from_io)?;
        if size > self.max_file_size {
            return Err(PolicyRejection::FileTooLarge {
                max: self.max_file_size,
            });
        }
        Ok(())
    }
}

fn normalize_extension(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        return None;
    }
    Some(format!(".{}", trimmed.to_ascii_lowercase()))
}

/// Why a candidate never reached the classifier. The display text is what the
/// error bucket reports.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyRejection {
    #[error("Unsupported file extension: {0}")]
    UnsupportedExtension(String),
    #[error("File too large (max size: {max} bytes)")]
    FileTooLarge { max: u64 },
    #[error("{0}")]
    ReadError(String),
}

impl PolicyRejection {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::UnsupportedExtension(_) => "unsupported_extension",
            Self::FileTooLarge { .. } => "file_too_large",
            Self::ReadError(_) => "read_error",
        }
    }

    pub fn from_io(err: io::Error) -> Self {
        let message = match err.kind() {
            io::ErrorKind::NotFound => "File not found".to_string(),
            io::ErrorKind::InvalidData => "File is not valid UTF-8".to_string(),
            _ => err.to_string(),
        };
        Self::ReadError(message)
    }
}
