use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::scanner::orchestrator::ScanOutcomes;
use crate::scanner::{Bucket, Candidate, FileOutcome, VerdictThresholds};

/// Format styles supported by [`render_report`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Per-bucket counts. `total_files` always equals the sum of the other four.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScanSummary {
    pub total_files: usize,
    pub malicious_files: usize,
    pub suspicious_files: usize,
    pub clean_files: usize,
    pub error_files: usize,
}

impl ScanSummary {
    pub fn is_consistent(&self) -> bool {
        self.malicious_files + self.suspicious_files + self.clean_files + self.error_files
            == self.total_files
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaliciousFile {
    pub file_path: String,
    pub probability: f64,
    pub reasoning: String,
    pub threats: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspiciousFile {
    pub file_path: String,
    pub probability: f64,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanFile {
    pub file_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFile {
    pub file_path: String,
    pub error: String,
}

/// Final aggregate of a scan. Lists keep discovery order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScanReport {
    pub summary: ScanSummary,
    pub malicious_files: Vec<MaliciousFile>,
    pub suspicious_files: Vec<SuspiciousFile>,
    pub clean_files: Vec<CleanFile>,
    pub error_files: Vec<ErrorFile>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub incomplete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ScanReport {
    /// Fold ordered outcomes into buckets. Pure and order-preserving.
    pub fn aggregate(entries: &[(Candidate, FileOutcome)], thresholds: &VerdictThresholds) -> Self {
        let mut report = Self::default();
        for (candidate, outcome) in entries {
            let file_path = candidate.display_path();
            match (outcome.bucket(thresholds), outcome) {
                (_, FileOutcome::Errored(error)) => report.error_files.push(ErrorFile {
                    file_path,
                    error: error.clone(),
                }),
                (Bucket::Malicious, FileOutcome::Classified(verdict)) => {
                    report.malicious_files.push(MaliciousFile {
                        file_path,
                        probability: verdict.probability,
                        reasoning: verdict.reasoning.clone(),
                        threats: verdict.threats.clone(),
                    })
                }
                (Bucket::Suspicious, FileOutcome::Classified(verdict)) => {
                    report.suspicious_files.push(SuspiciousFile {
                        file_path,
                        probability: verdict.probability,
                        reasoning: verdict.reasoning.clone(),
                    })
                }
                (Bucket::Clean | Bucket::Error, FileOutcome::Classified(_)) => {
                    report.clean_files.push(CleanFile { file_path })
                }
            }
        }
        report.summary = ScanSummary {
            total_files: entries.len(),
            malicious_files: report.malicious_files.len(),
            suspicious_files: report.suspicious_files.len(),
            clean_files: report.clean_files.len(),
            error_files: report.error_files.len(),
        };
        report
    }

    pub fn from_outcomes(outcomes: &ScanOutcomes, thresholds: &VerdictThresholds) -> Self {
        let mut report = Self::aggregate(&outcomes.entries, thresholds);
        report.incomplete = outcomes.incomplete;
        report
    }

    /// Report with zero counts that explains why nothing was scanned.
    pub fn empty_with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Repository-level verdict: the most severe bucket any judged file reached.
    ///
    /// Falls back to [`Bucket::Error`] only when files were found but none could be judged.
    pub fn overall(&self) -> Bucket {
        let s = &self.summary;
        if s.malicious_files > 0 {
            Bucket::Malicious
        } else if s.suspicious_files > 0 {
            Bucket::Suspicious
        } else if s.total_files > 0 && s.error_files == s.total_files {
            Bucket::Error
        } else {
            Bucket::Clean
        }
    }
}

/// Produce a report string using the desired format.
pub fn render_report(report: &ScanReport, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Human => render_human(report),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
    }
}

fn render_human(report: &ScanReport) -> anyhow::Result<String> {
    let mut out = String::new();
    let s = &report.summary;
    writeln!(
        out,
        "Scanned {} file(s): {} malicious, {} suspicious, {} clean, {} error",
        s.total_files, s.malicious_files, s.suspicious_files, s.clean_files, s.error_files
    )?;
    writeln!(out, "Overall verdict: {:?}", report.overall())?;
    if report.incomplete {
        writeln!(out, "WARNING: scan was interrupted; results are incomplete")?;
    }
    if let Some(message) = &report.message {
        writeln!(out, "{message}")?;
    }

    if !report.malicious_files.is_empty() {
        writeln!(out, "\nMalicious:")?;
        for file in &report.malicious_files {
            writeln!(out, "  - {} (probability {:.2})", file.file_path, file.probability)?;
            writeln!(out, "    Reasoning: {}", single_line(&file.reasoning))?;
            if !file.threats.is_empty() {
                writeln!(out, "    Threats: {}", file.threats.join(", "))?;
            }
        }
    }
    if !report.suspicious_files.is_empty() {
        writeln!(out, "\nSuspicious:")?;
        for file in &report.suspicious_files {
            writeln!(out, "  - {} (probability {:.2})", file.file_path, file.probability)?;
            writeln!(out, "    Reasoning: {}", single_line(&file.reasoning))?;
        }
    }
    if !report.clean_files.is_empty() {
        writeln!(out, "\nClean:")?;
        for file in &report.clean_files {
            writeln!(out, "  - {}", file.file_path)?;
        }
    }
    if !report.error_files.is_empty() {
        writeln!(out, "\nErrors:")?;
        for file in &report.error_files {
            writeln!(out, "  - {}: {}", file.file_path, file.error)?;
        }
    }
    Ok(out)
}

fn single_line(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '\n' | '\r' => ' ',
            _ => c,
        })
        .collect()
}
