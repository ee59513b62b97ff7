use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

pub const NO_CHANGES_MESSAGE: &str = "No files changed in this merge request";

/// Paths reported by a change-set collector, resolved against the repository root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Changed paths present in the working tree, in the collector's order.
    pub files: Vec<PathBuf>,
    /// Changed paths absent from the working tree, such as deletions.
    pub removed: Vec<PathBuf>,
}

impl ChangeSet {
    /// True when the collector reported no changes at all.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.removed.is_empty()
    }
}

/// Source of the files modified between two branches.
#[async_trait]
pub trait ChangeSetSource: Send + Sync {
    /// Paths changed on `source_branch` relative to its merge base with
    /// `target_branch`.
    async fn changed_files(
        &self,
        repo: &Path,
        source_branch: &str,
        target_branch: &str,
    ) -> Result<ChangeSet>;
}

/// Change-set collector backed by the `git` binary.
#[derive(Debug, Clone, Default)]
pub struct GitChangeSet;

fn validate_branch(kind: &str, branch: &str) -> Result<()> {
    if branch.trim().is_empty() {
        bail!("{kind} branch must not be empty");
    }
    if branch.starts_with('-') || branch.contains("..") {
        bail!("invalid {kind} branch name `{branch}`");
    }
    Ok(())
}

#[async_trait]
impl ChangeSetSource for GitChangeSet {
    async fn changed_files(
        &self,
        repo: &Path,
        source_branch: &str,
        target_branch: &str,
    ) -> Result<ChangeSet> {
        validate_branch("source", source_branch)?;
        validate_branch("target", target_branch)?;
        let repo = repo
            .canonicalize()
            .with_context(|| format!("repository not found: {}", repo.display()))?;

        let range = format!("{target_branch}...{source_branch}");
        let output = Command::new("git")
            .arg("-C")
            .arg(&repo)
            .args(["diff", "--name-only", "-z", &range, "--"])
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .output()
            .await
            .context("failed to run git; is it installed and on PATH?")?;

        if !output.status.success() {
            bail!(
                "git diff {range} failed in {}: {}",
                repo.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        // Records are NUL-terminated, so names are taken exactly as git wrote them.
        let mut change_set = ChangeSet::default();
        for raw in output.stdout.split(|b| *b == 0).filter(|raw| !raw.is_empty()) {
            let path = repo.join(&*String::from_utf8_lossy(raw));
            if path.is_file() {
                change_set.files.push(path);
            } else {
                debug!(path = %path.display(), "changed path absent from working tree");
                change_set.removed.push(path);
            }
        }
        debug!(
            %range,
            files = change_set.files.len(),
            removed = change_set.removed.len(),
            "collected change-set"
        );
        Ok(change_set)
    }
}
