use std::{future::Future, io, path::PathBuf, sync::Arc};

use futures::{future, stream, StreamExt};
use tracing::{debug, info, instrument, warn};

use super::policy::{PolicyFilter, PolicyRejection};
use super::{Candidate, FileOutcome};
use crate::llm::ClassifierGateway;

pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 10;

/// Error recorded for candidates still pending when a scan is interrupted.
pub const INTERRUPTED_MESSAGE: &str = "Scan interrupted before classification completed";

/// Per-candidate outcomes in discovery order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScanOutcomes {
    pub entries: Vec<(Candidate, FileOutcome)>,
    /// Set when the scan stopped before every admitted candidate was classified.
    pub incomplete: bool,
}

/// Drives candidates through the policy filter and the classifier gateway with
/// at most `max_concurrent` classification calls in flight.
pub struct ScanOrchestrator<G: ClassifierGateway + ?Sized> {
    gateway: Arc<G>,
    policy: PolicyFilter,
    max_concurrent: usize,
}

impl<G: ClassifierGateway + ?Sized> ScanOrchestrator<G> {
    pub fn new(gateway: Arc<G>, policy: PolicyFilter) -> Self {
        Self::with_max_concurrent(gateway, policy, DEFAULT_MAX_CONCURRENT_REQUESTS)
    }

    /// A limit of zero is raised to one.
    pub fn with_max_concurrent(gateway: Arc<G>, policy: PolicyFilter, max_concurrent: usize) -> Self {
        Self {
            gateway,
            policy,
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Scan every path to completion.
    pub async fn scan(&self, paths: Vec<PathBuf>) -> ScanOutcomes {
        self.scan_until(paths, future::pending()).await
    }

    /// Scan `paths` until finished or until `shutdown` resolves.
    ///
    /// `shutdown` is raced against both admission and dispatch. On shutdown,
    /// in-flight calls are dropped and every candidate without an outcome is
    /// recorded as [`INTERRUPTED_MESSAGE`] with `incomplete` set.
    #[instrument(name = "scan_files", skip_all, fields(files = paths.len(), max_concurrent = self.max_concurrent))]
    pub async fn scan_until<F>(&self, paths: Vec<PathBuf>, shutdown: F) -> ScanOutcomes
    where
        F: Future<Output = ()>,
    {
        let candidates: Vec<Candidate> = paths.into_iter().map(Candidate::new).collect();
        // One slot per candidate, each written exactly once.
        let mut slots: Vec<Option<FileOutcome>> = vec![None; candidates.len()];

        tokio::pin!(shutdown);
        let mut interrupted = false;

        let mut admitted = Vec::with_capacity(candidates.len());
        for (idx, candidate) in candidates.iter().enumerate() {
            let size = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    interrupted = true;
                    break;
                }
                size = file_size(candidate) => size,
            };
            match self.policy.admit(candidate, size) {
                Ok(()) => admitted.push(idx),
                Err(rejection) => {
                    warn!(file = %candidate.display_path(), reason = rejection.reason(), "candidate rejected by policy");
                    slots[idx] = Some(FileOutcome::Errored(rejection.to_string()));
                }
            }
        }

        if !interrupted {
            info!(
                admitted = admitted.len(),
                rejected = candidates.len() - admitted.len(),
                "dispatching candidates"
            );
            let candidates_ref = &candidates;
            let mut in_flight = stream::iter(admitted)
                .map(|idx| async move { (idx, self.classify_one(&candidates_ref[idx]).await) })
                .buffer_unordered(self.max_concurrent);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown => {
                        interrupted = true;
                        break;
                    }
                    next = in_flight.next() => match next {
                        Some((idx, outcome)) => {
                            debug_assert!(slots[idx].is_none(), "slot {idx} written twice");
                            slots[idx] = Some(outcome);
                        }
                        None => break,
                    },
                }
            }
        }

        let mut incomplete = false;
        let entries: Vec<(Candidate, FileOutcome)> = candidates
            .into_iter()
            .zip(slots)
            .map(|(candidate, slot)| {
                let outcome = slot.unwrap_or_else(|| {
                    incomplete = true;
                    FileOutcome::Errored(INTERRUPTED_MESSAGE.to_string())
                });
                (candidate, outcome)
            })
            .collect();

        if interrupted {
            warn!(incomplete, "scan interrupted");
        }
        info!(files = entries.len(), incomplete, "scan finished");
        ScanOutcomes {
            entries,
            incomplete,
        }
    }

    async fn classify_one(&self, candidate: &Candidate) -> FileOutcome {
        let content = match read_source(candidate).await {
            Ok(content) => content,
            Err(rejection) => {
                warn!(file = %candidate.display_path(), error = %rejection, "failed to read candidate");
                return FileOutcome::Errored(rejection.to_string());
            }
        };
        debug!(file = %candidate.display_path(), language = candidate.language(), "dispatching to classifier");
        match self.gateway.classify(candidate, &content).await {
            Ok(verdict) => {
                debug!(file = %candidate.display_path(), probability = verdict.probability, "classified");
                FileOutcome::Classified(verdict)
            }
            Err(err) => {
                warn!(file = %candidate.display_path(), error = %err, "classification failed");
                FileOutcome::Errored(err.to_string())
            }
        }
    }
}

async fn file_size(candidate: &Candidate) -> io::Result<u64> {
    let metadata = tokio::fs::metadata(candidate.path()).await?;
    if !metadata.is_file() {
        return Err(io::Error::new(io::ErrorKind::Other, "Not a file"));
    }
    Ok(metadata.len())
}

async fn read_source(candidate: &Candidate) -> Result<String, PolicyRejection> {
    let bytes = tokio::fs::read(candidate.path())
        .await
        .map_err(PolicyRejection::from_io)?;
    String::from_utf8(bytes)
        .map_err(|_| PolicyRejection::from_io(io::Error::from(io::ErrorKind::InvalidData)))
}
