pub mod changeset;
pub mod llm;
pub mod report;
pub mod scanner;
pub mod settings;

pub use changeset::{ChangeSet, ChangeSetSource, GitChangeSet, NO_CHANGES_MESSAGE};
pub use llm::{build_gateway, ClassifierGateway, ClassifyError, LlmSettings, ProviderKind};
pub use report::{render_report, OutputFormat, ScanReport, ScanSummary};
pub use scanner::{
    discovery::discover,
    orchestrator::{ScanOrchestrator, ScanOutcomes, INTERRUPTED_MESSAGE},
    policy::{PolicyFilter, PolicyRejection},
    Bucket, Candidate, FileOutcome, Verdict, VerdictThresholds,
};
pub use settings::{AppConfig, Overrides, ScanSettings, SettingsError};
