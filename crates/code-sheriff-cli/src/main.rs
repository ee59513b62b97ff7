use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use code_sheriff_core::{
    build_gateway, discover, render_report, AppConfig, Bucket, ChangeSetSource, GitChangeSet,
    OutputFormat, Overrides, ScanOrchestrator, ScanReport, NO_CHANGES_MESSAGE,
};
use colored::Colorize;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Exit status used when Ctrl-C cut the scan short.
const INTERRUPTED_EXIT: u8 = 130;

#[derive(Parser, Debug)]
#[command(
    name = "code-sheriff",
    author,
    version,
    about = "Detect malicious source files using an LLM classifier"
)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON) layered beneath environment variables
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    llm: LlmArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct LlmArgs {
    /// LLM provider (openai, deepseek, anthropic, azure, custom, local, noop)
    #[arg(long, global = true)]
    provider: Option<String>,
    /// Model name
    #[arg(long, global = true)]
    model: Option<String>,
    /// API key for the provider
    #[arg(long = "api-key", global = true)]
    api_key: Option<String>,
    /// Base URL of the provider API
    #[arg(long = "api-url", global = true)]
    api_url: Option<String>,
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Write the report to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
    /// Maximum concurrent classification requests
    #[arg(short, long)]
    workers: Option<usize>,
    /// Report format
    #[arg(long, value_enum, default_value_t = ReportFormat::Json)]
    format: ReportFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ReportFormat {
    Json,
    Human,
}

impl From<ReportFormat> for OutputFormat {
    fn from(format: ReportFormat) -> Self {
        match format {
            ReportFormat::Json => OutputFormat::Json,
            ReportFormat::Human => OutputFormat::Human,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan a project directory or a single file
    Project {
        /// Path to the project directory or file
        path: PathBuf,
        /// Scan subdirectories recursively
        #[arg(short, long)]
        recursive: bool,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Scan the files changed between two branches of a local checkout
    Gitlab {
        /// Path to the repository checkout
        repo_path: PathBuf,
        /// Source branch of the merge request
        source_branch: String,
        /// Target branch of the merge request
        target_branch: String,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    let output = match &cli.command {
        Commands::Project { output, .. } | Commands::Gitlab { output, .. } => output,
    };
    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply(Overrides {
        provider: cli.llm.provider.clone(),
        model: cli.llm.model.clone(),
        api_key: cli.llm.api_key.clone(),
        api_url: cli.llm.api_url.clone(),
        workers: output.workers,
    })?;
    let gateway = build_gateway(&config.llm).context("failed to configure LLM provider")?;
    let shutdown = shutdown_signal()?;

    let paths = match &cli.command {
        Commands::Project {
            path, recursive, ..
        } => discover(path, *recursive)?,
        Commands::Gitlab {
            repo_path,
            source_branch,
            target_branch,
            ..
        } => {
            let change_set = GitChangeSet
                .changed_files(repo_path, source_branch, target_branch)
                .await
                .context("failed to collect merge request changes")?;
            if change_set.is_empty() {
                info!("no files changed between {target_branch} and {source_branch}");
                let report = ScanReport::empty_with_message(NO_CHANGES_MESSAGE);
                write_output(&report, output)?;
                return Ok(ExitCode::SUCCESS);
            }
            if !change_set.removed.is_empty() {
                info!(removed = change_set.removed.len(), "skipping paths removed by the merge request");
            }
            change_set.files
        }
    };

    info!(
        provider = %config.llm.provider,
        files = paths.len(),
        max_concurrent = config.scan.max_concurrent_requests,
        "starting scan"
    );
    let orchestrator = ScanOrchestrator::with_max_concurrent(
        gateway,
        config.scan.policy.clone(),
        config.scan.max_concurrent_requests,
    );
    let outcomes = orchestrator.scan_until(paths, shutdown).await;
    let report = ScanReport::from_outcomes(&outcomes, &config.scan.thresholds);
    write_output(&report, output)?;

    if report.incomplete {
        return Ok(ExitCode::from(INTERRUPTED_EXIT));
    }
    Ok(ExitCode::SUCCESS)
}

/// Register the Ctrl-C listener up front so an interrupt during discovery or
/// `git diff` still ends in a partial report.
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt =
        signal(SignalKind::interrupt()).context("failed to install Ctrl-C handler")?;
    Ok(async move {
        if interrupt.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    let mut interrupt =
        tokio::signal::windows::ctrl_c().context("failed to install Ctrl-C handler")?;
    Ok(async move {
        if interrupt.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    })
}

fn write_output(report: &ScanReport, args: &OutputArgs) -> Result<()> {
    let rendered = render_report(report, args.format.into())?;
    match &args.output {
        Some(path) => {
            write_file(path, &rendered)?;
            print_summary(report);
            eprintln!("Results written to {}", path.display());
        }
        None => {
            println!("{rendered}");
            print_summary(report);
        }
    }
    Ok(())
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents)
        .with_context(|| format!("failed to write report to {}", path.display()))
}

fn print_summary(report: &ScanReport) {
    let verdict = match report.overall() {
        Bucket::Malicious => "MALICIOUS".red().bold(),
        Bucket::Suspicious => "SUSPICIOUS".yellow().bold(),
        Bucket::Clean => "CLEAN".green().bold(),
        Bucket::Error => "ERROR".red(),
    };
    let s = &report.summary;
    eprintln!(
        "{verdict}: {} file(s) scanned, {} malicious, {} suspicious, {} clean, {} error",
        s.total_files, s.malicious_files, s.suspicious_files, s.clean_files, s.error_files
    );
    if report.incomplete {
        eprintln!("{}", "Scan interrupted; the report is incomplete.".yellow());
    }
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tokio=warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
