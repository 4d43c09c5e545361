//! CLI surface for estate-mirror: argument parsing, wiring and exit codes.
//!
//! All pipeline logic lives in `estate-mirror-core`; this module only builds
//! the concrete clients from the loaded config and reports the outcome.
//!
//! Exit codes:
//! - `0`: every job succeeded
//! - `1`: at least one job failed or two repositories share a destination name
//! - `2`: the run could not start or enumeration failed (returned as `Err` from [`run`])
use crate::load_config::{destination_config, load_config, source_credentials, CliConfig};
use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use estate_mirror_core::bitbucket::BitbucketCloud;
use estate_mirror_core::destination::GitHubDestination;
use estate_mirror_core::failure_log::FailureLog;
use estate_mirror_core::git::SystemGit;
use estate_mirror_core::mirror_store::MirrorStore;
use estate_mirror_core::provision::Provisioner;
use estate_mirror_core::sizes::{bytes_to_gib, size_report};
use estate_mirror_core::sync::SyncExecutor;
use estate_mirror_core::synchronise::{pull, push, synchronise, SyncReport};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// CLI for estate-mirror: keep local bare mirrors of a Bitbucket Cloud estate and replicate them to GitHub.
#[derive(Parser)]
#[clap(
    name = "estate-mirror",
    version,
    about = "Mirror every repository of a Bitbucket Cloud estate to GitHub through local bare mirrors"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Clone or update a local mirror of every source repository
    Pull {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Create, tag and push a destination repository for every local mirror
    Push {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Pull every source repository, then push every mirror that exists
    Sync {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Print the size of every source project
    Sizes {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Only report on this workspace slug
        #[clap(long)]
        workspace: Option<String>,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<ExitCode> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Pull { config } => {
            let config = load_config(config)?;
            tracing::info!(command = "pull", "Starting pull");
            let credentials = source_credentials(&config)?;
            let failures = open_failure_log(&config)?;
            let executor = Arc::new(SyncExecutor::new(
                MirrorStore::new(&config.mirror_root),
                Arc::new(SystemGit::default()),
                credentials.clone(),
                Arc::clone(&failures),
            ));
            let source = BitbucketCloud::new(credentials);
            let report = pull(&source, executor, config.scheduler).await?;
            Ok(finish("pull", &report, &failures))
        }
        Commands::Push { config } => {
            let config = load_config(config)?;
            tracing::info!(command = "push", "Starting push");
            let destination = destination_config(&config)?;
            let failures = open_failure_log(&config)?;
            let provisioner = Arc::new(Provisioner::new(
                MirrorStore::new(&config.mirror_root),
                Arc::new(SystemGit::default()),
                Arc::new(GitHubDestination::new(destination.clone())),
                destination,
                Arc::clone(&failures),
            ));
            let report = push(provisioner, &failures, config.scheduler).await?;
            Ok(finish("push", &report, &failures))
        }
        Commands::Sync { config } => {
            let config = load_config(config)?;
            tracing::info!(command = "sync", "Starting synchronisation process");
            let credentials = source_credentials(&config)?;
            let destination = destination_config(&config)?;
            let failures = open_failure_log(&config)?;

            let store = MirrorStore::new(&config.mirror_root);
            let git = Arc::new(SystemGit::default());
            let executor = Arc::new(SyncExecutor::new(
                store.clone(),
                Arc::clone(&git),
                credentials.clone(),
                Arc::clone(&failures),
            ));
            let provisioner = Arc::new(Provisioner::new(
                store,
                git,
                Arc::new(GitHubDestination::new(destination.clone())),
                destination,
                Arc::clone(&failures),
            ));
            let source = BitbucketCloud::new(credentials);

            match synchronise(&source, executor, provisioner, &failures, config.scheduler).await {
                Ok(report) => Ok(finish("sync", &report, &failures)),
                Err(e) => {
                    tracing::error!(command = "sync", error = %e, "Synchronisation failed");
                    Err(e.into())
                }
            }
        }
        Commands::Sizes { config, workspace } => {
            let config = load_config(config)?;
            tracing::info!(command = "sizes", "Measuring source projects");
            let source = BitbucketCloud::new(source_credentials(&config)?);
            let report =
                size_report(&source, workspace.as_deref(), config.scheduler.workers).await?;

            for project in &report.projects {
                println!(
                    "{}/{} {} ({:.2} GiB)",
                    project.workspace,
                    project.project_key,
                    project.bytes,
                    bytes_to_gib(project.bytes)
                );
            }
            println!("Total: {:.2} GiB", report.total_gib());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn open_failure_log(config: &CliConfig) -> Result<Arc<FailureLog>> {
    let log = FailureLog::create(&config.log_dir, Local::now())
        .with_context(|| format!("Unable to open a failure log in {:?}", config.log_dir))?;
    tracing::info!(path = %log.path().display(), "Failure log ready");
    Ok(Arc::new(log))
}

fn finish(command: &str, report: &SyncReport, failures: &FailureLog) -> ExitCode {
    println!("{}", report.summary());
    for outcome in report.failed_jobs() {
        if let Err(e) = &outcome.result {
            tracing::warn!(command, phase = %outcome.phase, triple = %outcome.triple, error = %e, "Job failed");
        }
    }

    if report.is_success() {
        tracing::info!(command, summary = %report.summary(), "Completed successfully");
        ExitCode::SUCCESS
    } else {
        println!("Failures were recorded in {}", failures.path().display());
        tracing::error!(command, summary = %report.summary(), "Completed with failures");
        ExitCode::FAILURE
    }
}
