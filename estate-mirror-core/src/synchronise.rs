//! High-level pipeline: enumerate → pull → validate names → push.
//!
//! The pull phase runs to completion before any push starts, so every push
//! sees the freshest mirror the run could produce. Individual jobs never stop
//! a run; only failing to learn what the estate contains does.
//!
//! # Entrypoints
//! - [`pull`]: source enumeration plus the pull phase.
//! - [`push`]: the push phase for every mirror already on disk.
//! - [`synchronise`]: both phases for one enumeration.
//!
//! All three return a [`SyncReport`] for the caller to summarise.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::contract::{DestinationHost, GitRunner, NamespaceSource, NamespaceTriple};
use crate::enumerate::{enumerate_all, find_name_collisions, NameCollision};
use crate::error::{JobError, SynchroniseError};
use crate::failure_log::FailureLog;
use crate::provision::Provisioner;
use crate::scheduler::{run_jobs, JobOutcome, Phase, SchedulerOptions};
use crate::sync::SyncExecutor;

/// What happened to every job of a run.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Triples the run started from.
    pub enumerated: usize,
    pub pull: Vec<JobOutcome>,
    pub push: Vec<JobOutcome>,
    pub collisions: Vec<NameCollision>,
}

impl SyncReport {
    pub fn pulled(&self) -> usize {
        self.pull.iter().filter(|o| o.is_success()).count()
    }

    pub fn pull_failures(&self) -> usize {
        self.pull.len() - self.pulled()
    }

    pub fn provisioned(&self) -> usize {
        self.push.iter().filter(|o| o.is_success()).count()
    }

    /// Includes triples excluded because of a name collision.
    pub fn push_failures(&self) -> usize {
        self.push.len() - self.provisioned()
    }

    pub fn failed_jobs(&self) -> impl Iterator<Item = &JobOutcome> {
        self.pull.iter().chain(self.push.iter()).filter(|o| !o.is_success())
    }

    pub fn is_success(&self) -> bool {
        self.collisions.is_empty() && self.failed_jobs().next().is_none()
    }

    /// One line for operators, e.g. `pulled 3/4, pushed 2/3, failures 2`.
    pub fn summary(&self) -> String {
        format!(
            "pulled {}/{}, pushed {}/{}, failures {}",
            self.pulled(),
            self.pull.len(),
            self.provisioned(),
            self.push.len(),
            self.failed_jobs().count()
        )
    }
}

/// Enumerate the source and bring every mirror up to date.
pub async fn pull<S, G>(
    source: &S,
    executor: Arc<SyncExecutor<G>>,
    options: SchedulerOptions,
) -> Result<SyncReport, SynchroniseError>
where
    S: NamespaceSource + ?Sized,
    G: GitRunner + ?Sized + 'static,
{
    info!("[SYNC] Enumerating source namespace");
    let triples = enumerate_all(source).await.map_err(|e| {
        error!(error = ?e, "[SYNC][ERROR] Enumeration failed, nothing was pulled");
        e
    })?;

    let enumerated = triples.len();
    let pull = pull_phase(triples, executor, options).await;
    Ok(SyncReport {
        enumerated,
        pull,
        ..SyncReport::default()
    })
}

/// Replicate every mirror already present in the provisioner's store.
pub async fn push<G, H>(
    provisioner: Arc<Provisioner<G, H>>,
    failures: &FailureLog,
    options: SchedulerOptions,
) -> Result<SyncReport, SynchroniseError>
where
    G: GitRunner + ?Sized + 'static,
    H: DestinationHost + ?Sized + 'static,
{
    let triples = provisioner.store().local_triples()?;
    info!(count = triples.len(), "[SYNC] Found local mirrors");

    let enumerated = triples.len();
    let collisions = find_name_collisions(&triples);
    let push = push_phase(triples, &collisions, provisioner, failures, options).await;
    Ok(SyncReport {
        enumerated,
        push,
        collisions,
        ..SyncReport::default()
    })
}

/// Enumerate, pull everything, then push every triple that has a mirror.
///
/// Name collisions are judged on the whole enumeration, so a colliding
/// repository stays unpushed even when its twin failed to pull.
pub async fn synchronise<S, G, H>(
    source: &S,
    executor: Arc<SyncExecutor<G>>,
    provisioner: Arc<Provisioner<G, H>>,
    failures: &FailureLog,
    options: SchedulerOptions,
) -> Result<SyncReport, SynchroniseError>
where
    S: NamespaceSource + ?Sized,
    G: GitRunner + ?Sized + 'static,
    H: DestinationHost + ?Sized + 'static,
{
    info!("[SYNC] Starting full synchronisation");
    let mut report = pull(source, executor, options).await?;

    let mut seen = HashSet::new();
    let unique: Vec<NamespaceTriple> = report
        .pull
        .iter()
        .map(|outcome| &outcome.triple)
        .filter(|triple| seen.insert((*triple).clone()))
        .cloned()
        .collect();
    let collisions = find_name_collisions(&unique);

    let mirrored: Vec<NamespaceTriple> = unique
        .into_iter()
        .filter(|triple| provisioner.store().mirror_exists(triple))
        .collect();
    let skipped = report.enumerated - mirrored.len();
    if skipped > 0 {
        warn!(skipped, "[SYNC] Triples without a mirror or repeated are not pushed");
    }

    report.push = push_phase(mirrored, &collisions, provisioner, failures, options).await;
    report.collisions = collisions;

    info!(summary = %report.summary(), "[SYNC] Synchronisation finished");
    Ok(report)
}

async fn pull_phase<G>(
    triples: Vec<NamespaceTriple>,
    executor: Arc<SyncExecutor<G>>,
    options: SchedulerOptions,
) -> Vec<JobOutcome>
where
    G: GitRunner + ?Sized + 'static,
{
    let worker = Arc::clone(&executor);
    let outcomes = run_jobs(triples, Phase::Pull, options, move |triple| {
        let executor = Arc::clone(&worker);
        async move { executor.sync(&triple).await.map(|_| ()) }
    })
    .await;
    record_interrupted(&outcomes, executor.failures());
    outcomes
}

/// Every triple named by a collision is left out and reported as a failed
/// push, whether or not it has a mirror.
async fn push_phase<G, H>(
    triples: Vec<NamespaceTriple>,
    collisions: &[NameCollision],
    provisioner: Arc<Provisioner<G, H>>,
    failures: &FailureLog,
    options: SchedulerOptions,
) -> Vec<JobOutcome>
where
    G: GitRunner + ?Sized + 'static,
    H: DestinationHost + ?Sized + 'static,
{
    let mut excluded = Vec::new();
    for collision in collisions {
        let owners: Vec<String> = collision.triples.iter().map(ToString::to_string).collect();
        error!(name = %collision.name, owners = ?owners, "[SYNC][ERROR] Destination name collision");
        for triple in &collision.triples {
            let err = JobError::NameCollision {
                name: collision.name.clone(),
                triples: collision.triples.clone(),
            };
            failures.record_or_trace(&format!(
                "Error pushing {triple}: {err} ({})",
                owners.join(", ")
            ));
            excluded.push(JobOutcome {
                triple: triple.clone(),
                phase: Phase::Push,
                result: Err(err),
            });
        }
    }
    if !collisions.is_empty() {
        println!("ERROR: see {} for details", failures.path().display());
    }

    let excluded_triples: HashSet<&NamespaceTriple> = excluded.iter().map(|o| &o.triple).collect();
    let runnable: Vec<NamespaceTriple> = triples
        .iter()
        .filter(|t| !excluded_triples.contains(t))
        .cloned()
        .collect();

    let mut outcomes = run_jobs(runnable, Phase::Push, options, move |triple| {
        let provisioner = Arc::clone(&provisioner);
        async move { provisioner.provision(&triple).await.map(|_| ()) }
    })
    .await;
    record_interrupted(&outcomes, failures);
    outcomes.extend(excluded);
    outcomes
}

/// Jobs the scheduler cut short (timeout, panic) never reached their own
/// failure handling, so they are logged here.
fn record_interrupted(outcomes: &[JobOutcome], failures: &FailureLog) {
    let mut recorded = false;
    for outcome in outcomes {
        let Err(err) = &outcome.result else {
            continue;
        };
        if !matches!(
            err,
            JobError::TimedOut(_) | JobError::Panicked(_) | JobError::PoolClosed
        ) {
            continue;
        }
        let doing = match outcome.phase {
            Phase::Pull => "pulling",
            Phase::Push => "pushing",
        };
        error!(triple = %outcome.triple, phase = %outcome.phase, error = %err, "[SYNC][ERROR] Job interrupted");
        failures.record_or_trace(&format!("Error {doing} {}: {err}", outcome.triple));
        recorded = true;
    }
    if recorded {
        println!("ERROR: see {} for details", failures.path().display());
    }
}
