//! Bounded-concurrency runner for per-repository jobs.
//!
//! Every triple becomes its own task holding its own copy of the triple. At
//! most `workers` jobs run at once. A job that fails, panics or overruns its
//! time limit turns into a failed [`JobOutcome`] for that triple only.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use crate::contract::NamespaceTriple;
use crate::error::JobError;

/// Which half of the pipeline a job belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Pull,
    Push,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Pull => f.write_str("pull"),
            Phase::Push => f.write_str("push"),
        }
    }
}

#[derive(Debug)]
pub struct JobOutcome {
    pub triple: NamespaceTriple,
    pub phase: Phase,
    pub result: Result<(), JobError>,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// Maximum number of jobs in flight. Zero is treated as one.
    pub workers: usize,
    /// Per-job limit. `None` lets a job run for as long as it needs.
    pub job_timeout: Option<Duration>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            job_timeout: None,
        }
    }
}

/// Run `work` once per triple and wait for all of them.
///
/// Outcomes come back in input order, one per triple.
pub async fn run_jobs<F, Fut>(
    triples: Vec<NamespaceTriple>,
    phase: Phase,
    options: SchedulerOptions,
    work: F,
) -> Vec<JobOutcome>
where
    F: Fn(NamespaceTriple) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    if triples.is_empty() {
        return Vec::new();
    }

    let workers = options.workers.max(1);
    info!(%phase, jobs = triples.len(), workers, "[SCHEDULER] Starting jobs");

    let semaphore = Arc::new(Semaphore::new(workers));
    let handles: Vec<_> = triples
        .iter()
        .cloned()
        .map(|triple| {
            let semaphore = Arc::clone(&semaphore);
            let work = work.clone();
            tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return Err(JobError::PoolClosed),
                };
                debug!(%phase, triple = %triple, "[SCHEDULER] Job started");
                match options.job_timeout {
                    Some(limit) => tokio::time::timeout(limit, work(triple))
                        .await
                        .unwrap_or(Err(JobError::TimedOut(limit))),
                    None => work(triple).await,
                }
            })
        })
        .collect();

    let mut outcomes = Vec::with_capacity(handles.len());
    for (triple, handle) in triples.into_iter().zip(handles) {
        let result = handle.await.unwrap_or_else(|e| {
            error!(%phase, triple = %triple, error = %e, "[SCHEDULER] Job panicked");
            Err(JobError::Panicked(e.to_string()))
        });
        outcomes.push(JobOutcome {
            triple,
            phase,
            result,
        });
    }

    let failed = outcomes.iter().filter(|o| !o.is_success()).count();
    info!(
        %phase,
        succeeded = outcomes.len() - failed,
        failed,
        "[SCHEDULER] All jobs finished"
    );
    outcomes
}
