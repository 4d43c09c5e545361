//! Pull side of the pipeline: bring one local mirror up to date with the source.

use std::sync::Arc;

use tracing::{error, info};

use crate::config::SourceCredentials;
use crate::contract::{GitRunner, NamespaceTriple, SyncAction, SyncJob};
use crate::error::JobError;
use crate::failure_log::FailureLog;
use crate::git::GitCommand;
use crate::mirror_store::MirrorStore;

impl SyncJob {
    /// Decide between clone and fetch from what is on disk right now.
    pub fn resolve(store: &MirrorStore, triple: NamespaceTriple) -> Self {
        let action = if store.mirror_exists(&triple) {
            SyncAction::Fetch
        } else {
            SyncAction::Clone
        };
        Self { triple, action }
    }
}

pub struct SyncExecutor<G: ?Sized> {
    store: MirrorStore,
    git: Arc<G>,
    credentials: SourceCredentials,
    failures: Arc<FailureLog>,
}

impl<G> SyncExecutor<G>
where
    G: GitRunner + ?Sized,
{
    pub fn new(
        store: MirrorStore,
        git: Arc<G>,
        credentials: SourceCredentials,
        failures: Arc<FailureLog>,
    ) -> Self {
        Self {
            store,
            git,
            credentials,
            failures,
        }
    }

    pub fn failures(&self) -> &FailureLog {
        &self.failures
    }

    /// Clone or fetch the mirror for `triple`, then fetch its LFS objects.
    ///
    /// Every failure is written to the failure log before it is returned. The
    /// LFS fetch runs after a failed fetch too, since the existing mirror is
    /// still usable; after a failed clone there is nothing to fetch into.
    pub async fn sync(&self, triple: &NamespaceTriple) -> Result<SyncAction, JobError> {
        self.store
            .ensure_namespace_dir(triple)
            .map_err(|e| self.fail(triple, "preparing", e.into()))?;
        let mirror = self
            .store
            .mirror_path(triple)
            .map_err(|e| self.fail(triple, "preparing", e.into()))?;

        let job = SyncJob::resolve(&self.store, triple.clone());
        let primary = match job.action {
            SyncAction::Fetch => {
                println!("Updating: {triple}");
                info!(triple = %triple, "[PULL] Fetching existing mirror");
                self.git
                    .run(GitCommand::FetchPrune {
                        mirror: mirror.clone(),
                    })
                    .await
                    .map(|_| ())
                    .map_err(|e| self.fail(triple, "updating", e.into()))
            }
            SyncAction::Clone => {
                println!("Cloning: {triple}");
                info!(triple = %triple, "[PULL] Cloning new mirror");
                let url = self
                    .credentials
                    .clone_url(&triple.workspace, &triple.repository)
                    .map_err(|e| self.fail(triple, "cloning", e))?;
                self.git
                    .run(GitCommand::CloneMirror {
                        url,
                        dest: mirror.clone(),
                    })
                    .await
                    .map_err(|e| self.fail(triple, "cloning", e.into()))?;
                Ok(())
            }
        };

        println!("Git LFS Update: {triple}");
        let lfs = self
            .git
            .run(GitCommand::LfsFetchAll { mirror })
            .await
            .map_err(|e| self.fail(triple, "fetching LFS objects for", e.into()));

        primary?;
        lfs?;
        info!(triple = %triple, action = ?job.action, "[PULL] Mirror up to date");
        Ok(job.action)
    }

    fn fail(&self, triple: &NamespaceTriple, doing: &str, err: JobError) -> JobError {
        let detail = match &err {
            JobError::Git(git) => git.diagnostic(),
            other => other.to_string(),
        };
        error!(triple = %triple, step = doing, error = %err, "[PULL] Mirror job failed");
        self.failures
            .record_or_trace(&format!("Error {doing} {triple}: {detail}"));
        println!("ERROR: see {} for details", self.failures.path().display());
        err
    }
}
