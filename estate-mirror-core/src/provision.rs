//! Push side of the pipeline: make sure the destination repository exists,
//! tag it with its namespace and replicate the local mirror into it.

use std::sync::Arc;

use tracing::{error, info};

use crate::config::DestinationConfig;
use crate::contract::{CreateOutcome, DestinationHost, DestinationRepo, GitRunner, NamespaceTriple};
use crate::error::JobError;
use crate::failure_log::FailureLog;
use crate::git::GitCommand;
use crate::mirror_store::MirrorStore;

pub struct Provisioner<G: ?Sized, H: ?Sized> {
    store: MirrorStore,
    git: Arc<G>,
    host: Arc<H>,
    config: DestinationConfig,
    failures: Arc<FailureLog>,
}

impl<G, H> Provisioner<G, H>
where
    G: GitRunner + ?Sized,
    H: DestinationHost + ?Sized,
{
    pub fn new(
        store: MirrorStore,
        git: Arc<G>,
        host: Arc<H>,
        config: DestinationConfig,
        failures: Arc<FailureLog>,
    ) -> Self {
        Self {
            store,
            git,
            host,
            config,
            failures,
        }
    }

    pub fn store(&self) -> &MirrorStore {
        &self.store
    }

    /// Create (or adopt) the destination repository, replace its topics, then
    /// push the mirror and its LFS objects.
    ///
    /// Only "already exists" is continued past at creation time; any other
    /// refusal stops the job before anything is pushed. The LFS push runs only
    /// after a successful mirror push.
    pub async fn provision(&self, triple: &NamespaceTriple) -> Result<CreateOutcome, JobError> {
        let mirror = self
            .store
            .mirror_path(triple)
            .map_err(|e| self.fail(triple, "locating mirror", e.into()))?;
        if !mirror.is_dir() {
            return Err(self.fail(
                triple,
                "locating mirror",
                JobError::MissingMirror(triple.clone()),
            ));
        }

        let repo = DestinationRepo::for_triple(triple);
        let outcome = self
            .host
            .create_repo(&repo)
            .await
            .map_err(|e| self.fail(triple, "creating repository", e.into()))?;
        match &outcome {
            CreateOutcome::Created => {
                println!("Repository {} created successfully!", repo.name);
            }
            CreateOutcome::AlreadyExists => {
                info!(triple = %triple, repo = %repo.name, "[PUSH] Reusing existing repository");
            }
            CreateOutcome::Rejected { status, body } => {
                println!("Failed to create {}: {status} - {body}", repo.name);
                return Err(self.fail(
                    triple,
                    "creating repository",
                    JobError::CreateRejected {
                        name: repo.name.clone(),
                        status: *status,
                        body: body.clone(),
                    },
                ));
            }
        }

        self.host
            .replace_topics(&repo.name, &repo.topics)
            .await
            .map_err(|e| self.fail(triple, "applying topics", e.into()))?;

        let url = self
            .config
            .push_url(&repo.name)
            .map_err(|e| self.fail(triple, "pushing", e))?;

        println!("Pushing to destination: {triple}");
        self.git
            .run(GitCommand::PushMirror {
                mirror: mirror.clone(),
                url: url.clone(),
            })
            .await
            .map_err(|e| self.fail(triple, "pushing", e.into()))?;

        println!("Git LFS Push: {triple}");
        self.git
            .run(GitCommand::LfsPushAll { mirror, url })
            .await
            .map_err(|e| self.fail(triple, "pushing LFS objects for", e.into()))?;

        info!(triple = %triple, repo = %repo.name, outcome = ?outcome, "[PUSH] Mirror replicated");
        Ok(outcome)
    }

    fn fail(&self, triple: &NamespaceTriple, doing: &str, err: JobError) -> JobError {
        let detail = match &err {
            JobError::Git(git) => git.diagnostic(),
            other => other.to_string(),
        };
        error!(triple = %triple, step = doing, error = %err, "[PUSH] Mirror job failed");
        self.failures
            .record_or_trace(&format!("Error {doing} {triple}: {detail}"));
        println!("ERROR: see {} for details", self.failures.path().display());
        err
    }
}
