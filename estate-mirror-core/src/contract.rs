//! # contract: data model and trait seams for the mirror pipeline
//!
//! The pipeline talks to three external collaborators, each behind a trait so
//! real clients and test doubles can be swapped freely:
//!
//! - [`NamespaceSource`]: lists workspaces, projects and repositories on the source host.
//! - [`DestinationHost`]: creates and classifies repositories on the destination host.
//! - [`GitRunner`]: executes git and git-lfs commands against local mirrors.
//!
//! ## Mocking & Testing
//! - The traits are annotated for `mockall`, so `MockNamespaceSource`,
//!   `MockDestinationHost` and `MockGitRunner` are available to unit and
//!   integration tests (feature `test-export-mocks`, on by default).

use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use async_trait::async_trait;
use mockall::automock;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{DestinationError, EnumerationError};
use crate::git::{GitCommand, GitError, GitOutput};

/// Identifies one repository across both hosting providers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NamespaceTriple {
    pub workspace: String,
    pub project: String,
    pub repository: String,
}

impl NamespaceTriple {
    pub fn new(
        workspace: impl Into<String>,
        project: impl Into<String>,
        repository: impl Into<String>,
    ) -> Self {
        Self {
            workspace: workspace.into(),
            project: project.into(),
            repository: repository.into(),
        }
    }
}

impl fmt::Display for NamespaceTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.workspace, self.project, self.repository)
    }
}

/// A workspace as listed by the source host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub slug: String,
    pub name: String,
}

/// A project inside a workspace. `key` is what the source API filters on,
/// `name` is what the estate is organised by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub key: String,
    pub name: String,
}

/// A repository as listed by the source host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRepository {
    /// URL-safe identifier, used in clone URLs and as the destination name.
    pub slug: String,
    pub name: String,
    /// Repository size in bytes as reported by the source host.
    pub size: u64,
}

/// Hierarchical, read-only listing of the source estate.
///
/// Implementations hide the host's pagination: each call returns every entry
/// at that level or fails.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait NamespaceSource: Send + Sync {
    async fn workspaces(&self) -> Result<Vec<Workspace>, EnumerationError>;

    async fn projects(&self, workspace: &Workspace) -> Result<Vec<Project>, EnumerationError>;

    async fn repositories(
        &self,
        workspace: &Workspace,
        project: &Project,
    ) -> Result<Vec<RemoteRepository>, EnumerationError>;
}

/// What the pull side does for a triple, decided against the mirror store
/// immediately before it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Clone,
    Fetch,
}

/// A resolved pull job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncJob {
    pub triple: NamespaceTriple,
    pub action: SyncAction,
}

/// The repository to provision on the destination host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DestinationRepo {
    pub name: String,
    pub private: bool,
    pub description: String,
    #[serde(skip)]
    pub topics: BTreeSet<String>,
}

impl DestinationRepo {
    /// The destination carries only the bare repository name; the namespace
    /// lives in the description and the topics.
    pub fn for_triple(triple: &NamespaceTriple) -> Self {
        let topics = [&triple.workspace, &triple.project]
            .into_iter()
            .map(|part| topic_slug(part))
            .filter(|topic| !topic.is_empty())
            .collect();

        Self {
            name: triple.repository.clone(),
            private: true,
            description: format!(
                "Mirror of Bitbucket Repo {}/{}/{}.git",
                triple.workspace, triple.project, triple.repository
            ),
            topics,
        }
    }
}

/// Normalise a namespace component into a valid destination topic:
/// lowercase ASCII letters, digits and single hyphens, at most 50 characters.
pub fn topic_slug(raw: &str) -> String {
    static NON_TOPIC: OnceLock<Regex> = OnceLock::new();
    let re = NON_TOPIC.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("static regex"));

    let lowered = raw.to_lowercase();
    let slug = re.replace_all(&lowered, "-");
    let mut slug = slug.trim_matches('-').to_string();
    if slug.len() > 50 {
        slug.truncate(50);
        slug = slug.trim_end_matches('-').to_string();
    }
    slug
}

/// Classified response to a destination create request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
    Rejected { status: u16, body: String },
}

/// Repository provisioning on the destination host.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DestinationHost: Send + Sync {
    /// Attempt to create the repository. Transport failures are errors;
    /// any HTTP answer is classified into a [`CreateOutcome`].
    async fn create_repo(&self, repo: &DestinationRepo) -> Result<CreateOutcome, DestinationError>;

    /// Replace the repository's topics with exactly `topics`.
    async fn replace_topics(
        &self,
        name: &str,
        topics: &BTreeSet<String>,
    ) -> Result<(), DestinationError>;
}

/// Executes git commands. The process-backed implementation is
/// [`crate::git::SystemGit`].
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait GitRunner: Send + Sync {
    async fn run(&self, command: GitCommand) -> Result<GitOutput, GitError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_repo_carries_namespace_in_description_and_topics() {
        let triple = NamespaceTriple::new("acme", "payments", "billing-api");
        let repo = DestinationRepo::for_triple(&triple);

        assert_eq!(repo.name, "billing-api");
        assert!(repo.private);
        assert_eq!(
            repo.description,
            "Mirror of Bitbucket Repo acme/payments/billing-api.git"
        );
        assert_eq!(
            repo.topics,
            BTreeSet::from(["acme".to_string(), "payments".to_string()])
        );
    }

    #[test]
    fn topics_are_normalised() {
        assert_eq!(topic_slug("Core Platform"), "core-platform");
        assert_eq!(topic_slug("  --Data_Science!! "), "data-science");
        assert_eq!(topic_slug(&"x".repeat(80)).len(), 50);
        assert_eq!(topic_slug("***"), "");
    }

    #[test]
    fn workspace_and_project_with_same_slug_collapse_to_one_topic() {
        let repo = DestinationRepo::for_triple(&NamespaceTriple::new("acme", "ACME", "r"));
        assert_eq!(repo.topics, BTreeSet::from(["acme".to_string()]));
    }

    #[test]
    fn triple_displays_as_path() {
        let triple = NamespaceTriple::new("acme", "core", "auth-svc");
        assert_eq!(triple.to_string(), "acme/core/auth-svc");
    }
}
