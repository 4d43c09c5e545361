//! Read-only size report: how many bytes each source project holds.
//!
//! Useful before a first pull to estimate disk and transfer needs. Sizes are
//! the source host's own figures; nothing is cloned.

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::{info, warn};

use crate::contract::{NamespaceSource, Project, Workspace};
use crate::error::EnumerationError;

const GIB: f64 = (1u64 << 30) as f64;

pub fn bytes_to_gib(bytes: u64) -> f64 {
    bytes as f64 / GIB
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectSize {
    pub workspace: String,
    pub project_key: String,
    pub project: String,
    pub repositories: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SizeReport {
    pub projects: Vec<ProjectSize>,
}

impl SizeReport {
    pub fn total_bytes(&self) -> u64 {
        self.projects.iter().map(|p| p.bytes).sum()
    }

    pub fn total_gib(&self) -> f64 {
        bytes_to_gib(self.total_bytes())
    }
}

/// Sum repository sizes per project, querying up to `concurrency` projects at
/// once. `workspace` limits the report to one workspace slug.
pub async fn size_report<S>(
    source: &S,
    workspace: Option<&str>,
    concurrency: usize,
) -> Result<SizeReport, EnumerationError>
where
    S: NamespaceSource + ?Sized,
{
    let workspaces: Vec<Workspace> = source
        .workspaces()
        .await?
        .into_iter()
        .filter(|w| workspace.map_or(true, |slug| w.slug == slug))
        .collect();
    if let (Some(slug), true) = (workspace, workspaces.is_empty()) {
        warn!(workspace = %slug, "No such workspace, size report is empty");
    }

    let mut pairs: Vec<(Workspace, Project)> = Vec::new();
    for ws in workspaces {
        for project in source.projects(&ws).await? {
            pairs.push((ws.clone(), project));
        }
    }

    let projects: Vec<ProjectSize> = stream::iter(pairs.iter())
        .map(|(ws, project)| async move {
            let repositories = source.repositories(ws, project).await?;
            let size = ProjectSize {
                workspace: ws.slug.clone(),
                project_key: project.key.clone(),
                project: project.name.clone(),
                repositories: repositories.len(),
                bytes: repositories.iter().map(|r| r.size).sum(),
            };
            info!(
                workspace = %size.workspace,
                project = %size.project_key,
                bytes = size.bytes,
                "Measured project"
            );
            Ok::<_, EnumerationError>(size)
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    Ok(SizeReport { projects })
}
