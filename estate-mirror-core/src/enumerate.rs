//! Walks a [`NamespaceSource`] into the flat list of triples to synchronise.

use std::collections::BTreeMap;

use async_stream::try_stream;
use futures::stream::{Stream, TryStreamExt};
use tracing::info;

use crate::contract::{NamespaceSource, NamespaceTriple};
use crate::error::EnumerationError;

/// Lazily traverse workspaces → projects → repositories. Nothing is requested
/// until the stream is polled, and every call starts a fresh traversal.
pub fn triples<'a, S>(
    source: &'a S,
) -> impl Stream<Item = Result<NamespaceTriple, EnumerationError>> + 'a
where
    S: NamespaceSource + ?Sized,
{
    try_stream! {
        for workspace in source.workspaces().await? {
            for project in source.projects(&workspace).await? {
                for repository in source.repositories(&workspace, &project).await? {
                    yield NamespaceTriple::new(
                        workspace.slug.clone(),
                        directory_name(&project.name),
                        repository.slug,
                    );
                }
            }
        }
    }
}

/// Project names are free text and become a directory of the mirror store;
/// path separators are replaced so the name stays one component.
fn directory_name(project_name: &str) -> String {
    project_name.replace(['/', '\\', '\0'], "-")
}

/// Materialise the whole namespace. The first error aborts the enumeration;
/// there is no partial result.
pub async fn enumerate_all<S>(source: &S) -> Result<Vec<NamespaceTriple>, EnumerationError>
where
    S: NamespaceSource + ?Sized,
{
    let all: Vec<NamespaceTriple> = triples(source).try_collect().await?;
    info!(count = all.len(), "Enumerated namespace");
    Ok(all)
}

/// Several triples that would land on the same destination repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameCollision {
    /// Destination name, lowercased (the destination compares names
    /// case-insensitively).
    pub name: String,
    pub triples: Vec<NamespaceTriple>,
}

/// Destination names are bare repository names, so they must be unique across
/// the estate. Identical triples are the same repository and do not collide.
pub fn find_name_collisions(triples: &[NamespaceTriple]) -> Vec<NameCollision> {
    let mut by_name: BTreeMap<String, Vec<NamespaceTriple>> = BTreeMap::new();
    for triple in triples {
        let owners = by_name.entry(triple.repository.to_lowercase()).or_default();
        if !owners.contains(triple) {
            owners.push(triple.clone());
        }
    }

    by_name
        .into_iter()
        .filter(|(_, owners)| owners.len() > 1)
        .map(|(name, triples)| NameCollision { name, triples })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{MockNamespaceSource, Project, RemoteRepository, Workspace};
    use futures::StreamExt;

    fn ws(slug: &str) -> Workspace {
        Workspace {
            slug: slug.into(),
            name: slug.to_uppercase(),
        }
    }

    fn project(key: &str, name: &str) -> Project {
        Project {
            key: key.into(),
            name: name.into(),
        }
    }

    fn repo(slug: &str) -> RemoteRepository {
        RemoteRepository {
            slug: slug.into(),
            name: slug.into(),
            size: 1,
        }
    }

    fn estate() -> MockNamespaceSource {
        let mut source = MockNamespaceSource::new();
        source
            .expect_workspaces()
            .returning(|| Ok(vec![ws("acme"), ws("globex")]));
        source.expect_projects().returning(|w| match w.slug.as_str() {
            "acme" => Ok(vec![project("CORE", "core"), project("PAY", "payments")]),
            _ => Ok(vec![project("OPS", "ops")]),
        });
        source
            .expect_repositories()
            .returning(|w, p| match (w.slug.as_str(), p.key.as_str()) {
                ("acme", "CORE") => Ok(vec![repo("auth-svc"), repo("gateway")]),
                ("acme", "PAY") => Ok(vec![repo("billing-api")]),
                _ => Ok(vec![]),
            });
        source
    }

    #[tokio::test]
    async fn walks_workspaces_projects_and_repositories() {
        let all = enumerate_all(&estate()).await.unwrap();
        assert_eq!(
            all,
            vec![
                NamespaceTriple::new("acme", "core", "auth-svc"),
                NamespaceTriple::new("acme", "core", "gateway"),
                NamespaceTriple::new("acme", "payments", "billing-api"),
            ]
        );
    }

    #[tokio::test]
    async fn project_names_with_separators_become_one_directory() {
        let mut source = MockNamespaceSource::new();
        source.expect_workspaces().returning(|| Ok(vec![ws("acme")]));
        source
            .expect_projects()
            .returning(|_| Ok(vec![project("CI", "Build/Release"), project("WIN", r"C:\Tools")]));
        source
            .expect_repositories()
            .returning(|_, _| Ok(vec![repo("pipelines")]));

        let all = enumerate_all(&source).await.unwrap();
        assert_eq!(all[0].project, "Build-Release");
        assert_eq!(all[1].project, "C:-Tools");

        let root = tempfile::tempdir().unwrap();
        let store = crate::mirror_store::MirrorStore::new(root.path());
        for triple in &all {
            let dir = store.ensure_namespace_dir(triple).unwrap();
            assert_eq!(dir.parent().unwrap(), root.path().join("acme"));
        }
    }

    #[tokio::test]
    async fn stream_is_lazy() {
        let mut source = MockNamespaceSource::new();
        source
            .expect_workspaces()
            .times(1)
            .returning(|| Ok(vec![ws("acme"), ws("globex")]));
        source
            .expect_projects()
            .times(1)
            .returning(|_| Ok(vec![project("CORE", "core")]));
        source
            .expect_repositories()
            .times(1)
            .returning(|_, _| Ok(vec![repo("auth-svc"), repo("gateway")]));

        let stream = triples(&source);
        futures::pin_mut!(stream);
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, NamespaceTriple::new("acme", "core", "auth-svc"));
    }

    #[tokio::test]
    async fn stream_restarts_from_the_top() {
        let mut source = MockNamespaceSource::new();
        source
            .expect_workspaces()
            .times(2)
            .returning(|| Ok(vec![ws("acme")]));
        source
            .expect_projects()
            .times(2)
            .returning(|_| Ok(vec![project("CORE", "core")]));
        source
            .expect_repositories()
            .times(2)
            .returning(|_, _| Ok(vec![repo("auth-svc")]));

        let first = enumerate_all(&source).await.unwrap();
        let second = enumerate_all(&source).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn any_error_aborts_the_enumeration() {
        let mut source = MockNamespaceSource::new();
        source
            .expect_workspaces()
            .returning(|| Ok(vec![ws("acme"), ws("globex")]));
        source.expect_projects().returning(|w| {
            if w.slug == "globex" {
                Err(EnumerationError::Status {
                    url: "https://api.example/workspaces/globex/projects".into(),
                    status: 500,
                    body: "boom".into(),
                })
            } else {
                Ok(vec![project("CORE", "core")])
            }
        });
        source
            .expect_repositories()
            .returning(|_, _| Ok(vec![repo("auth-svc")]));

        let err = enumerate_all(&source).await.unwrap_err();
        assert!(matches!(err, EnumerationError::Status { status: 500, .. }));
    }

    #[test]
    fn collisions_are_reported_across_workspaces() {
        let triples = vec![
            NamespaceTriple::new("acme", "core", "shared-lib"),
            NamespaceTriple::new("globex", "ops", "Shared-Lib"),
            NamespaceTriple::new("acme", "core", "auth-svc"),
            NamespaceTriple::new("acme", "core", "auth-svc"),
        ];

        let collisions = find_name_collisions(&triples);
        assert_eq!(
            collisions,
            vec![NameCollision {
                name: "shared-lib".into(),
                triples: vec![triples[0].clone(), triples[1].clone()],
            }]
        );
    }
}
