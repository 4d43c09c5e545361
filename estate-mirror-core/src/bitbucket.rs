//! Bitbucket Cloud as a [`NamespaceSource`].
//!
//! Every listing endpoint is paginated: a page carries `values` and, when more
//! data exists, a fully-qualified `next` URL. Pages are followed until `next`
//! is absent; any failed page fails the whole listing.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::SourceCredentials;
use crate::contract::{NamespaceSource, Project, RemoteRepository, Workspace};
use crate::error::EnumerationError;

const PAGE_LEN: &str = "100";

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    values: Vec<T>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawWorkspace {
    slug: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawProject {
    key: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    slug: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    size: u64,
}

pub struct BitbucketCloud {
    client: Client,
    credentials: SourceCredentials,
}

impl BitbucketCloud {
    pub fn new(credentials: SourceCredentials) -> Self {
        Self {
            client: Client::new(),
            credentials,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.credentials.api_base.trim_end_matches('/'), path)
    }

    /// Fetch every page starting at `first`, with `query` applied to the
    /// first request only (`next` links already carry it).
    async fn get_all<T: DeserializeOwned>(
        &self,
        first: String,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, EnumerationError> {
        let mut items = Vec::new();
        let mut next = Some(first);
        let mut first_page = true;

        while let Some(url) = next.take() {
            debug!(url = %url, "Requesting page");
            let mut request = self
                .client
                .get(&url)
                .basic_auth(&self.credentials.username, Some(&self.credentials.app_password));
            if first_page {
                request = request.query(query);
                first_page = false;
            }

            let response = request.send().await.map_err(|source| EnumerationError::Http {
                url: url.clone(),
                source,
            })?;

            let status = response.status();
            if !status.is_success() {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| String::from("<Failed to decode response body>"));
                return Err(EnumerationError::Status {
                    url,
                    status: status.as_u16(),
                    body,
                });
            }

            let page: Page<T> = response
                .json()
                .await
                .map_err(|source| EnumerationError::Decode {
                    url: url.clone(),
                    source,
                })?;
            items.extend(page.values);
            next = page.next;
        }

        Ok(items)
    }
}

#[async_trait]
impl NamespaceSource for BitbucketCloud {
    async fn workspaces(&self) -> Result<Vec<Workspace>, EnumerationError> {
        let raw: Vec<RawWorkspace> = self
            .get_all(self.endpoint("workspaces"), &[("pagelen", PAGE_LEN)])
            .await?;
        info!(count = raw.len(), "Listed workspaces");

        Ok(raw
            .into_iter()
            .map(|w| Workspace {
                name: w.name.unwrap_or_else(|| w.slug.clone()),
                slug: w.slug,
            })
            .collect())
    }

    async fn projects(&self, workspace: &Workspace) -> Result<Vec<Project>, EnumerationError> {
        let raw: Vec<RawProject> = self
            .get_all(
                self.endpoint(&format!("workspaces/{}/projects", workspace.slug)),
                &[("pagelen", PAGE_LEN)],
            )
            .await?;
        info!(workspace = %workspace.slug, count = raw.len(), "Listed projects");

        Ok(raw
            .into_iter()
            .map(|p| Project {
                key: p.key,
                name: p.name,
            })
            .collect())
    }

    async fn repositories(
        &self,
        workspace: &Workspace,
        project: &Project,
    ) -> Result<Vec<RemoteRepository>, EnumerationError> {
        let filter = format!("project.key=\"{}\"", project.key);
        let raw: Vec<RawRepository> = self
            .get_all(
                self.endpoint(&format!("repositories/{}", workspace.slug)),
                &[("q", filter.as_str()), ("pagelen", PAGE_LEN)],
            )
            .await?;
        info!(
            workspace = %workspace.slug,
            project = %project.key,
            count = raw.len(),
            "Listed repositories"
        );

        Ok(raw
            .into_iter()
            .map(|r| RemoteRepository {
                name: r.name.unwrap_or_else(|| r.slug.clone()),
                slug: r.slug,
                size: r.size,
            })
            .collect())
    }
}
