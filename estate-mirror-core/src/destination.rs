//! GitHub (or GitHub Enterprise) as a [`DestinationHost`].

use std::collections::BTreeSet;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::config::DestinationConfig;
use crate::contract::{CreateOutcome, DestinationHost, DestinationRepo};
use crate::error::DestinationError;

const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("estate-mirror/", env!("CARGO_PKG_VERSION"));

#[derive(Deserialize)]
struct ValidationFailure {
    #[serde(default)]
    errors: Vec<ValidationDetail>,
}

#[derive(Deserialize)]
struct ValidationDetail {
    #[serde(default)]
    message: Option<String>,
}

/// GitHub answers 422 for every validation failure; only a taken name means
/// the repository is already there.
fn names_existing_repository(body: &str) -> bool {
    serde_json::from_str::<ValidationFailure>(body)
        .map(|failure| {
            failure.errors.iter().any(|detail| {
                detail
                    .message
                    .as_deref()
                    .is_some_and(|message| message.contains("already exists"))
            })
        })
        .unwrap_or(false)
}

pub struct GitHubDestination {
    client: Client,
    config: DestinationConfig,
}

impl GitHubDestination {
    pub fn new(config: DestinationConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    fn authorised(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.config.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .header("User-Agent", USER_AGENT)
    }
}

#[async_trait]
impl DestinationHost for GitHubDestination {
    async fn create_repo(&self, repo: &DestinationRepo) -> Result<CreateOutcome, DestinationError> {
        let url = self.endpoint(&format!("orgs/{}/repos", self.config.owner));
        let body = json!({
            "name": repo.name,
            "private": repo.private,
            "description": repo.description,
        });

        let response = self
            .authorised(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|source| DestinationError::Http {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if status == StatusCode::CREATED {
            info!(repo = %repo.name, "Destination repository created");
            return Ok(CreateOutcome::Created);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<Failed to decode response body>"));
        if status == StatusCode::UNPROCESSABLE_ENTITY && names_existing_repository(&body) {
            info!(repo = %repo.name, "Destination repository already exists");
            return Ok(CreateOutcome::AlreadyExists);
        }

        warn!(repo = %repo.name, status = %status, "Destination refused to create repository");
        Ok(CreateOutcome::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    async fn replace_topics(
        &self,
        name: &str,
        topics: &BTreeSet<String>,
    ) -> Result<(), DestinationError> {
        let url = self.endpoint(&format!("repos/{}/{}/topics", self.config.owner, name));
        let body = json!({ "names": topics });

        let response = self
            .authorised(self.client.put(&url))
            .json(&body)
            .send()
            .await
            .map_err(|source| DestinationError::Http {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if status == StatusCode::OK {
            info!(repo = %name, ?topics, "Topics applied");
            Ok(())
        } else {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<Failed to decode response body>"));
            Err(DestinationError::Status {
                url,
                status: status.as_u16(),
                body,
            })
        }
    }
}
