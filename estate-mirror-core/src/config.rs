use std::fmt;

use reqwest::Url;
use tracing::info;

use crate::error::JobError;

pub const DEFAULT_BITBUCKET_API: &str = "https://api.bitbucket.org/2.0";
pub const DEFAULT_BITBUCKET_GIT: &str = "https://bitbucket.org";
pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";
pub const DEFAULT_GITHUB_GIT: &str = "https://github.com";

/// Username the destination host expects alongside a token in a git URL.
const TOKEN_USER: &str = "x-access-token";

/// Credentials and endpoints for the source host.
#[derive(Clone, PartialEq, Eq)]
pub struct SourceCredentials {
    pub username: String,
    pub app_password: String,
    pub api_base: String,
    pub git_base: String,
}

impl SourceCredentials {
    pub fn new(username: impl Into<String>, app_password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            app_password: app_password.into(),
            api_base: DEFAULT_BITBUCKET_API.to_string(),
            git_base: DEFAULT_BITBUCKET_GIT.to_string(),
        }
    }

    /// `<git_base>/<workspace>/<repository>.git` with the app password embedded.
    pub fn clone_url(&self, workspace: &str, repository: &str) -> Result<String, JobError> {
        authenticated_url(
            &self.git_base,
            &format!("{workspace}/{repository}.git"),
            &self.username,
            &self.app_password,
        )
    }

    pub fn trace_loaded(&self) {
        info!(
            username = %self.username,
            api_base = %self.api_base,
            git_base = %self.git_base,
            "Loaded source credentials"
        );
    }
}

impl fmt::Debug for SourceCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceCredentials")
            .field("username", &self.username)
            .field("app_password", &"***")
            .field("api_base", &self.api_base)
            .field("git_base", &self.git_base)
            .finish()
    }
}

/// Organisation, token and endpoints for the destination host.
#[derive(Clone, PartialEq, Eq)]
pub struct DestinationConfig {
    pub owner: String,
    pub token: String,
    pub api_base: String,
    pub git_base: String,
}

impl DestinationConfig {
    pub fn new(owner: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            token: token.into(),
            api_base: DEFAULT_GITHUB_API.to_string(),
            git_base: DEFAULT_GITHUB_GIT.to_string(),
        }
    }

    /// `<git_base>/<owner>/<repository>.git` with the token embedded.
    pub fn push_url(&self, repository: &str) -> Result<String, JobError> {
        authenticated_url(
            &self.git_base,
            &format!("{}/{repository}.git", self.owner),
            TOKEN_USER,
            &self.token,
        )
    }

    pub fn trace_loaded(&self) {
        info!(
            owner = %self.owner,
            api_base = %self.api_base,
            git_base = %self.git_base,
            token_set = !self.token.is_empty(),
            "Loaded destination config"
        );
    }
}

impl fmt::Debug for DestinationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestinationConfig")
            .field("owner", &self.owner)
            .field("token", &"***")
            .field("api_base", &self.api_base)
            .field("git_base", &self.git_base)
            .finish()
    }
}

/// Join `path` onto `base` and embed `user:secret` as userinfo. An empty
/// secret yields a URL without credentials (e.g. for `file://` remotes).
fn authenticated_url(base: &str, path: &str, user: &str, secret: &str) -> Result<String, JobError> {
    let raw = format!("{}/{}", base.trim_end_matches('/'), path);
    let invalid = |reason: String| JobError::InvalidRemote {
        url: crate::git::redact_url(&raw),
        reason,
    };

    let mut url = Url::parse(&raw).map_err(|e| invalid(e.to_string()))?;
    if !secret.is_empty() {
        url.set_username(user)
            .map_err(|_| invalid("URL cannot carry a username".into()))?;
        url.set_password(Some(secret))
            .map_err(|_| invalid("URL cannot carry a password".into()))?;
    }
    Ok(url.to_string())
}
