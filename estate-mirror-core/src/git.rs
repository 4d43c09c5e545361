//! Git and git-lfs commands run against local bare mirrors.
//!
//! Every remote URL may carry credentials in its userinfo, so commands are
//! only ever rendered through [`GitCommand::redacted`] (also used by `Debug`
//! and `Display`) and captured output is scrubbed before it leaves this module.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use reqwest::Url;
use thiserror::Error;
use tracing::debug;

use crate::contract::GitRunner;

const REDACTED: &str = "***";

/// One git invocation understood by the pipeline.
#[derive(Clone, PartialEq, Eq)]
pub enum GitCommand {
    /// `git clone --mirror <url> <dest>`
    CloneMirror { url: String, dest: PathBuf },
    /// `git -C <mirror> fetch --prune origin`
    FetchPrune { mirror: PathBuf },
    /// `git -C <mirror> lfs fetch --all`
    LfsFetchAll { mirror: PathBuf },
    /// `git -C <mirror> push --mirror <url>`
    PushMirror { mirror: PathBuf, url: String },
    /// `git -C <mirror> lfs push --all <url>`
    LfsPushAll { mirror: PathBuf, url: String },
}

impl GitCommand {
    /// Arguments passed to the `git` executable.
    pub fn args(&self) -> Vec<OsString> {
        fn with_dir(mirror: &Path, rest: &[&str]) -> Vec<OsString> {
            let mut args: Vec<OsString> = vec!["-C".into(), mirror.as_os_str().to_owned()];
            args.extend(rest.iter().map(OsString::from));
            args
        }

        match self {
            GitCommand::CloneMirror { url, dest } => vec![
                "clone".into(),
                "--mirror".into(),
                url.into(),
                dest.as_os_str().to_owned(),
            ],
            GitCommand::FetchPrune { mirror } => with_dir(mirror, &["fetch", "--prune", "origin"]),
            GitCommand::LfsFetchAll { mirror } => with_dir(mirror, &["lfs", "fetch", "--all"]),
            GitCommand::PushMirror { mirror, url } => with_dir(mirror, &["push", "--mirror", url.as_str()]),
            GitCommand::LfsPushAll { mirror, url } => {
                with_dir(mirror, &["lfs", "push", "--all", url.as_str()])
            }
        }
    }

    /// Short name of the operation, e.g. `clone --mirror`.
    pub fn operation(&self) -> &'static str {
        match self {
            GitCommand::CloneMirror { .. } => "clone --mirror",
            GitCommand::FetchPrune { .. } => "fetch --prune",
            GitCommand::LfsFetchAll { .. } => "lfs fetch --all",
            GitCommand::PushMirror { .. } => "push --mirror",
            GitCommand::LfsPushAll { .. } => "lfs push --all",
        }
    }

    fn url(&self) -> Option<&str> {
        match self {
            GitCommand::CloneMirror { url, .. }
            | GitCommand::PushMirror { url, .. }
            | GitCommand::LfsPushAll { url, .. } => Some(url),
            GitCommand::FetchPrune { .. } | GitCommand::LfsFetchAll { .. } => None,
        }
    }

    /// The full command line with any URL password replaced.
    pub fn redacted(&self) -> String {
        let mut rendered = String::from("git");
        for arg in self.args() {
            let arg = arg.to_string_lossy();
            rendered.push(' ');
            if self.url() == Some(arg.as_ref()) {
                rendered.push_str(&redact_url(&arg));
            } else {
                rendered.push_str(&arg);
            }
        }
        rendered
    }

    /// Remove this command's secret from text produced while running it.
    pub fn scrub(&self, text: &str) -> String {
        match self.url().and_then(url_secret) {
            Some(secret) if !secret.is_empty() => text.replace(&secret, REDACTED),
            _ => text.to_string(),
        }
    }
}

impl fmt::Debug for GitCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl fmt::Display for GitCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

/// Replace the password part of a URL's userinfo, leaving everything else intact.
pub fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) if url.password().is_some() => {
            let _ = url.set_password(Some(REDACTED));
            url.to_string()
        }
        _ => raw.to_string(),
    }
}

fn url_secret(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    url.password().map(str::to_string)
}

/// Captured stdout of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitOutput {
    pub stdout: String,
}

#[derive(Error, Debug)]
pub enum GitError {
    #[error("Unable to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
}

impl GitError {
    /// Full diagnostic text for the failure log: the summary line followed by
    /// whatever git wrote to stderr.
    pub fn diagnostic(&self) -> String {
        match self {
            GitError::Failed { stderr, .. } if !stderr.trim().is_empty() => {
                format!("{self}\n{}", stderr.trim_end())
            }
            _ => self.to_string(),
        }
    }
}

/// Runs commands with the `git` executable found on `PATH` (or an explicit program).
#[derive(Debug, Clone)]
pub struct SystemGit {
    program: PathBuf,
}

impl SystemGit {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for SystemGit {
    fn default() -> Self {
        Self::new("git")
    }
}

#[async_trait]
impl GitRunner for SystemGit {
    async fn run(&self, command: GitCommand) -> Result<GitOutput, GitError> {
        debug!(command = %command, "Running git");

        let output = tokio::process::Command::new(&self.program)
            .args(command.args())
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| GitError::Spawn {
                command: command.redacted(),
                source,
            })?;

        let stdout = command.scrub(&String::from_utf8_lossy(&output.stdout));
        if output.status.success() {
            Ok(GitOutput { stdout })
        } else {
            let status = match output.status.code() {
                Some(code) => format!("code {code}"),
                None => String::from("a signal"),
            };
            Err(GitError::Failed {
                command: command.redacted(),
                status,
                stderr: command.scrub(&String::from_utf8_lossy(&output.stderr)),
            })
        }
    }
}
