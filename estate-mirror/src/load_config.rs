/// `load_config` module: reads the static YAML config and merges in secrets from the environment.
///
/// The YAML file never holds credentials. Those come from environment
/// variables (a `.env` file is loaded by `main`), and are only demanded by the
/// subcommands that use them:
///
/// - `BITBUCKET_USERNAME`, `BITBUCKET_APP_PASSWORD`: pull, sync, sizes
/// - `GITHUB_TOKEN`: push, sync
/// - `GITHUB_OWNER`, `GITHUB_API_URL`: optional overrides of the YAML values
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::{anyhow, Result};
use estate_mirror_core::config::{
    DestinationConfig, SourceCredentials, DEFAULT_BITBUCKET_API, DEFAULT_BITBUCKET_GIT,
    DEFAULT_GITHUB_API, DEFAULT_GITHUB_GIT,
};
use estate_mirror_core::scheduler::SchedulerOptions;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

pub const BITBUCKET_USERNAME: &str = "BITBUCKET_USERNAME";
pub const BITBUCKET_APP_PASSWORD: &str = "BITBUCKET_APP_PASSWORD";
pub const GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const GITHUB_OWNER: &str = "GITHUB_OWNER";
pub const GITHUB_API_URL: &str = "GITHUB_API_URL";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliConfig {
    pub mirror_root: PathBuf,
    pub log_dir: PathBuf,
    pub scheduler: SchedulerOptions,
    pub source: SourceSection,
    pub destination: DestinationSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SourceSection {
    pub api_base: Option<String>,
    pub git_base: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DestinationSection {
    pub owner: Option<String>,
    pub api_base: Option<String>,
    pub git_base: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default = "default_mirror_root")]
    mirror_root: PathBuf,
    #[serde(default = "default_log_dir")]
    log_dir: PathBuf,
    #[serde(default = "num_cpus::get")]
    workers: usize,
    #[serde(default)]
    job_timeout_secs: Option<u64>,
    #[serde(default)]
    source: SourceSection,
    #[serde(default)]
    destination: DestinationSection,
}

fn default_mirror_root() -> PathBuf {
    PathBuf::from("mirrors")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Loads the static YAML config file. Secrets are resolved separately by
/// [`source_credentials`] and [`destination_config`].
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow!("Failed to read config file {:?}: {}", path_ref, e));
        }
    };

    let raw: RawConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    Ok(CliConfig {
        mirror_root: raw.mirror_root,
        log_dir: raw.log_dir,
        scheduler: SchedulerOptions {
            workers: raw.workers,
            job_timeout: raw.job_timeout_secs.map(Duration::from_secs),
        },
        source: raw.source,
        destination: raw.destination,
    })
}

/// Bitbucket credentials from the environment, endpoints from the YAML.
pub fn source_credentials(config: &CliConfig) -> Result<SourceCredentials> {
    let mut credentials =
        SourceCredentials::new(required_env(BITBUCKET_USERNAME)?, required_env(BITBUCKET_APP_PASSWORD)?);
    credentials.api_base = config
        .source
        .api_base
        .clone()
        .unwrap_or_else(|| DEFAULT_BITBUCKET_API.to_string());
    credentials.git_base = config
        .source
        .git_base
        .clone()
        .unwrap_or_else(|| DEFAULT_BITBUCKET_GIT.to_string());
    credentials.trace_loaded();
    Ok(credentials)
}

/// GitHub token from the environment; owner and API base from the
/// environment when set, else from the YAML.
pub fn destination_config(config: &CliConfig) -> Result<DestinationConfig> {
    let token = required_env(GITHUB_TOKEN)?;
    let owner = optional_env(GITHUB_OWNER)
        .or_else(|| config.destination.owner.clone())
        .ok_or_else(|| {
            anyhow!("No destination owner: set destination.owner in the config or {GITHUB_OWNER}")
        })?;

    let mut destination = DestinationConfig::new(owner, token);
    destination.api_base = optional_env(GITHUB_API_URL)
        .or_else(|| config.destination.api_base.clone())
        .unwrap_or_else(|| DEFAULT_GITHUB_API.to_string());
    destination.git_base = config
        .destination
        .git_base
        .clone()
        .unwrap_or_else(|| DEFAULT_GITHUB_GIT.to_string());
    destination.trace_loaded();
    Ok(destination)
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn required_env(key: &str) -> Result<String> {
    optional_env(key).ok_or_else(|| {
        error!(env_var = key, "Required environment variable is not set");
        anyhow!("Environment variable {key} must be set (a .env file is also read)")
    })
}
