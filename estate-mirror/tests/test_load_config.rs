use serial_test::serial;
use std::env;
use std::fs::write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::NamedTempFile;

use estate_mirror::load_config::{destination_config, load_config, source_credentials};

const SECRETS: [&str; 5] = [
    "BITBUCKET_USERNAME",
    "BITBUCKET_APP_PASSWORD",
    "GITHUB_TOKEN",
    "GITHUB_OWNER",
    "GITHUB_API_URL",
];

fn clear_env() {
    for key in SECRETS {
        env::remove_var(key);
    }
}

fn config_file(yaml: &str) -> NamedTempFile {
    let file = NamedTempFile::new().expect("temp file");
    write(file.path(), yaml).unwrap();
    file
}

#[test]
#[serial]
fn test_load_config_reads_every_field() {
    clear_env();
    let file = config_file(
        r#"
mirror_root: /srv/mirrors
log_dir: /var/log/estate-mirror
workers: 3
job_timeout_secs: 600
source:
  api_base: https://bitbucket.internal/api/2.0
  git_base: https://bitbucket.internal
destination:
  owner: my-org
  api_base: https://ghe.internal/api/v3
  git_base: https://ghe.internal
"#,
    );

    let config = load_config(file.path()).expect("Config should load");
    assert_eq!(config.mirror_root, PathBuf::from("/srv/mirrors"));
    assert_eq!(config.log_dir, PathBuf::from("/var/log/estate-mirror"));
    assert_eq!(config.scheduler.workers, 3);
    assert_eq!(config.scheduler.job_timeout, Some(Duration::from_secs(600)));

    env::set_var("BITBUCKET_USERNAME", "alice");
    env::set_var("BITBUCKET_APP_PASSWORD", "app-pw");
    env::set_var("GITHUB_TOKEN", "ghp_token");

    let source = source_credentials(&config).unwrap();
    assert_eq!(source.username, "alice");
    assert_eq!(source.app_password, "app-pw");
    assert_eq!(source.api_base, "https://bitbucket.internal/api/2.0");
    assert_eq!(source.git_base, "https://bitbucket.internal");

    let destination = destination_config(&config).unwrap();
    assert_eq!(destination.owner, "my-org");
    assert_eq!(destination.token, "ghp_token");
    assert_eq!(destination.api_base, "https://ghe.internal/api/v3");
    assert_eq!(destination.git_base, "https://ghe.internal");
    clear_env();
}

#[test]
#[serial]
fn test_load_config_defaults() {
    clear_env();
    let file = config_file("destination:\n  owner: my-org\n");

    let config = load_config(file.path()).expect("Config should load");
    assert_eq!(config.mirror_root, PathBuf::from("mirrors"));
    assert_eq!(config.log_dir, PathBuf::from("."));
    assert_eq!(config.scheduler.workers, num_cpus::get());
    assert_eq!(config.scheduler.job_timeout, None);

    env::set_var("BITBUCKET_USERNAME", "alice");
    env::set_var("BITBUCKET_APP_PASSWORD", "app-pw");
    let source = source_credentials(&config).unwrap();
    assert_eq!(source.api_base, "https://api.bitbucket.org/2.0");
    assert_eq!(source.git_base, "https://bitbucket.org");
    clear_env();
}

#[test]
#[serial]
fn test_environment_overrides_owner_and_api_url() {
    clear_env();
    let file = config_file("destination:\n  owner: yaml-org\n  api_base: https://yaml.example\n");
    let config = load_config(file.path()).unwrap();

    env::set_var("GITHUB_TOKEN", "ghp_token");
    env::set_var("GITHUB_OWNER", "env-org");
    env::set_var("GITHUB_API_URL", "https://env.example/api/v3");

    let destination = destination_config(&config).unwrap();
    assert_eq!(destination.owner, "env-org");
    assert_eq!(destination.api_base, "https://env.example/api/v3");
    assert_eq!(destination.git_base, "https://github.com");
    clear_env();
}

#[test]
#[serial]
fn test_missing_secrets_are_reported_by_name() {
    clear_env();
    let file = config_file("mirror_root: ./mirrors\n");
    let config = load_config(file.path()).unwrap();

    let err = source_credentials(&config).unwrap_err();
    assert!(err.to_string().contains("BITBUCKET_USERNAME"), "{err}");

    env::set_var("BITBUCKET_USERNAME", "alice");
    let err = source_credentials(&config).unwrap_err();
    assert!(err.to_string().contains("BITBUCKET_APP_PASSWORD"), "{err}");

    let err = destination_config(&config).unwrap_err();
    assert!(err.to_string().contains("GITHUB_TOKEN"), "{err}");

    env::set_var("GITHUB_TOKEN", "ghp_token");
    let err = destination_config(&config).unwrap_err();
    assert!(err.to_string().contains("owner"), "{err}");
    clear_env();
}

#[test]
#[serial]
fn test_load_config_errors() {
    let missing = load_config("/definitely/not/here.yaml").unwrap_err();
    assert!(missing.to_string().contains("Failed to read config file"));

    let file = config_file("workers: [not, a, number]\n");
    let invalid = load_config(file.path()).unwrap_err();
    assert!(invalid.to_string().contains("Failed to parse config YAML"));
}
