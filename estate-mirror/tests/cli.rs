use assert_cmd::Command;
use predicates::prelude::*;
use serial_test::serial;
use std::fs::write;
use std::path::Path;
use tempfile::{tempdir, TempDir};

const SECRETS: [&str; 5] = [
    "BITBUCKET_USERNAME",
    "BITBUCKET_APP_PASSWORD",
    "GITHUB_TOKEN",
    "GITHUB_OWNER",
    "GITHUB_API_URL",
];

/// A scratch directory holding a config whose mirrors and logs stay inside it.
fn workspace_with_config(extra: &str) -> TempDir {
    let dir = tempdir().expect("Creating temp dir failed");
    let root = dir.path().display();
    write(
        dir.path().join("config.yaml"),
        format!(
            "mirror_root: {root}/mirrors\nlog_dir: {root}/logs\nworkers: 2\ndestination:\n  owner: my-org\n{extra}"
        ),
    )
    .expect("Writing temp config failed");
    dir
}

fn estate_mirror(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("estate-mirror").expect("Binary exists");
    cmd.current_dir(dir);
    for key in SECRETS {
        cmd.env_remove(key);
    }
    cmd
}

fn failure_log(dir: &Path) -> String {
    let logs: Vec<_> = std::fs::read_dir(dir.join("logs"))
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(logs.len(), 1, "{logs:?}");
    std::fs::read_to_string(&logs[0]).unwrap()
}

#[test]
fn missing_config_file_is_fatal() {
    let dir = tempdir().unwrap();
    estate_mirror(dir.path())
        .args(["pull", "--config", "does-not-exist.yaml"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn pull_without_source_credentials_is_fatal() {
    let dir = workspace_with_config("");
    estate_mirror(dir.path())
        .args(["pull", "--config", "config.yaml"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("BITBUCKET_USERNAME"));
}

#[test]
fn push_with_no_mirrors_succeeds() {
    let dir = workspace_with_config("");
    estate_mirror(dir.path())
        .args(["push", "--config", "config.yaml"])
        .env("GITHUB_TOKEN", "ghp_token")
        .assert()
        .success()
        .stdout(predicate::str::contains("pulled 0/0, pushed 0/0, failures 0"));
}

#[test]
fn unreachable_destination_fails_the_job_not_the_run() {
    let dir = workspace_with_config("  api_base: http://127.0.0.1:9\n");
    std::fs::create_dir_all(dir.path().join("mirrors/acme/core/auth-svc.git")).unwrap();

    estate_mirror(dir.path())
        .args(["push", "--config", "config.yaml"])
        .env("GITHUB_TOKEN", "ghp_token")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("pushed 0/1, failures 1"))
        .stdout(predicate::str::contains("ERROR: see"));

    let log = failure_log(dir.path());
    assert!(log.contains("Error creating repository acme/core/auth-svc"), "{log}");
    assert!(!log.contains("ghp_token"), "{log}");
}

#[test]
fn unknown_subcommand_is_rejected() {
    let dir = tempdir().unwrap();
    estate_mirror(dir.path())
        .arg("mirror-everything")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

mod in_process {
    use super::*;
    use estate_mirror::cli::{run, Cli, Commands};
    use serde_json::json;
    use std::process::ExitCode;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::prelude::*; // needed for .with()
    use tracing_subscriber::{layer::Context, Layer, Registry};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Custom Layer to collect emitted event messages.
    struct EventCollector {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl<S> Layer<S> for EventCollector
    where
        S: tracing::Subscriber,
    {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            self.events.lock().unwrap().push(format!("{:?}", event));
        }
    }

    #[tokio::test]
    async fn emits_trace_initialised_event() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let collector = EventCollector {
            events: events.clone(),
        };
        let subscriber = Registry::default().with(collector);
        let _guard = tracing::subscriber::set_default(subscriber);

        let cli = Cli {
            command: Commands::Sync {
                config: std::path::PathBuf::from("dummy.yaml"),
            },
        };

        assert!(run(cli).await.is_err());

        let event_msgs = events.lock().unwrap();
        assert!(
            event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
            "Expected a 'trace_initialised' trace event, got: {:?}",
            event_msgs
        );
    }

    #[tokio::test]
    #[serial]
    async fn sizes_reports_per_project() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/workspaces"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "values": [{"slug": "acme", "name": "Acme"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/workspaces/acme/projects"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "values": [{"key": "CORE", "name": "core"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repositories/acme"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "values": [
                    {"slug": "auth-svc", "size": 1073741824u64},
                    {"slug": "gateway", "size": 1024}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = workspace_with_config("");
        let config_path = dir.path().join("config.yaml");
        let mut yaml = std::fs::read_to_string(&config_path).unwrap();
        yaml.push_str(&format!("source:\n  api_base: {}\n", server.uri()));
        write(&config_path, yaml).unwrap();

        std::env::set_var("BITBUCKET_USERNAME", "alice");
        std::env::set_var("BITBUCKET_APP_PASSWORD", "app-pw");
        let code = run(Cli {
            command: Commands::Sizes {
                config: config_path,
                workspace: Some("acme".into()),
            },
        })
        .await
        .unwrap();
        std::env::remove_var("BITBUCKET_USERNAME");
        std::env::remove_var("BITBUCKET_APP_PASSWORD");

        assert_eq!(code, ExitCode::SUCCESS);
    }
}
