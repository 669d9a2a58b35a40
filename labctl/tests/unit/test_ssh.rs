//! SSH transport against a stand-in client binary

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use labctl::deploy::action::Action;
use labctl::deploy::fanout::FanoutDeployer;
use labctl::errors::ExecError;
use labctl::models::host::{Host, Role};
use labctl::models::task::TaskOutcome;
use labctl::remote::command::Command;
use labctl::remote::executor::RemoteExecutor;
use labctl::remote::ssh::SshTransport;
use labctl::storage::settings::SshSettings;
use labctl::topology::registry::TopologyRegistry;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::common::fast_options;

/// Write an executable `ssh` that appends a line to `calls.log` on every
/// invocation, prints `stderr` and exits with `code`
fn fake_client(dir: &Path, stderr: &str, code: i32) -> PathBuf {
    let log = dir.join("calls.log");
    let path = dir.join("ssh");
    let script = format!(
        "#!/bin/sh\necho called >> '{}'\nprintf '%s\\n' '{}' >&2\nexit {}\n",
        log.display(),
        stderr,
        code
    );
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn calls(dir: &Path) -> usize {
    std::fs::read_to_string(dir.join("calls.log"))
        .map(|log| log.lines().count())
        .unwrap_or(0)
}

async fn run_once(stderr: &str) -> (tempfile::TempDir, TaskOutcome, Option<ExecError>, bool) {
    let tmp = tempfile::tempdir().unwrap();
    let program = fake_client(tmp.path(), stderr, 255);

    // Something must accept on the SSH port for the reachability check
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let transport = SshTransport::new(SshSettings {
        program: program.display().to_string(),
        port,
        ..Default::default()
    });
    let deployer = FanoutDeployer::new(
        RemoteExecutor::new(Arc::new(transport)),
        fast_options(1, 3),
    );

    let registry = TopologyRegistry::new();
    let host = Host::new("h1", "127.0.0.1", Role::Standalone);
    registry.add_host(host.clone()).unwrap();

    let action = Action::Exec(Command::new("/opt/app/migrate.sh"));
    let runs = deployer
        .run_all(
            vec![host],
            &action.label(),
            |_| action.steps(),
            &CancellationToken::new(),
        )
        .await;
    labctl::deploy::fanout::record_reachability(&registry, &runs);

    let run = runs.into_iter().next().unwrap();
    let reachable = registry.get("h1").unwrap().reachable;
    drop(listener);
    (tmp, run.task.outcome, run.error, reachable)
}

#[tokio::test]
async fn test_remote_exit_255_runs_once_and_is_not_unreachable() {
    let (tmp, outcome, error, reachable) = run_once("remote script failed").await;

    assert_eq!(calls(tmp.path()), 1);
    assert!(matches!(outcome, TaskOutcome::Failed(_)));
    assert_eq!(
        error,
        Some(ExecError::NonZeroExit {
            code: 255,
            stderr: "remote script failed\n".to_string()
        })
    );
    assert!(reachable);
}

#[tokio::test]
async fn test_dropped_connection_is_not_retried() {
    let (tmp, outcome, error, reachable) =
        run_once("Connection to 127.0.0.1 closed by remote host.").await;

    assert_eq!(calls(tmp.path()), 1);
    assert!(matches!(outcome, TaskOutcome::Failed(_)));
    assert!(matches!(error, Some(ExecError::Transport(_))));
    assert!(!reachable);
}

#[tokio::test]
async fn test_client_connect_failure_is_retried() {
    let (tmp, outcome, error, reachable) =
        run_once("ssh: connect to host 127.0.0.1 port 22: Connection refused").await;

    assert_eq!(calls(tmp.path()), 3);
    assert!(matches!(outcome, TaskOutcome::Failed(_)));
    assert!(error.is_some_and(|e| e.is_connect_failure()));
    assert!(!reachable);
}
