//! Fan-out deployer tests

use std::sync::Arc;

use labctl::deploy::action::{Action, ContainerSpec};
use labctl::deploy::fanout::FanoutDeployer;
use labctl::models::host::{Host, Role};
use labctl::models::task::{RunStatus, TaskOutcome};
use labctl::remote::command::Command;
use labctl::remote::executor::RemoteExecutor;
use labctl::topology::registry::TopologyRegistry;
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

use crate::common::{deployer, fast_options, Reply, ScriptedTransport};

fn hosts() -> Vec<Host> {
    vec![
        Host::new("h1", "10.0.1.1", Role::Standalone),
        Host::new("h2", "10.0.1.2", Role::Standalone),
        Host::new("h3", "10.0.1.3", Role::Standalone),
    ]
}

fn nginx() -> Action {
    let mut spec = ContainerSpec::new("nginx:1.27");
    spec.ports.push("8080:80".to_string());
    Action::RunContainer(spec)
}

#[tokio::test]
async fn test_one_failing_host_does_not_stop_the_others() {
    let transport = ScriptedTransport::new();
    transport.on("10.0.1.2", "docker run", Reply::Exit(125));

    let summary = deployer(&transport, 2)
        .deploy(hosts(), &nginx(), &CancellationToken::new())
        .await;

    assert_eq!(summary.total, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.status, RunStatus::Degraded);

    // Results come back in input order
    let order: Vec<&str> = summary.tasks.iter().map(|t| t.host.as_str()).collect();
    assert_eq!(order, vec!["h1", "h2", "h3"]);
    assert!(matches!(summary.tasks[1].outcome, TaskOutcome::Failed(_)));

    // Each host got the full step sequence
    for address in ["10.0.1.1", "10.0.1.2", "10.0.1.3"] {
        let commands: Vec<String> = transport
            .commands_to(address)
            .into_iter()
            .map(|l| l.display)
            .collect();
        assert_eq!(commands.len(), 3);
        assert!(commands[0].starts_with("docker pull nginx:1.27"));
        assert!(commands[2].contains("-p 8080:80"));
    }
}

#[tokio::test]
async fn test_tolerated_step_failure_still_succeeds() {
    let transport = ScriptedTransport::new();
    // No container to remove yet
    transport.on("10.0.1.1", "docker rm", Reply::Exit(1));

    let summary = deployer(&transport, 1)
        .deploy(hosts()[..1].to_vec(), &nginx(), &CancellationToken::new())
        .await;

    assert_eq!(summary.status, RunStatus::Ready);
    assert_eq!(transport.commands_to("10.0.1.1").len(), 3);
}

#[tokio::test]
async fn test_unreachable_host_is_retried_then_marked() {
    let transport = ScriptedTransport::new();
    transport.unreachable("10.0.1.3");

    let registry = TopologyRegistry::from_hosts(hosts()).unwrap();
    let deployer = FanoutDeployer::new(
        RemoteExecutor::new(Arc::new(transport.clone())),
        fast_options(3, 2),
    );
    let action = Action::PullImage {
        image: "redis:7".to_string(),
    };
    let summary = deployer
        .deploy_recorded(hosts(), &action, &registry, &CancellationToken::new())
        .await;

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    let task = summary.tasks.iter().find(|t| t.host == "h3").unwrap();
    assert_eq!(task.attempt, 2);
    // Two hosts connect once, the unreachable one twice
    assert_eq!(transport.connects(), 4);

    assert!(registry.get("h1").unwrap().reachable);
    assert!(!registry.get("h3").unwrap().reachable);
}

#[tokio::test]
async fn test_failed_command_is_not_retried() {
    let transport = ScriptedTransport::new();
    transport.on("10.0.1.1", "docker pull", Reply::Exit(1));

    let deployer = FanoutDeployer::new(
        RemoteExecutor::new(Arc::new(transport.clone())),
        fast_options(1, 3),
    );
    let action = Action::PullImage {
        image: "redis:7".to_string(),
    };
    let registry = TopologyRegistry::from_hosts(hosts()).unwrap();
    let summary = deployer
        .deploy_recorded(hosts()[..1].to_vec(), &action, &registry, &CancellationToken::new())
        .await;

    assert_eq!(summary.failed, 1);
    assert_eq!(transport.connects(), 1);
    // The host answered with an exit code, so it is still reachable
    assert!(registry.get("h1").unwrap().reachable);
}

#[tokio::test]
async fn test_cancel_skips_hosts_not_started() {
    let cancel = CancellationToken::new();
    let transport = ScriptedTransport::new();
    // Whichever host starts first requests the shutdown
    for address in ["10.0.1.1", "10.0.1.2", "10.0.1.3"] {
        transport.on(address, "systemctl", Reply::CancelRun(cancel.clone()));
    }

    let action = Action::StartService {
        name: "nginx".to_string(),
    };
    let summary = deployer(&transport, 1).deploy(hosts(), &action, &cancel).await;

    assert_eq!(summary.status, RunStatus::Cancelled);
    assert_eq!(summary.total, 3);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.exit_code(), 1);
    assert_eq!(transport.log().len(), 1);
}

#[tokio::test]
async fn test_empty_host_list() {
    let transport = ScriptedTransport::new();
    let summary = deployer(&transport, 4)
        .deploy(Vec::new(), &nginx(), &CancellationToken::new())
        .await;

    assert_eq!(summary.total, 0);
    assert_eq!(summary.status, RunStatus::Ready);
    assert_eq!(summary.exit_code(), 0);
}

#[tokio::test]
async fn test_secret_arguments_are_redacted_in_summary() {
    let transport = ScriptedTransport::new();
    let secret = Arc::new(SecretString::from("hunter2".to_string()));
    let action = Action::Exec(
        Command::new("docker")
            .args(["login", "-u", "ci", "-p"])
            .secret_arg(secret),
    );

    let summary = deployer(&transport, 1)
        .deploy(hosts()[..1].to_vec(), &action, &CancellationToken::new())
        .await;

    let payload = summary.tasks[0].payload.clone().unwrap();
    assert!(!payload.contains("hunter2"));
    assert!(payload.contains("***"));
    assert!(transport.log()[0].remote_line.contains("hunter2"));
}
