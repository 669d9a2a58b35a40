//! Bootstrap orchestration tests

use labctl::authn::credential_mngr::CredentialManager;
use labctl::authn::secret::is_bootstrap_token;
use labctl::balancer::NO_BALANCER;
use labctl::deploy::bootstrap::{BootstrapOrchestrator, BootstrapRequest};
use labctl::deploy::flavor::{ClusterFlavor, NetworkSelection};
use labctl::models::credential::CredentialKind;
use labctl::models::host::{Host, Role};
use labctl::models::task::{RunStatus, Stage, TaskOutcome};
use labctl::storage::settings::{BalancerSettings, ClusterSettings};
use labctl::topology::registry::TopologyRegistry;
use tokio_util::sync::CancellationToken;

use crate::common::{deployer, Reply, ScriptedTransport};

const CP: &str = "10.0.0.10";
const W1: &str = "10.0.0.11";
const W2: &str = "10.0.0.12";
const LB: &str = "10.0.0.2";
const SWARM_TOKEN: &str =
    "SWMTKN-1-3pu6hszjas19xyp7ghgosyx9k8atbfcr8p2is99znpy26u2lkl-1awxwuwd3z9j1z3puu7rcgdbx";

fn request(balancer: bool) -> BootstrapRequest {
    BootstrapRequest {
        control_host: Host::new("cp", CP, Role::ControlPlane),
        worker_hosts: vec![
            Host::new("w1", W1, Role::Worker),
            Host::new("w2", W2, Role::Worker),
        ],
        network_plugin: NetworkSelection::parse(Some("flannel")),
        flavor: ClusterFlavor::K3s,
        balancer_host: balancer.then(|| Host::new("lb", LB, Role::Balancer)),
    }
}

fn orchestrator(transport: &ScriptedTransport) -> BootstrapOrchestrator {
    BootstrapOrchestrator::new(
        deployer(transport, 4),
        BalancerSettings::default(),
        ClusterSettings::default(),
    )
}

#[tokio::test]
async fn test_bootstrap_with_one_worker_timing_out() {
    let transport = ScriptedTransport::new();
    transport.on(W2, "agent", Reply::Timeout);

    let registry = TopologyRegistry::new();
    let credentials = CredentialManager::new();
    let summary = orchestrator(&transport)
        .bootstrap(&request(false), &registry, &credentials, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Degraded);
    assert_eq!(summary.total, 2);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.outcome_for("w1"), Some(&TaskOutcome::Success));
    assert!(matches!(summary.outcome_for("w2"), Some(TaskOutcome::Failed(_))));
    assert_eq!(summary.exit_code(), 1);

    // The failed worker stays registered, marked unreachable
    assert!(registry.get("w1").unwrap().reachable);
    assert!(!registry.get("w2").unwrap().reachable);
    assert_eq!(registry.hosts_by_role(Role::Worker).count(), 2);

    let credential = credentials.get(CredentialKind::ClusterJoin).unwrap();
    assert_eq!(credential.issued_by(), "cp");
    assert!(is_bootstrap_token(credential.expose()));
}

#[tokio::test]
async fn test_issued_token_is_registered_before_any_join() {
    let transport = ScriptedTransport::new();
    let credentials = CredentialManager::new();

    let summary = orchestrator(&transport)
        .bootstrap(
            &request(false),
            &TopologyRegistry::new(),
            &credentials,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(summary.status, RunStatus::Ready);

    let token = credentials
        .get(CredentialKind::ClusterJoin)
        .unwrap()
        .expose()
        .to_string();
    let token_line = format!("{}\n", token);

    let log = transport.log();
    let position = |address: &str, needle: &str| {
        log.iter()
            .position(|l| l.address == address && l.display.contains(needle))
            .unwrap()
    };
    let init = position(CP, "server");
    let register = position(CP, "token create");
    let first_join = log.iter().position(|l| l.display.contains("agent")).unwrap();
    assert!(init < register);
    assert!(register < first_join);
    assert_eq!(log[register].stdin.as_deref(), Some(token_line.as_str()));

    // The token only ever travels on stdin
    let joins: Vec<_> = log.iter().filter(|l| l.display.contains("agent")).collect();
    assert_eq!(joins.len(), 2);
    for logged in &log {
        assert!(!logged.display.contains(&token));
        assert!(!logged.remote_line.contains(&token));
    }
    for join in joins {
        assert_eq!(join.stdin.as_deref(), Some(token_line.as_str()));
        assert!(join.remote_line.contains(&format!("https://{}:6443", CP)));
    }
    for task in &summary.tasks {
        assert!(!task.payload.as_deref().unwrap_or_default().contains(&token));
    }
}

#[tokio::test]
async fn test_rejected_token_registration_fails_credential_stage() {
    let transport = ScriptedTransport::new();
    transport.on(CP, "token create", Reply::Exit(1));

    let registry = TopologyRegistry::new();
    let credentials = CredentialManager::new();
    let summary = orchestrator(&transport)
        .bootstrap(&request(false), &registry, &credentials, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Failed(Stage::CredentialIssued));
    assert_eq!(summary.skipped, 2);
    assert!(credentials.is_empty());
    assert!(transport.commands_to(W1).is_empty());
    assert!(transport.commands_to(W2).is_empty());
    assert!(registry.get("cp").unwrap().reachable);
    assert!(summary.warnings.iter().any(|w| w.contains("registering")));
}

#[tokio::test]
async fn test_swarm_uses_the_token_the_manager_prints() {
    let transport = ScriptedTransport::new();
    transport.on(
        CP,
        "join-token",
        Reply::Stdout(format!("Swarm initialized\n{}\n", SWARM_TOKEN)),
    );

    let mut req = request(false);
    req.flavor = ClusterFlavor::Swarm;
    req.network_plugin = NetworkSelection::Unspecified;
    let credentials = CredentialManager::new();
    let summary = orchestrator(&transport)
        .bootstrap(&req, &TopologyRegistry::new(), &credentials, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Ready);
    let credential = credentials.get(CredentialKind::SwarmWorker).unwrap();
    assert_eq!(credential.expose(), SWARM_TOKEN);

    // Nothing is registered on a swarm manager
    assert!(!transport
        .commands_to(CP)
        .iter()
        .any(|l| l.display.contains("token create")));
    for worker in [W1, W2] {
        let joins = transport.commands_to(worker);
        assert_eq!(joins.len(), 1);
        assert_eq!(joins[0].stdin, Some(format!("{}\n", SWARM_TOKEN)));
        assert!(!joins[0].remote_line.contains(SWARM_TOKEN));
    }
}

#[tokio::test]
async fn test_init_failure_stops_before_workers() {
    let transport = ScriptedTransport::new();
    transport.on(CP, "server", Reply::Exit(1));

    let registry = TopologyRegistry::new();
    let credentials = CredentialManager::new();
    let summary = orchestrator(&transport)
        .bootstrap(&request(true), &registry, &credentials, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Failed(Stage::Init));
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.exit_code(), 1);
    assert!(credentials.is_empty());
    assert!(transport.commands_to(W1).is_empty());
    assert!(transport.commands_to(W2).is_empty());
    assert!(transport.commands_to(LB).is_empty());
    // The control plane answered, so it counts as reachable
    assert!(registry.get("cp").unwrap().reachable);
}

#[tokio::test]
async fn test_unreachable_control_plane() {
    let transport = ScriptedTransport::new();
    transport.unreachable(CP);

    let registry = TopologyRegistry::new();
    let summary = orchestrator(&transport)
        .bootstrap(
            &request(false),
            &registry,
            &CredentialManager::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Failed(Stage::Init));
    assert!(!registry.get("cp").unwrap().reachable);
    assert!(transport.log().is_empty());
}

#[tokio::test]
async fn test_swarm_without_printed_token_fails_credential_stage() {
    let transport = ScriptedTransport::new();
    transport.on(CP, "join-token", Reply::Stdout(String::new()));

    let mut req = request(false);
    req.flavor = ClusterFlavor::Swarm;
    let credentials = CredentialManager::new();
    let summary = orchestrator(&transport)
        .bootstrap(
            &req,
            &TopologyRegistry::new(),
            &credentials,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Failed(Stage::CredentialIssued));
    assert!(credentials.is_empty());
    assert!(transport.commands_to(W1).is_empty());
    assert!(summary.warnings.iter().any(|w| w.contains("printed no")));
}

#[tokio::test]
async fn test_balancer_receives_worker_upstream() {
    let transport = ScriptedTransport::new();

    let summary = orchestrator(&transport)
        .bootstrap(
            &request(true),
            &TopologyRegistry::new(),
            &CredentialManager::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Ready);
    // Balancer publishing is not counted as a worker task
    assert_eq!(summary.total, 2);
    assert!(summary.notes.iter().any(|n| n == "balancer lb updated"));

    let tee = transport
        .commands_to(LB)
        .into_iter()
        .find(|l| l.display.starts_with("tee "))
        .unwrap();
    let config = tee.stdin.unwrap();
    assert!(config.contains(&format!("server {}:80;", W1)));
    assert!(config.contains(&format!("server {}:80;", W2)));
    assert!(!config.contains(CP));
}

#[tokio::test]
async fn test_no_balancer_is_noted() {
    let transport = ScriptedTransport::new();

    let summary = orchestrator(&transport)
        .bootstrap(
            &request(false),
            &TopologyRegistry::new(),
            &CredentialManager::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(summary.notes.iter().any(|n| n == NO_BALANCER));
}

#[tokio::test]
async fn test_network_plugin_failure_is_a_warning() {
    let transport = ScriptedTransport::new();
    transport.on(CP, "calico", Reply::Exit(1));

    let mut req = request(false);
    req.network_plugin = NetworkSelection::parse(Some("calico"));
    let summary = orchestrator(&transport)
        .bootstrap(
            &req,
            &TopologyRegistry::new(),
            &CredentialManager::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Ready);
    assert!(summary.warnings.iter().any(|w| w.contains("network plugin")));
}

#[tokio::test]
async fn test_unsupported_network_plugin_is_a_warning() {
    let transport = ScriptedTransport::new();

    let mut req = request(false);
    req.network_plugin = NetworkSelection::parse(Some("ovn"));
    let summary = orchestrator(&transport)
        .bootstrap(
            &req,
            &TopologyRegistry::new(),
            &CredentialManager::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.status, RunStatus::Ready);
    assert!(summary.warnings.iter().any(|w| w.contains("'ovn'")));
}
