//! Topology registry tests

use labctl::errors::OrchError;
use labctl::models::host::{Host, Role};
use labctl::topology::registry::TopologyRegistry;
use tokio_test::assert_err;

fn ids(hosts: impl Iterator<Item = Host>) -> Vec<String> {
    hosts.map(|h| h.id).collect()
}

#[test]
fn test_hosts_by_role_in_insertion_order() {
    let registry = TopologyRegistry::new();
    registry.add_host(Host::new("w2", "10.0.0.12", Role::Worker)).unwrap();
    registry.add_host(Host::new("cp", "10.0.0.10", Role::ControlPlane)).unwrap();
    registry.add_host(Host::new("w1", "10.0.0.11", Role::Worker)).unwrap();

    assert_eq!(ids(registry.hosts_by_role(Role::Worker)), vec!["w2", "w1"]);
    assert_eq!(registry.control_plane().unwrap().id, "cp");
    assert_eq!(registry.hosts_by_role(Role::Balancer).count(), 0);
}

#[test]
fn test_snapshot_ignores_later_mutation() {
    let registry = TopologyRegistry::new();
    registry.add_host(Host::new("w1", "10.0.0.11", Role::Worker)).unwrap();

    let workers = registry.hosts_by_role(Role::Worker);
    registry.add_host(Host::new("w2", "10.0.0.12", Role::Worker)).unwrap();
    registry.set_role("w1", Role::Balancer).unwrap();

    // Taken before the mutations
    assert_eq!(ids(workers.clone()), vec!["w1"]);
    assert_eq!(ids(workers), vec!["w1"]);
    assert_eq!(ids(registry.hosts_by_role(Role::Worker)), vec!["w2"]);
}

#[test]
fn test_second_control_plane_is_a_conflict() {
    let registry = TopologyRegistry::new();
    registry.add_host(Host::new("cp", "10.0.0.10", Role::ControlPlane)).unwrap();
    registry.add_host(Host::new("w1", "10.0.0.11", Role::Worker)).unwrap();

    let err = assert_err!(registry.add_host(Host::new("cp2", "10.0.0.20", Role::ControlPlane)));
    assert!(matches!(err, OrchError::RoleConflict(_)));
    let err = assert_err!(registry.set_role("w1", Role::ControlPlane));
    assert!(matches!(err, OrchError::RoleConflict(_)));

    // Nothing changed
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.get("w1").unwrap().role, Role::Worker);

    // Re-asserting the current control plane is fine
    registry.set_role("cp", Role::ControlPlane).unwrap();
}

#[test]
fn test_duplicate_and_unknown_ids() {
    let registry = TopologyRegistry::new();
    registry.add_host(Host::new("w1", "10.0.0.11", Role::Worker)).unwrap();

    assert!(matches!(
        registry.add_host(Host::new("w1", "10.0.0.99", Role::Worker)),
        Err(OrchError::ValidationError(_))
    ));
    assert!(matches!(
        registry.set_reachable("nope", false),
        Err(OrchError::NotFound(_))
    ));
    assert_eq!(registry.get("w1").unwrap().address, "10.0.0.11");
}

#[test]
fn test_reachability() {
    let registry = TopologyRegistry::from_hosts(vec![
        Host::new("w1", "10.0.0.11", Role::Worker),
        Host::new("w2", "10.0.0.12", Role::Worker),
    ])
    .unwrap();
    assert!(registry.all_reachable());

    registry.set_reachable("w2", false).unwrap();
    assert!(!registry.all_reachable());
    assert!(!registry.get("w2").unwrap().reachable);
}
