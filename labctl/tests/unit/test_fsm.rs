//! Bootstrap FSM tests

use labctl::deploy::fsm::{BootstrapEvent, BootstrapFsm, BootstrapState};
use labctl::models::task::Stage;

#[test]
fn test_fsm_initial_state() {
    let fsm = BootstrapFsm::new();
    assert_eq!(fsm.state(), BootstrapState::Init);
    assert!(fsm.error().is_none());
    assert_eq!(fsm.history(), &[BootstrapState::Init]);
}

#[test]
fn test_fsm_bootstrap_success_flow() {
    let mut fsm = BootstrapFsm::new();

    // Init -> ControlPlaneUp
    fsm.process(BootstrapEvent::ControlPlaneInitialized).unwrap();
    assert_eq!(fsm.state(), BootstrapState::ControlPlaneUp);

    // ControlPlaneUp -> CredentialIssued
    fsm.process(BootstrapEvent::CredentialIssued).unwrap();
    assert_eq!(fsm.state(), BootstrapState::CredentialIssued);

    // CredentialIssued -> WorkersJoining -> Ready
    fsm.process(BootstrapEvent::JoinStarted).unwrap();
    assert_eq!(fsm.state(), BootstrapState::WorkersJoining);
    fsm.process(BootstrapEvent::WorkersSettled).unwrap();
    assert_eq!(fsm.state(), BootstrapState::Ready);
    assert!(fsm.state().is_terminal());
}

#[test]
fn test_fsm_init_failure() {
    let mut fsm = BootstrapFsm::new();
    fsm.process(BootstrapEvent::StageFailed("exit 1".to_string()))
        .unwrap();

    assert_eq!(fsm.state(), BootstrapState::Failed(Stage::Init));
    assert_eq!(fsm.error(), Some("exit 1"));
}

#[test]
fn test_fsm_credential_failure() {
    let mut fsm = BootstrapFsm::new();
    fsm.process(BootstrapEvent::ControlPlaneInitialized).unwrap();
    fsm.process(BootstrapEvent::StageFailed("no token".to_string()))
        .unwrap();

    assert_eq!(fsm.state(), BootstrapState::Failed(Stage::CredentialIssued));
}

#[test]
fn test_fsm_stages_cannot_be_skipped() {
    let mut fsm = BootstrapFsm::new();
    assert!(fsm.process(BootstrapEvent::JoinStarted).is_err());
    assert!(fsm.process(BootstrapEvent::CredentialIssued).is_err());
    assert!(fsm.process(BootstrapEvent::WorkersSettled).is_err());

    // Rejected events leave the state alone
    assert_eq!(fsm.state(), BootstrapState::Init);
    assert_eq!(fsm.history().len(), 1);
}

#[test]
fn test_fsm_terminal_states_are_final() {
    let mut fsm = BootstrapFsm::new();
    fsm.process(BootstrapEvent::Cancel).unwrap();
    assert_eq!(fsm.state(), BootstrapState::Cancelled);

    assert!(fsm.process(BootstrapEvent::ControlPlaneInitialized).is_err());
    assert!(fsm
        .process(BootstrapEvent::StageFailed("late".to_string()))
        .is_err());
    assert!(fsm.process(BootstrapEvent::Cancel).is_err());
    assert!(fsm.error().is_none());
}

#[test]
fn test_fsm_history() {
    let mut fsm = BootstrapFsm::new();
    fsm.process(BootstrapEvent::ControlPlaneInitialized).unwrap();
    fsm.process(BootstrapEvent::CredentialIssued).unwrap();
    fsm.process(BootstrapEvent::JoinStarted).unwrap();
    fsm.process(BootstrapEvent::Cancel).unwrap();

    assert_eq!(
        fsm.history(),
        &[
            BootstrapState::Init,
            BootstrapState::ControlPlaneUp,
            BootstrapState::CredentialIssued,
            BootstrapState::WorkersJoining,
            BootstrapState::Cancelled,
        ]
    );
}
