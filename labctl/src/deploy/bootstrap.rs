//! Cluster bootstrap orchestration
//!
//! Stages run strictly in order: control plane init, credential issuance,
//! worker joins. k3s and kubeadm join tokens are minted here and registered
//! on the control plane; a swarm manager's token is taken from its init
//! output. A failed control-plane stage ends the run before any worker
//! is touched. Worker failures only degrade the run. The registry and the
//! credential manager belong to the caller's run; roles are assigned here
//! before the first remote command, and reachability is written back only
//! after every worker has settled.

use std::collections::HashSet;

use secrecy::SecretString;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::authn::credential_mngr::CredentialManager;
use crate::balancer;
use crate::deploy::action::Step;
use crate::deploy::fanout::{record_reachability, FanoutDeployer, HostRun, SKIPPED_CANCELLED};
use crate::deploy::flavor::{ClusterFlavor, NetworkSelection, NetworkStep};
use crate::deploy::fsm::{BootstrapEvent, BootstrapFsm, BootstrapState};
use crate::errors::OrchError;
use crate::models::host::{Host, Role};
use crate::models::task::{DeploymentTask, RunMode, RunSummary, SummaryBuilder, TaskOutcome};
use crate::models::credential::Credential;
use crate::remote::transport::Output;
use crate::storage::settings::{BalancerSettings, ClusterSettings};
use crate::topology::registry::TopologyRegistry;
use crate::utils::generate_uuid;

const SKIPPED_CONTROL_PLANE: &str = "control plane stage failed";

#[derive(Debug, Clone)]
pub struct BootstrapRequest {
    pub control_host: Host,
    pub worker_hosts: Vec<Host>,
    pub network_plugin: NetworkSelection,
    pub flavor: ClusterFlavor,
    pub balancer_host: Option<Host>,
}

impl BootstrapRequest {
    fn join_label(&self) -> String {
        format!("join {}", self.flavor)
    }
}

pub struct BootstrapOrchestrator {
    deployer: FanoutDeployer,
    balancer: BalancerSettings,
    cluster: ClusterSettings,
}

impl BootstrapOrchestrator {
    pub fn new(
        deployer: FanoutDeployer,
        balancer: BalancerSettings,
        cluster: ClusterSettings,
    ) -> Self {
        Self {
            deployer,
            balancer,
            cluster,
        }
    }

    /// Bring up a cluster.
    ///
    /// Returns an error only when the request conflicts with the registry, in
    /// which case nothing ran remotely. Every other failure is reported in the
    /// summary.
    pub async fn bootstrap(
        &self,
        request: &BootstrapRequest,
        registry: &TopologyRegistry,
        credentials: &CredentialManager,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, OrchError> {
        let control = register(request, registry)?;
        let mut fsm = BootstrapFsm::new();
        let mut builder = SummaryBuilder::new(generate_uuid(), RunMode::Bootstrap);
        let timeout = self.deployer.options().command_timeout;
        let executor = self.deployer.executor();

        info!(
            "Bootstrapping {} cluster: control plane {}, {} worker(s)",
            request.flavor,
            control,
            request.worker_hosts.len()
        );

        if cancel.is_cancelled() {
            return self.cancel(fsm, builder, request);
        }

        // Init -> ControlPlaneUp
        let init = request
            .flavor
            .init_command(&control, &request.network_plugin);
        let output = match executor.execute(&control, &init, timeout).await {
            Ok(output) => output,
            Err(e) => {
                registry.set_reachable(&control.id, e.host_answered())?;
                let reason = format!("control plane init on {} failed: {}", control.id, e);
                return self.abort(fsm, builder, request, reason);
            }
        };
        registry.set_reachable(&control.id, true)?;
        advance(&mut fsm, BootstrapEvent::ControlPlaneInitialized)?;

        self.apply_network(&control, request, &mut builder).await;

        // ControlPlaneUp -> CredentialIssued
        let issued = if request.flavor.issues_locally() {
            self.issue_credential(request.flavor, &control, registry, credentials)
                .await
        } else {
            record_printed_credential(request.flavor, &control, &output, credentials)
        };
        if let Err(reason) = issued {
            return self.abort(fsm, builder, request, reason);
        }
        advance(&mut fsm, BootstrapEvent::CredentialIssued)?;

        if cancel.is_cancelled() {
            return self.cancel(fsm, builder, request);
        }

        // CredentialIssued -> WorkersJoining -> Ready
        advance(&mut fsm, BootstrapEvent::JoinStarted)?;
        let runs = self
            .join_workers(
                request.flavor,
                &control,
                &request.worker_hosts,
                registry,
                credentials,
                cancel,
            )
            .await?;

        let cancelled = cancel.is_cancelled();
        if cancelled {
            advance(&mut fsm, BootstrapEvent::Cancel)?;
            builder.cancelled();
        } else {
            advance(&mut fsm, BootstrapEvent::WorkersSettled)?;
        }

        let mut summary = builder.finish(runs.into_iter().map(|r| r.task).collect());
        if !cancelled {
            let published =
                balancer::configure(&self.deployer, registry, &self.balancer, cancel).await;
            balancer::annotate(&mut summary, &published);
        }
        info!(
            "Bootstrap {}: {}/{} worker(s) joined",
            summary.status, summary.succeeded, summary.total
        );
        debug!("Bootstrap states: {:?}", fsm.history());
        Ok(summary)
    }

    /// Join every worker with the recorded credential.
    ///
    /// Fails with `CredentialMissing` before touching any host or the
    /// registry when no credential of the flavor's kind exists.
    pub async fn join_workers(
        &self,
        flavor: ClusterFlavor,
        control: &Host,
        workers: &[Host],
        registry: &TopologyRegistry,
        credentials: &CredentialManager,
        cancel: &CancellationToken,
    ) -> Result<Vec<HostRun>, OrchError> {
        let credential = credentials.require(flavor.credential_kind())?;
        let join = flavor.join_command(control, &credential, &self.cluster);

        let runs = self
            .deployer
            .run_all(
                workers.to_vec(),
                &format!("join {}", flavor),
                |_| vec![Step::required(join.clone())],
                cancel,
            )
            .await;

        record_reachability(registry, &runs);
        Ok(runs)
    }

    /// Mint the join token and register it on the control plane. A token
    /// the control plane refused is revoked again.
    async fn issue_credential(
        &self,
        flavor: ClusterFlavor,
        control: &Host,
        registry: &TopologyRegistry,
        credentials: &CredentialManager,
    ) -> Result<Credential, String> {
        let kind = flavor.credential_kind();
        let credential = credentials
            .issue(kind, control)
            .map_err(|e| e.to_string())?;
        let Some(register) = flavor.register_command(&credential) else {
            return Ok(credential);
        };

        let timeout = self.deployer.options().command_timeout;
        match self.deployer.executor().execute(control, &register, timeout).await {
            Ok(_) => {
                debug!("{} registered on {}", credential, control.id);
                Ok(credential)
            }
            Err(e) => {
                credentials.revoke(kind);
                registry
                    .set_reachable(&control.id, e.host_answered())
                    .map_err(|e| e.to_string())?;
                Err(format!(
                    "registering the {} token on {} failed: {}",
                    kind, control.id, e
                ))
            }
        }
    }

    async fn apply_network(
        &self,
        control: &Host,
        request: &BootstrapRequest,
        builder: &mut SummaryBuilder,
    ) {
        let timeout = self.deployer.options().command_timeout;
        match request.flavor.network_step(&request.network_plugin) {
            NetworkStep::Apply(command) => {
                match self.deployer.executor().execute(control, &command, timeout).await {
                    Ok(_) => builder.note(format!("network plugin applied: {}", command)),
                    Err(e) => {
                        warn!("Network plugin on {} failed: {}", control.id, e);
                        builder.warn(format!("network plugin failed on {}: {}", control.id, e));
                    }
                }
            }
            NetworkStep::BuiltIn => {
                builder.note(format!("network plugin built into {}", request.flavor))
            }
            NetworkStep::NotNeeded => {}
            NetworkStep::NotApplicable => builder.warn(format!(
                "network plugin selection ignored: not applicable to {}",
                request.flavor
            )),
            NetworkStep::Unselected => builder.warn(
                "no network plugin selected; pods will not schedule until one is installed",
            ),
            NetworkStep::Unsupported(name) => {
                builder.warn(format!("unsupported network plugin '{}' ignored", name))
            }
        }
    }

    fn abort(
        &self,
        mut fsm: BootstrapFsm,
        mut builder: SummaryBuilder,
        request: &BootstrapRequest,
        reason: String,
    ) -> Result<RunSummary, OrchError> {
        error!("{}", reason);
        advance(&mut fsm, BootstrapEvent::StageFailed(reason.clone()))?;
        if let BootstrapState::Failed(stage) = fsm.state() {
            builder.fatal(stage);
        }
        builder.warn(reason);
        Ok(builder.finish(skip_workers(request, SKIPPED_CONTROL_PLANE)))
    }

    fn cancel(
        &self,
        mut fsm: BootstrapFsm,
        mut builder: SummaryBuilder,
        request: &BootstrapRequest,
    ) -> Result<RunSummary, OrchError> {
        warn!("Bootstrap cancelled in state {:?}", fsm.state());
        advance(&mut fsm, BootstrapEvent::Cancel)?;
        builder.cancelled();
        Ok(builder.finish(skip_workers(request, SKIPPED_CANCELLED)))
    }
}

/// Take the join secret a control plane printed as the last line of init
fn record_printed_credential(
    flavor: ClusterFlavor,
    control: &Host,
    output: &Output,
    credentials: &CredentialManager,
) -> Result<Credential, String> {
    let kind = flavor.credential_kind();
    match output.last_line().filter(|line| flavor.accepts_secret(line)) {
        Some(secret) => credentials
            .record(kind, control, SecretString::from(secret.to_string()))
            .map_err(|e| e.to_string()),
        None => Err(format!(
            "{} init on {} printed no {} secret",
            flavor, control.id, kind
        )),
    }
}

fn advance(fsm: &mut BootstrapFsm, event: BootstrapEvent) -> Result<(), OrchError> {
    fsm.process(event).map_err(OrchError::Internal)
}

fn skip_workers(request: &BootstrapRequest, reason: &str) -> Vec<DeploymentTask> {
    request
        .worker_hosts
        .iter()
        .map(|worker| {
            let mut task = DeploymentTask::new(&worker.id, request.join_label(), None);
            task.outcome = TaskOutcome::Skipped(reason.to_string());
            task
        })
        .collect()
}

/// Assign roles for the request. Validates everything first so a rejected
/// request leaves the registry untouched.
fn register(request: &BootstrapRequest, registry: &TopologyRegistry) -> Result<Host, OrchError> {
    let mut control = request.control_host.clone();
    control.role = Role::ControlPlane;

    let mut hosts = vec![control.clone()];
    hosts.extend(request.worker_hosts.iter().cloned().map(|mut w| {
        w.role = Role::Worker;
        w
    }));
    if let Some(balancer) = &request.balancer_host {
        let mut balancer = balancer.clone();
        balancer.role = Role::Balancer;
        hosts.push(balancer);
    }

    let mut seen = HashSet::new();
    for host in &hosts {
        if !seen.insert(host.id.as_str()) || registry.get(&host.id).is_some() {
            return Err(OrchError::ValidationError(format!(
                "Host {} is already registered or listed twice",
                host.id
            )));
        }
    }
    if let Some(existing) = registry.control_plane() {
        return Err(OrchError::RoleConflict(format!(
            "{} is already the control plane; cannot assign {}",
            existing.id, control.id
        )));
    }

    for host in hosts {
        registry.add_host(host)?;
    }
    Ok(control)
}
