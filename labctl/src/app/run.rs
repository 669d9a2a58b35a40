//! Command dispatch for one labctl invocation

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app::cli::{BootstrapArgs, CliCommand, Targets, USAGE};
use crate::app::options::AppOptions;
use crate::app::report::{render_summary, render_topology, to_json};
use crate::authn::credential_mngr::CredentialManager;
use crate::balancer;
use crate::deploy::action::Action;
use crate::deploy::bootstrap::{BootstrapOrchestrator, BootstrapRequest};
use crate::deploy::fanout::FanoutDeployer;
use crate::deploy::flavor::ClusterFlavor;
use crate::errors::OrchError;
use crate::models::host::{Host, Role};
use crate::models::task::RunSummary;
use crate::remote::dry_run::DryRunTransport;
use crate::remote::executor::RemoteExecutor;
use crate::remote::ssh::SshTransport;
use crate::remote::transport::Transport;
use crate::storage::state::{
    export, load_credentials, load_topology, save_credentials, save_topology,
};
use crate::topology::registry::TopologyRegistry;
use crate::utils::version_info;

/// Process exit code for an error that stopped the run
pub fn exit_code_for(error: &OrchError) -> i32 {
    match error {
        OrchError::ValidationError(_) | OrchError::ConfigError(_) | OrchError::RoleConflict(_) => 2,
        _ => 1,
    }
}

pub fn print_usage() {
    println!("{}", USAGE);
}

pub fn print_version() -> Result<(), OrchError> {
    println!("{}", to_json(&version_info())?);
    Ok(())
}

/// Run a command to completion and return the process exit code.
///
/// `shutdown_signal` cancels the run: hosts not yet started are skipped,
/// hosts in flight finish their current command.
pub async fn run(
    command: CliCommand,
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<i32, OrchError> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal.await;
            warn!("Shutdown requested, skipping hosts that have not started");
            cancel.cancel();
        })
    };

    let transport: Arc<dyn Transport> = if options.dry_run {
        info!("Dry run: remote commands are logged, not executed");
        Arc::new(DryRunTransport)
    } else {
        Arc::new(SshTransport::new(options.settings.ssh.clone()))
    };
    let deployer = FanoutDeployer::new(RemoteExecutor::new(transport), options.fanout.clone());

    let result = match command {
        CliCommand::Bootstrap(args) => bootstrap(args, &options, deployer, &cancel).await,
        CliCommand::Deploy { targets, action } => {
            deploy(targets, action, &options, deployer, &cancel).await
        }
        CliCommand::ConfigureBalancer { balancer } => {
            configure_balancer(balancer, &options, deployer, &cancel).await
        }
        CliCommand::Topology => topology(&options).await,
        CliCommand::Version => print_version().map(|_| 0),
        CliCommand::Help => {
            print_usage();
            Ok(0)
        }
    };

    watcher.abort();
    result
}

async fn bootstrap(
    args: BootstrapArgs,
    options: &AppOptions,
    deployer: FanoutDeployer,
    cancel: &CancellationToken,
) -> Result<i32, OrchError> {
    let flavor: ClusterFlavor = args
        .flavor
        .as_deref()
        .unwrap_or(&options.settings.default_flavor)
        .parse()?;
    let request = BootstrapRequest {
        control_host: args.control,
        worker_hosts: args.workers,
        network_plugin: args.network,
        flavor,
        balancer_host: args.balancer,
    };

    // A bootstrap describes a new cluster; earlier state is replaced
    let registry = TopologyRegistry::new();
    let credentials = CredentialManager::new();
    let orchestrator = BootstrapOrchestrator::new(
        deployer,
        options.settings.balancer.clone(),
        options.settings.cluster.clone(),
    );
    let summary = orchestrator
        .bootstrap(&request, &registry, &credentials, cancel)
        .await?;

    persist(options, &registry, Some(&credentials)).await?;
    report(&summary, options)
}

async fn deploy(
    targets: Targets,
    action: Action,
    options: &AppOptions,
    deployer: FanoutDeployer,
    cancel: &CancellationToken,
) -> Result<i32, OrchError> {
    let registry = load_topology(&options.layout.topology_file()).await?;
    let hosts = match targets {
        Targets::Hosts(hosts) => {
            for host in &hosts {
                if registry.get(&host.id).is_none() {
                    registry.add_host(host.clone())?;
                }
            }
            hosts
        }
        Targets::Role(role) => registry.hosts_by_role(role).collect(),
    };
    if hosts.is_empty() {
        return Err(OrchError::ValidationError(
            "No target hosts; register some or pass --hosts".to_string(),
        ));
    }

    let mut summary = deployer
        .deploy_recorded(hosts, &action, &registry, cancel)
        .await;
    if !cancel.is_cancelled() && registry.hosts_by_role(Role::Balancer).next().is_some() {
        let published =
            balancer::configure(&deployer, &registry, &options.settings.balancer, cancel).await;
        balancer::annotate(&mut summary, &published);
    }

    persist(options, &registry, None).await?;
    report(&summary, options)
}

async fn configure_balancer(
    balancer_host: Host,
    options: &AppOptions,
    deployer: FanoutDeployer,
    cancel: &CancellationToken,
) -> Result<i32, OrchError> {
    let registry = load_topology(&options.layout.topology_file()).await?;
    match registry.get(&balancer_host.id) {
        Some(existing) if existing.role != Role::Balancer => {
            registry.set_role(&balancer_host.id, Role::Balancer)?
        }
        Some(_) => {}
        None => registry.add_host(balancer_host)?,
    }

    let summary =
        balancer::configure(&deployer, &registry, &options.settings.balancer, cancel).await;
    persist(options, &registry, None).await?;
    report(&summary, options)
}

async fn topology(options: &AppOptions) -> Result<i32, OrchError> {
    let registry = load_topology(&options.layout.topology_file()).await?;
    let credentials = load_credentials(&options.layout.credentials_file()).await?;
    let state = export(&registry, &credentials);

    if options.json_output {
        println!("{}", to_json(&state)?);
    } else {
        print!("{}", render_topology(&state));
    }
    Ok(0)
}

async fn persist(
    options: &AppOptions,
    registry: &TopologyRegistry,
    credentials: Option<&CredentialManager>,
) -> Result<(), OrchError> {
    if !options.persist_state() {
        debug!("State persistence disabled for this run");
        return Ok(());
    }

    options.layout.setup().await?;
    save_topology(&options.layout.topology_file(), registry).await?;
    if let Some(credentials) = credentials.filter(|c| !c.is_empty()) {
        save_credentials(&options.layout.credentials_file(), credentials).await?;
    }
    debug!("State saved to {}", options.layout.base_dir.display());
    Ok(())
}

fn report(summary: &RunSummary, options: &AppOptions) -> Result<i32, OrchError> {
    if options.json_output {
        println!("{}", to_json(summary)?);
    } else {
        print!("{}", render_summary(summary));
    }
    Ok(summary.exit_code())
}
