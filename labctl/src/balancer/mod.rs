//! Load-balancer configuration
//!
//! Renders an nginx upstream over the registered workers and ships it to
//! every balancer host. Rendering is a pure function of the worker list, in
//! registry order, so the same topology always yields byte-identical text.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::deploy::action::Step;
use crate::deploy::fanout::{record_reachability, FanoutDeployer};
use crate::errors::ExecError;
use crate::models::host::{Host, Role};
use crate::models::task::{RunMode, RunSummary, SummaryBuilder, TaskOutcome};
use crate::remote::command::Command;
use crate::remote::executor::RemoteExecutor;
use crate::storage::settings::BalancerSettings;
use crate::topology::registry::TopologyRegistry;
use crate::utils::{generate_uuid, sha256_hash};

pub const NO_BALANCER: &str = "no balancer configured";

const UPSTREAM: &str = "labctl_workers";

/// Rendered balancer configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigText {
    text: String,
    fingerprint: String,
    backends: usize,
}

impl ConfigText {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Short sha256 of the body, stamped into the header
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Distinct worker backends in the upstream
    pub fn backends(&self) -> usize {
        self.backends
    }
}

/// Render the config for the registry's current workers
pub fn render(registry: &TopologyRegistry, settings: &BalancerSettings) -> ConfigText {
    let workers: Vec<Host> = registry.hosts_by_role(Role::Worker).collect();
    render_workers(&workers, settings)
}

fn render_workers(workers: &[Host], settings: &BalancerSettings) -> ConfigText {
    let mut seen = HashSet::new();
    let servers: Vec<String> = workers
        .iter()
        .map(|w| format!("{}:{}", w.address, settings.backend_port))
        .filter(|server| seen.insert(server.clone()))
        .collect();

    let mut body = String::new();
    if servers.is_empty() {
        body.push_str("# no workers registered\n");
    } else {
        let _ = writeln!(body, "upstream {} {{", UPSTREAM);
        for server in &servers {
            let _ = writeln!(body, "    server {};", server);
        }
        body.push_str("}\n\n");
        body.push_str("server {\n");
        let _ = writeln!(body, "    listen {};", settings.listen_port);
        body.push_str("    location / {\n");
        let _ = writeln!(body, "        proxy_pass http://{};", UPSTREAM);
        body.push_str("        proxy_set_header Host $host;\n");
        body.push_str("        proxy_set_header X-Real-IP $remote_addr;\n");
        body.push_str("        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;\n");
        body.push_str("    }\n");
        body.push_str("}\n");
    }

    let fingerprint = sha256_hash(body.as_bytes())[..12].to_string();
    let text = format!(
        "# Managed by labctl. Local edits are overwritten.\n# fingerprint: {}\n{}",
        fingerprint, body
    );

    ConfigText {
        text,
        fingerprint,
        backends: servers.len(),
    }
}

/// Remote steps that install `config` and reload the balancer
pub fn publish_steps(config: &ConfigText, settings: &BalancerSettings) -> Vec<Step> {
    let mut steps = Vec::new();
    if let Some(dir) = Path::new(&settings.config_path)
        .parent()
        .and_then(Path::to_str)
        .filter(|d| !d.is_empty())
    {
        steps.push(Step::required(Command::new("mkdir").args(["-p", dir])));
    }
    steps.push(Step::required(
        Command::new("tee")
            .arg(settings.config_path.as_str())
            .stdin(config.as_str().as_bytes().to_vec()),
    ));
    if let Some((program, args)) = settings.reload_command.split_first() {
        steps.push(Step::required(
            Command::new(program.as_str()).args(args.iter().map(String::as_str)),
        ));
    }
    steps
}

/// Write `config` to one balancer host and reload it
pub async fn publish(
    executor: &RemoteExecutor,
    host: &Host,
    config: &ConfigText,
    settings: &BalancerSettings,
    timeout: Duration,
) -> Result<(), ExecError> {
    for step in publish_steps(config, settings) {
        executor.execute(host, &step.command, timeout).await?;
    }
    info!("Published balancer config {} to {}", config.fingerprint(), host.id);
    Ok(())
}

/// Render once and publish to every balancer in the registry
pub async fn configure(
    deployer: &FanoutDeployer,
    registry: &TopologyRegistry,
    settings: &BalancerSettings,
    cancel: &CancellationToken,
) -> RunSummary {
    let mut builder = SummaryBuilder::new(generate_uuid(), RunMode::Balancer);
    let balancers: Vec<Host> = registry.hosts_by_role(Role::Balancer).collect();
    if balancers.is_empty() {
        info!("No balancer in the topology, skipping config publish");
        builder.note(NO_BALANCER);
        return builder.finish(Vec::new());
    }

    let config = render(registry, settings);
    if config.backends() == 0 {
        warn!("Publishing a balancer config with no workers");
        builder.warn("balancer config has no worker backends");
    }
    builder.note(format!(
        "balancer config {} with {} backend(s)",
        config.fingerprint(),
        config.backends()
    ));

    let steps = publish_steps(&config, settings);
    let label = format!("publish {}", config.fingerprint());
    let runs = deployer
        .run_all(balancers, &label, |_| steps.clone(), cancel)
        .await;

    record_reachability(registry, &runs);
    if cancel.is_cancelled() {
        builder.cancelled();
    }
    builder.finish(runs.into_iter().map(|r| r.task).collect())
}

/// Fold a balancer summary into another run's summary as notes and
/// warnings. The other run's status is left as is.
pub fn annotate(summary: &mut RunSummary, balancer: &RunSummary) {
    summary.notes.extend(balancer.notes.iter().cloned());
    summary.warnings.extend(balancer.warnings.iter().cloned());
    for task in &balancer.tasks {
        match &task.outcome {
            TaskOutcome::Success => summary
                .notes
                .push(format!("balancer {} updated", task.host)),
            TaskOutcome::Failed(reason) => summary
                .warnings
                .push(format!("balancer {} not updated: {}", task.host, reason)),
            TaskOutcome::Skipped(reason) => summary
                .warnings
                .push(format!("balancer {} skipped: {}", task.host, reason)),
            TaskOutcome::Pending => {}
        }
    }
}
