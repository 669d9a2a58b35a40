//! Bounded parallel fan-out of one action across many hosts
//!
//! Hosts run independently under a semaphore. A failure on one host never
//! stops the others, and the caller gets exactly one task per input host, in
//! input order, once every host has settled.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::deploy::action::{render_steps, Action, Step};
use crate::deploy::retry::{retry_unreachable, RetryPolicy};
use crate::errors::ExecError;
use crate::models::host::Host;
use crate::models::task::{DeploymentTask, RunMode, RunSummary, SummaryBuilder, TaskOutcome};
use crate::remote::executor::RemoteExecutor;
use crate::topology::registry::TopologyRegistry;
use crate::utils::generate_uuid;

pub const SKIPPED_CANCELLED: &str = "cancelled";

#[derive(Debug, Clone)]
pub struct FanoutOptions {
    /// Hosts worked on at once
    pub parallelism: usize,

    /// Deadline for each remote command
    pub command_timeout: Duration,

    pub retry: RetryPolicy,
}

impl Default for FanoutOptions {
    fn default() -> Self {
        Self {
            parallelism: 4,
            command_timeout: Duration::from_secs(600),
            retry: RetryPolicy::default(),
        }
    }
}

/// Result of one host's task
#[derive(Debug, Clone)]
pub struct HostRun {
    pub host: Host,
    pub task: DeploymentTask,

    /// Error that failed the task, if any
    pub error: Option<ExecError>,
}

impl HostRun {
    pub fn succeeded(&self) -> bool {
        self.task.outcome == TaskOutcome::Success
    }

    /// Whether the host showed any sign of life. Skipped hosts keep their
    /// previous reachability, so this is `None` for them.
    pub fn reachable(&self) -> Option<bool> {
        match (&self.task.outcome, &self.error) {
            (TaskOutcome::Success, _) => Some(true),
            (TaskOutcome::Failed(_), Some(e)) => Some(e.host_answered()),
            (TaskOutcome::Failed(_), None) => Some(false),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct FanoutDeployer {
    executor: RemoteExecutor,
    options: FanoutOptions,
}

impl FanoutDeployer {
    pub fn new(executor: RemoteExecutor, options: FanoutOptions) -> Self {
        Self { executor, options }
    }

    pub fn executor(&self) -> &RemoteExecutor {
        &self.executor
    }

    pub fn options(&self) -> &FanoutOptions {
        &self.options
    }

    /// Deploy `action` to every host and summarize the outcome
    pub async fn deploy(
        &self,
        hosts: Vec<Host>,
        action: &Action,
        cancel: &CancellationToken,
    ) -> RunSummary {
        let runs = self.deploy_runs(hosts, action, cancel).await;
        summarize(RunMode::Deploy, runs, cancel)
    }

    /// Like `deploy`, also writing host reachability back to `registry`
    pub async fn deploy_recorded(
        &self,
        hosts: Vec<Host>,
        action: &Action,
        registry: &TopologyRegistry,
        cancel: &CancellationToken,
    ) -> RunSummary {
        let runs = self.deploy_runs(hosts, action, cancel).await;
        record_reachability(registry, &runs);
        summarize(RunMode::Deploy, runs, cancel)
    }

    async fn deploy_runs(
        &self,
        hosts: Vec<Host>,
        action: &Action,
        cancel: &CancellationToken,
    ) -> Vec<HostRun> {
        let steps = action.steps();
        self.run_all(hosts, &action.label(), |_| steps.clone(), cancel)
            .await
    }

    /// Run per-host steps on every host with bounded parallelism.
    ///
    /// Returns one `HostRun` per input host, in input order, after all of
    /// them reached a terminal outcome.
    pub async fn run_all<F>(
        &self,
        hosts: Vec<Host>,
        label: &str,
        steps_for: F,
        cancel: &CancellationToken,
    ) -> Vec<HostRun>
    where
        F: Fn(&Host) -> Vec<Step>,
    {
        info!(
            "Running '{}' on {} host(s), {} at a time",
            label,
            hosts.len(),
            self.options.parallelism.max(1)
        );

        let semaphore = Arc::new(Semaphore::new(self.options.parallelism.max(1)));
        let mut handles = Vec::with_capacity(hosts.len());
        let mut fallbacks = Vec::with_capacity(hosts.len());

        for host in hosts {
            let steps = steps_for(&host);
            let task = DeploymentTask::new(&host.id, label, Some(render_steps(&steps)));
            fallbacks.push((host.clone(), task.clone()));

            let sem = semaphore.clone();
            let executor = self.executor.clone();
            let options = self.options.clone();
            let cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                let permit = tokio::select! {
                    _ = cancel.cancelled() => None,
                    permit = sem.acquire_owned() => permit.ok(),
                };
                let _permit = match permit {
                    Some(permit) if !cancel.is_cancelled() => permit,
                    _ => return skipped(host, task, SKIPPED_CANCELLED),
                };
                run_host(&executor, &options, host, task, &steps, &cancel).await
            }));
        }

        // Barrier: every host settles before the caller sees any result
        join_all(handles)
            .await
            .into_iter()
            .zip(fallbacks)
            .map(|(joined, (host, task))| match joined {
                Ok(run) => run,
                Err(e) => {
                    warn!("[{}] task aborted: {}", host.id, e);
                    failed(host, task, 0, None, format!("task aborted: {}", e))
                }
            })
            .collect()
    }
}

/// Fold settled host runs into a summary
pub fn summarize(mode: RunMode, runs: Vec<HostRun>, cancel: &CancellationToken) -> RunSummary {
    let mut builder = SummaryBuilder::new(generate_uuid(), mode);
    if cancel.is_cancelled() {
        builder.cancelled();
    }
    builder.finish(runs.into_iter().map(|r| r.task).collect())
}

/// Write each settled host's reachability to the registry. Hosts the
/// registry does not know are left alone.
pub fn record_reachability(registry: &TopologyRegistry, runs: &[HostRun]) {
    for run in runs {
        let Some(reachable) = run.reachable() else {
            continue;
        };
        if registry.get(&run.host.id).is_none() {
            debug!("[{}] not in topology, reachability not recorded", run.host.id);
            continue;
        }
        if let Err(e) = registry.set_reachable(&run.host.id, reachable) {
            warn!("{}", e);
        }
    }
}

async fn run_host(
    executor: &RemoteExecutor,
    options: &FanoutOptions,
    host: Host,
    mut task: DeploymentTask,
    steps: &[Step],
    cancel: &CancellationToken,
) -> HostRun {
    debug!("[{}] starting {}", host.id, task.action);
    let mut attempts = 0;

    for step in steps {
        let label = format!("[{}] {}", host.id, step.command);
        let (result, used) = retry_unreachable(&options.retry, &label, cancel, || {
            executor.execute(&host, &step.command, options.command_timeout)
        })
        .await;
        attempts = attempts.max(used);

        match result {
            Ok(_) => {}
            Err(ExecError::NonZeroExit { code, .. }) if step.tolerate_failure => {
                debug!("[{}] ignoring exit {} from {}", host.id, code, step.command);
            }
            Err(e) => {
                warn!("[{}] {} failed: {}", host.id, task.action, e);
                let reason = e.to_string();
                return failed(host, task, attempts, Some(e), reason);
            }
        }
    }

    task.attempt = attempts;
    complete(&mut task, TaskOutcome::Success);
    info!("[{}] {} succeeded", host.id, task.action);
    HostRun {
        host,
        task,
        error: None,
    }
}

fn complete(task: &mut DeploymentTask, outcome: TaskOutcome) {
    // Tasks are created pending and completed here exactly once
    if let Err(e) = task.complete(outcome) {
        warn!("{}", e);
    }
}

fn skipped(host: Host, mut task: DeploymentTask, reason: &str) -> HostRun {
    complete(&mut task, TaskOutcome::Skipped(reason.to_string()));
    HostRun {
        host,
        task,
        error: None,
    }
}

fn failed(
    host: Host,
    mut task: DeploymentTask,
    attempts: u32,
    error: Option<ExecError>,
    reason: String,
) -> HostRun {
    task.attempt = attempts;
    complete(&mut task, TaskOutcome::Failed(reason));
    HostRun { host, task, error }
}
