//! Cluster flavors and network plugins
//!
//! Each flavor knows how to bring up a control plane, where its join secret
//! comes from, and how a worker joins with it. k3s and kubeadm accept a
//! bootstrap token minted by labctl and registered on the control plane;
//! a swarm manager prints its own token as the last stdout line of init.
//! Host addresses are handed to `sh -c` as positional parameters, never
//! spliced into the script, and join secrets travel on stdin so they never
//! show up in a process listing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::authn::secret::is_bootstrap_token;
use crate::errors::OrchError;
use crate::models::credential::{Credential, CredentialKind};
use crate::models::host::Host;
use crate::remote::command::Command;
use crate::storage::settings::ClusterSettings;

const K3S_INIT_SCRIPT: &str = "curl -sfL https://get.k3s.io | sh -s - server \"$@\"";

const K3S_REGISTER_SCRIPT: &str =
    "read -r token && k3s token create --ttl 24h \"$token\" >/dev/null";

const K3S_JOIN_SCRIPT: &str = "read -r K3S_TOKEN && export K3S_TOKEN \
     && curl -sfL https://get.k3s.io | K3S_URL=\"$1\" sh -s - agent";

const KUBEADM_INIT_SCRIPT: &str =
    "kubeadm init --pod-network-cidr=\"$1\" --apiserver-advertise-address=\"$2\"";

const KUBEADM_REGISTER_SCRIPT: &str =
    "read -r token && kubeadm token create --ttl 24h \"$token\" >/dev/null";

const KUBEADM_JOIN_SCRIPT: &str = "read -r token && endpoint=\"$1\" && shift \
     && kubeadm join \"$endpoint\" --token \"$token\" \"$@\"";

const SWARM_INIT_SCRIPT: &str =
    "docker swarm init --advertise-addr \"$1\" >&2 && docker swarm join-token -q worker";

const SWARM_JOIN_SCRIPT: &str = "read -r token && docker swarm join --token \"$token\" \"$1\"";

const KUBEADM_ADMIN_CONF: &str = "/etc/kubernetes/admin.conf";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterFlavor {
    K3s,
    Kubeadm,
    Swarm,
}

impl ClusterFlavor {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterFlavor::K3s => "k3s",
            ClusterFlavor::Kubeadm => "kubeadm",
            ClusterFlavor::Swarm => "swarm",
        }
    }

    /// Credential the control plane issues for workers
    pub fn credential_kind(&self) -> CredentialKind {
        match self {
            ClusterFlavor::K3s | ClusterFlavor::Kubeadm => CredentialKind::ClusterJoin,
            ClusterFlavor::Swarm => CredentialKind::SwarmWorker,
        }
    }

    /// Whether labctl mints the join secret itself. Otherwise the control
    /// plane prints it during init.
    pub fn issues_locally(&self) -> bool {
        match self {
            ClusterFlavor::K3s | ClusterFlavor::Kubeadm => true,
            ClusterFlavor::Swarm => false,
        }
    }

    /// Bring up the control plane
    pub fn init_command(&self, control: &Host, network: &NetworkSelection) -> Command {
        match self {
            ClusterFlavor::K3s => {
                let mut command = Command::new("sh").args([
                    "-c",
                    K3S_INIT_SCRIPT,
                    "sh",
                    "--tls-san",
                    control.address.as_str(),
                ]);
                // k3s ships flannel; any other plugin replaces it
                if let NetworkSelection::Plugin(plugin) = network {
                    if *plugin != NetworkPlugin::Flannel {
                        command =
                            command.args(["--flannel-backend=none", "--disable-network-policy"]);
                    }
                }
                command
            }
            ClusterFlavor::Kubeadm => {
                let cidr = match network {
                    NetworkSelection::Plugin(plugin) => plugin.pod_cidr(),
                    _ => NetworkPlugin::Flannel.pod_cidr(),
                };
                Command::new("sh").args([
                    "-c",
                    KUBEADM_INIT_SCRIPT,
                    "sh",
                    cidr,
                    control.address.as_str(),
                ])
            }
            ClusterFlavor::Swarm => Command::new("sh").args([
                "-c",
                SWARM_INIT_SCRIPT,
                "sh",
                control.address.as_str(),
            ]),
        }
    }

    /// Make the control plane accept a locally issued credential.
    /// `None` for flavors whose control plane mints its own.
    pub fn register_command(&self, credential: &Credential) -> Option<Command> {
        let script = match self {
            ClusterFlavor::K3s => K3S_REGISTER_SCRIPT,
            ClusterFlavor::Kubeadm => KUBEADM_REGISTER_SCRIPT,
            ClusterFlavor::Swarm => return None,
        };
        Some(
            Command::new("sh")
                .args(["-c", script])
                .secret_stdin(credential.expose()),
        )
    }

    /// Whether `line` looks like a secret this flavor's join accepts
    pub fn accepts_secret(&self, line: &str) -> bool {
        match self {
            ClusterFlavor::Kubeadm => is_bootstrap_token(line),
            ClusterFlavor::K3s | ClusterFlavor::Swarm => {
                !line.is_empty() && !line.chars().any(char::is_whitespace)
            }
        }
    }

    /// Join a worker to the control plane. The secret goes over stdin.
    pub fn join_command(
        &self,
        control: &Host,
        credential: &Credential,
        cluster: &ClusterSettings,
    ) -> Command {
        let command = match self {
            ClusterFlavor::K3s => Command::new("sh").args([
                "-c".to_string(),
                K3S_JOIN_SCRIPT.to_string(),
                "sh".to_string(),
                format!("https://{}:6443", control.address),
            ]),
            ClusterFlavor::Kubeadm => {
                let command = Command::new("sh").args([
                    "-c".to_string(),
                    KUBEADM_JOIN_SCRIPT.to_string(),
                    "sh".to_string(),
                    format!("{}:6443", control.address),
                ]);
                match &cluster.discovery_ca_cert_hash {
                    Some(hash) => command.args(["--discovery-token-ca-cert-hash", hash.as_str()]),
                    None => command.arg("--discovery-token-unsafe-skip-ca-verification"),
                }
            }
            ClusterFlavor::Swarm => Command::new("sh").args([
                "-c".to_string(),
                SWARM_JOIN_SCRIPT.to_string(),
                "sh".to_string(),
                format!("{}:2377", control.address),
            ]),
        };
        command.secret_stdin(credential.expose())
    }

    /// How the selected network plugin is brought up on this flavor
    pub fn network_step(&self, network: &NetworkSelection) -> NetworkStep {
        match (self, network) {
            (ClusterFlavor::Swarm, NetworkSelection::Unspecified) => NetworkStep::NotNeeded,
            (ClusterFlavor::Swarm, _) => NetworkStep::NotApplicable,
            (_, NetworkSelection::Unspecified) => NetworkStep::Unselected,
            (_, NetworkSelection::Unsupported(name)) => NetworkStep::Unsupported(name.clone()),
            (ClusterFlavor::K3s, NetworkSelection::Plugin(NetworkPlugin::Flannel)) => {
                NetworkStep::BuiltIn
            }
            (ClusterFlavor::K3s, NetworkSelection::Plugin(plugin)) => {
                NetworkStep::Apply(plugin.install_command(Command::new("k3s").arg("kubectl")))
            }
            (ClusterFlavor::Kubeadm, NetworkSelection::Plugin(plugin)) => {
                let kubectl = Command::new("kubectl").args(["--kubeconfig", KUBEADM_ADMIN_CONF]);
                NetworkStep::Apply(plugin.install_command(kubectl))
            }
        }
    }
}

impl fmt::Display for ClusterFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClusterFlavor {
    type Err = OrchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "k3s" => Ok(ClusterFlavor::K3s),
            "kubeadm" | "k8s" | "kubernetes" => Ok(ClusterFlavor::Kubeadm),
            "swarm" | "docker-swarm" => Ok(ClusterFlavor::Swarm),
            _ => Err(OrchError::ValidationError(format!(
                "Unknown cluster flavor: {}",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkPlugin {
    Flannel,
    Calico,
    Cilium,
    Weave,
}

impl NetworkPlugin {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkPlugin::Flannel => "flannel",
            NetworkPlugin::Calico => "calico",
            NetworkPlugin::Cilium => "cilium",
            NetworkPlugin::Weave => "weave",
        }
    }

    /// Pod CIDR each plugin's stock manifest expects
    pub fn pod_cidr(&self) -> &'static str {
        match self {
            NetworkPlugin::Calico => "192.168.0.0/16",
            NetworkPlugin::Weave => "10.32.0.0/12",
            NetworkPlugin::Flannel | NetworkPlugin::Cilium => "10.244.0.0/16",
        }
    }

    fn install_command(&self, kubectl: Command) -> Command {
        match self {
            NetworkPlugin::Cilium => Command::new("cilium").args(["install", "--wait"]),
            _ => kubectl.args(["apply", "-f", self.manifest_url()]),
        }
    }

    fn manifest_url(&self) -> &'static str {
        match self {
            NetworkPlugin::Flannel => {
                "https://github.com/flannel-io/flannel/releases/latest/download/kube-flannel.yml"
            }
            NetworkPlugin::Calico => {
                "https://raw.githubusercontent.com/projectcalico/calico/v3.28.0/manifests/calico.yaml"
            }
            NetworkPlugin::Weave => {
                "https://github.com/weaveworks/weave/releases/download/v2.8.1/weave-daemonset-k8s.yaml"
            }
            NetworkPlugin::Cilium => "",
        }
    }
}

impl fmt::Display for NetworkPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The operator's network plugin choice, kept even when unsupported so the
/// run can warn about it instead of failing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkSelection {
    Unspecified,
    Plugin(NetworkPlugin),
    Unsupported(String),
}

impl NetworkSelection {
    pub fn parse(value: Option<&str>) -> Self {
        let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return NetworkSelection::Unspecified;
        };
        match value.to_lowercase().as_str() {
            "flannel" => NetworkSelection::Plugin(NetworkPlugin::Flannel),
            "calico" => NetworkSelection::Plugin(NetworkPlugin::Calico),
            "cilium" => NetworkSelection::Plugin(NetworkPlugin::Cilium),
            "weave" | "weave-net" => NetworkSelection::Plugin(NetworkPlugin::Weave),
            _ => NetworkSelection::Unsupported(value.to_string()),
        }
    }
}

#[derive(Clone)]
pub enum NetworkStep {
    /// Run this command on the control plane
    Apply(Command),
    /// The flavor ships the plugin
    BuiltIn,
    /// The flavor has its own overlay and needs nothing
    NotNeeded,
    /// A plugin was requested for a flavor that cannot use one
    NotApplicable,
    /// Kubernetes without any plugin selected
    Unselected,
    Unsupported(String),
}
