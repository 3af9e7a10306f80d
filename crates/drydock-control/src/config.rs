//! Configuration for drydock-control.

use std::path::PathBuf;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

use crate::error::{ControlError, ControlResult};
use crate::image::DEFAULT_REGISTRY;
use crate::observer::{CONTROL_PLANE_ROLE_LABEL, MASTER_ROLE_LABEL};
use crate::types::ApplyOptions;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ControlConfig {
    /// Cluster API access.
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Image registry access.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Provisioning collaborator.
    #[serde(default)]
    pub provisioner: ProvisionerConfig,

    /// Defaults for each reconciliation pass.
    #[serde(default)]
    pub apply: ApplyOptions,
}

impl ControlConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `drydock.toml` in the current directory (if present)
    /// 3. Environment variables with `DRYDOCK_` prefix
    pub fn load() -> ControlResult<Self> {
        Self::from_figment(Figment::new().merge(Toml::file("drydock.toml")))
    }

    /// Load configuration from a specific TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> ControlResult<Self> {
        Self::from_figment(Figment::new().merge(Toml::file(path.as_ref())))
    }

    fn from_figment(figment: Figment) -> ControlResult<Self> {
        figment
            .merge(Env::prefixed("DRYDOCK_").split("__"))
            .extract()
            .map_err(|e| ControlError::Config(e.to_string()))
    }
}

/// Cluster API configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    /// API server URL. Without one, the cluster is located through a
    /// kubeconfig; with neither, every cluster is treated as new.
    #[serde(default)]
    pub api_url: Option<String>,

    /// Kubeconfig to read when `api_url` is unset. Must exist when set.
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,

    /// Look for `$KUBECONFIG` or `~/.kube/config` when neither `api_url`
    /// nor `kubeconfig` is set.
    #[serde(default = "default_kubeconfig_discovery")]
    pub kubeconfig_discovery: bool,

    /// Bearer token.
    #[serde(default)]
    pub token: Option<String>,

    /// File holding the bearer token, read when `token` is unset.
    #[serde(default)]
    pub token_file: Option<PathBuf>,

    /// Skip TLS certificate verification.
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,

    /// Request timeout in seconds.
    #[serde(default = "default_cluster_timeout_secs")]
    pub timeout_secs: u64,

    /// Labels that mark a node as control plane.
    #[serde(default = "default_control_plane_labels")]
    pub control_plane_labels: Vec<String>,
}

const fn default_kubeconfig_discovery() -> bool {
    true
}

const fn default_cluster_timeout_secs() -> u64 {
    10
}

fn default_control_plane_labels() -> Vec<String> {
    vec![
        MASTER_ROLE_LABEL.to_owned(),
        CONTROL_PLANE_ROLE_LABEL.to_owned(),
    ]
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            kubeconfig: None,
            kubeconfig_discovery: default_kubeconfig_discovery(),
            token: None,
            token_file: None,
            insecure_skip_tls_verify: false,
            timeout_secs: default_cluster_timeout_secs(),
            control_plane_labels: default_control_plane_labels(),
        }
    }
}

/// Image registry configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Registry assumed for references that name none.
    #[serde(default = "default_registry")]
    pub default_registry: String,

    /// Registries reached over plain HTTP.
    #[serde(default)]
    pub insecure_registries: Vec<String>,

    /// Basic auth username.
    #[serde(default)]
    pub username: Option<String>,

    /// Basic auth password.
    #[serde(default)]
    pub password: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_registry_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_registry() -> String {
    DEFAULT_REGISTRY.to_owned()
}

const fn default_registry_timeout_secs() -> u64 {
    30
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_registry: default_registry(),
            insecure_registries: Vec::new(),
            username: None,
            password: None,
            timeout_secs: default_registry_timeout_secs(),
        }
    }
}

/// Provisioning collaborator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionerConfig {
    /// Type of provisioner to use.
    #[serde(default)]
    pub provisioner_type: ProvisionerType,

    /// Program run by the command provisioner.
    #[serde(default = "default_program")]
    pub program: PathBuf,

    /// Arguments placed before the subcommand.
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_program() -> PathBuf {
    PathBuf::from("drydock-infra")
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            provisioner_type: ProvisionerType::default(),
            program: default_program(),
            args: Vec::new(),
        }
    }
}

/// Type of provisioner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionerType {
    /// Run an external program per action.
    #[default]
    Command,

    /// Record requests in memory.
    Mock,
}
