//! Reconciliation outcomes and per-pass options.

use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::cluster::ClusterState;
use crate::image::ImageRef;

/// How the provisioner should treat a create or scale-up request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyMode {
    /// Converge the cluster.
    #[default]
    Apply,
    /// Only load the image's payload into the target registry.
    LoadImage,
}

impl ApplyMode {
    /// Get the mode name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Apply => "apply",
            Self::LoadImage => "load_image",
        }
    }
}

impl fmt::Display for ApplyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ApplyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "apply" => Ok(Self::Apply),
            "load_image" | "loadImage" | "load-image" => Ok(Self::LoadImage),
            _ => Err(format!("unknown apply mode: {s}")),
        }
    }
}

/// Options for a single reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApplyOptions {
    /// Forwarded to the provisioner.
    #[serde(default)]
    pub mode: ApplyMode,
    /// Overrides the launch arguments baked into an app installer image.
    #[serde(default)]
    pub app_args: Vec<String>,
}

/// Addresses a desired state would remove. Carried by a rejected pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScaleDownRejection {
    /// Control-plane addresses that would leave.
    pub control_plane: BTreeSet<IpAddr>,
    /// Worker addresses that would leave.
    pub worker: BTreeSet<IpAddr>,
}

impl ScaleDownRejection {
    /// Every address that would leave, across both roles.
    pub fn all_addresses(&self) -> impl Iterator<Item = &IpAddr> {
        self.control_plane.iter().chain(self.worker.iter())
    }
}

impl fmt::Display for ScaleDownRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "control-plane {:?}, worker {:?}",
            self.control_plane, self.worker
        )
    }
}

/// The single action decided by a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReconciliationAction {
    /// No cluster is reachable: bootstrap one from the desired state.
    Create {
        /// Cluster image to bootstrap with.
        image: ImageRef,
        /// Membership to create.
        desired: ClusterState,
    },
    /// Install an application image onto the existing cluster.
    InstallApp {
        /// Application image.
        image: ImageRef,
        /// Arguments passed to the installer.
        app_args: Vec<String>,
    },
    /// Join new hosts to the existing cluster.
    ScaleUp {
        /// Cluster image the new hosts run.
        image: ImageRef,
        /// Hosts joining the control plane.
        control_plane_joins: BTreeSet<IpAddr>,
        /// Hosts joining as workers.
        worker_joins: BTreeSet<IpAddr>,
    },
    /// The cluster already matches the desired state.
    Noop,
    /// The desired state asks for an unsupported removal.
    Rejected(ScaleDownRejection),
}

impl ReconciliationAction {
    /// Get the action name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::InstallApp { .. } => "install_app",
            Self::ScaleUp { .. } => "scale_up",
            Self::Noop => "noop",
            Self::Rejected(_) => "rejected",
        }
    }

    /// Returns true if the action needs a dispatcher.
    #[must_use]
    pub const fn is_dispatchable(&self) -> bool {
        !matches!(self, Self::Noop | Self::Rejected(_))
    }
}

impl fmt::Display for ReconciliationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create { image, desired } => write!(
                f,
                "create cluster with image {image} ({} control-plane, {} worker)",
                desired.control_plane().len(),
                desired.workers().len()
            ),
            Self::InstallApp { image, app_args } => {
                write!(f, "install application {image}")?;
                if !app_args.is_empty() {
                    write!(f, " with args {app_args:?}")?;
                }
                Ok(())
            }
            Self::ScaleUp {
                image,
                control_plane_joins,
                worker_joins,
            } => write!(
                f,
                "scale up cluster with image {image}: control-plane {control_plane_joins:?}, worker {worker_joins:?}"
            ),
            Self::Noop => write!(f, "cluster already converged"),
            Self::Rejected(rejection) => write!(f, "scale down not supported: {rejection}"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn apply_mode_parsing() {
        assert_eq!("apply".parse::<ApplyMode>().unwrap(), ApplyMode::Apply);
        assert_eq!("loadImage".parse::<ApplyMode>().unwrap(), ApplyMode::LoadImage);
        assert_eq!("load_image".parse::<ApplyMode>().unwrap(), ApplyMode::LoadImage);
        assert!("delete".parse::<ApplyMode>().is_err());
    }

    #[test]
    fn rejection_lists_both_roles() {
        let rejection = ScaleDownRejection {
            control_plane: BTreeSet::from(["10.0.0.2".parse().unwrap()]),
            worker: BTreeSet::from(["10.0.1.7".parse().unwrap()]),
        };
        let message = rejection.to_string();
        assert!(message.contains("10.0.0.2"));
        assert!(message.contains("10.0.1.7"));
        assert_eq!(rejection.all_addresses().count(), 2);
    }

    #[test]
    fn only_effectful_actions_dispatch() {
        assert!(!ReconciliationAction::Noop.is_dispatchable());
        assert!(!ReconciliationAction::Rejected(ScaleDownRejection::default()).is_dispatchable());
        let install = ReconciliationAction::InstallApp {
            image: "registry.local/app:v1".parse().unwrap(),
            app_args: vec![],
        };
        assert!(install.is_dispatchable());
        assert_eq!(install.as_str(), "install_app");
    }
}
