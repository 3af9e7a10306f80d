//! Clusterfile parsing.
//!
//! A Clusterfile is a TOML document naming the cluster image and its hosts:
//!
//! ```toml
//! name = "my-cluster"
//! image = "kubernetes:v1.22.15"
//!
//! [[hosts]]
//! roles = ["master"]
//! ips = ["192.168.0.2", "192.168.0.3"]
//!
//! [[hosts]]
//! roles = ["node"]
//! ips = ["192.168.0.4"]
//! ```

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::path::Path;

use drydock_control::{ClusterState, ImageRef, Role};
use serde::Deserialize;

use super::CommandError;

/// A host entry in a Clusterfile.
#[derive(Debug, Clone, Deserialize)]
pub struct HostSpec {
    /// Roles these hosts play.
    pub roles: Vec<Role>,
    /// Host addresses.
    pub ips: Vec<IpAddr>,
}

/// Desired cluster as written in a Clusterfile.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterDescription {
    /// Cluster name.
    #[serde(default)]
    pub name: String,
    /// Image reference, resolved against the default registry.
    pub image: String,
    /// Host entries.
    #[serde(default)]
    pub hosts: Vec<HostSpec>,
}

impl ClusterDescription {
    /// Read and parse a Clusterfile.
    pub fn load(path: &Path) -> Result<Self, CommandError> {
        if path.as_os_str().is_empty() {
            return Err(CommandError::ClusterfileRequired);
        }

        let content = std::fs::read_to_string(path).map_err(|source| CommandError::Read {
            path: path.display().to_string(),
            source,
        })?;

        Ok(toml::from_str(&content)?)
    }

    /// The desired membership.
    ///
    /// A host listed with both roles joins the control plane only. A
    /// Clusterfile without hosts yields an empty state, which app installer
    /// images never consult.
    pub fn desired_state(&self) -> Result<ClusterState, CommandError> {
        let mut control_plane = BTreeSet::new();
        let mut workers = BTreeSet::new();

        for host in &self.hosts {
            if host.roles.is_empty() {
                return Err(CommandError::Description(format!(
                    "hosts {:?} have no role",
                    host.ips
                )));
            }
            for role in &host.roles {
                let target = match role {
                    Role::ControlPlane => &mut control_plane,
                    Role::Worker => &mut workers,
                };
                target.extend(host.ips.iter().copied());
            }
        }

        Ok(ClusterState::from_roles(control_plane, workers))
    }

    /// The image reference, qualified with `default_registry` when it names none.
    pub fn image_ref(&self, default_registry: &str) -> Result<ImageRef, CommandError> {
        Ok(ImageRef::parse_with_default(&self.image, default_registry)?)
    }
}
