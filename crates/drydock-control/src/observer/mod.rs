//! Observation of a running cluster.
//!
//! The observer turns a node listing into a [`ClusterState`] with exactly two
//! host groups. Nodes that have not reported a usable address yet are skipped
//! rather than failing the observation: partially initialised nodes are normal
//! while a cluster is still bootstrapping.

mod kube;
pub mod kubeconfig;

pub use kube::KubeClient;
pub use kubeconfig::KubeEndpoint;

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::cluster::ClusterState;
use crate::error::{ControlError, ControlResult};

/// Label marking control-plane nodes on older clusters.
pub const MASTER_ROLE_LABEL: &str = "node-role.kubernetes.io/master";

/// Label marking control-plane nodes.
pub const CONTROL_PLANE_ROLE_LABEL: &str = "node-role.kubernetes.io/control-plane";

/// A node as reported by the cluster API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeInfo {
    /// Node name.
    pub name: String,
    /// Reported addresses, in the order the API lists them.
    pub addresses: Vec<String>,
    /// Node labels.
    pub labels: BTreeMap<String, String>,
}

/// Access to a cluster's API server.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Check that the API server answers.
    ///
    /// A failure here means no usable cluster exists behind this handle.
    async fn probe(&self) -> ControlResult<()>;

    /// List every node of the cluster.
    async fn list_nodes(&self) -> ControlResult<Vec<NodeInfo>>;
}

/// Builds [`ClusterState`] snapshots from node listings.
#[derive(Debug, Clone)]
pub struct StateObserver {
    control_plane_labels: Vec<String>,
}

impl Default for StateObserver {
    fn default() -> Self {
        Self::new(vec![
            MASTER_ROLE_LABEL.to_owned(),
            CONTROL_PLANE_ROLE_LABEL.to_owned(),
        ])
    }
}

impl StateObserver {
    /// Create an observer that treats nodes carrying any of `labels` as
    /// control plane.
    #[must_use]
    pub fn new(control_plane_labels: Vec<String>) -> Self {
        Self {
            control_plane_labels,
        }
    }

    /// Observe the current membership of a cluster.
    ///
    /// Fails with [`ControlError::Connection`] if the node listing fails.
    pub async fn observe(&self, api: &dyn ClusterApi) -> ControlResult<ClusterState> {
        let nodes = api.list_nodes().await?;
        Ok(self.materialize(&nodes))
    }

    /// Partition a node listing into control-plane and worker addresses.
    #[must_use]
    pub fn materialize(&self, nodes: &[NodeInfo]) -> ClusterState {
        let mut control_plane = BTreeSet::new();
        let mut workers = BTreeSet::new();

        for node in nodes {
            let Some(address) = node_address(node) else {
                continue;
            };

            if self.is_control_plane(node) {
                control_plane.insert(address);
            } else {
                workers.insert(address);
            }
        }

        ClusterState::from_roles(control_plane, workers)
    }

    fn is_control_plane(&self, node: &NodeInfo) -> bool {
        self.control_plane_labels
            .iter()
            .any(|label| node.labels.contains_key(label))
    }
}

fn node_address(node: &NodeInfo) -> Option<IpAddr> {
    let Some(raw) = node.addresses.first() else {
        debug!(node = %node.name, "skipping node without addresses");
        return None;
    };

    match raw.parse() {
        Ok(address) => Some(address),
        Err(_) => {
            warn!(node = %node.name, address = %raw, "skipping node with unparsable address");
            None
        }
    }
}

/// In-memory cluster API for tests and dry runs.
///
/// Counts calls so tests can assert which paths touched the cluster.
#[derive(Debug, Default)]
pub struct StaticCluster {
    nodes: Option<Vec<NodeInfo>>,
    list_failure: Option<String>,
    probes: AtomicUsize,
    listings: AtomicUsize,
}

impl StaticCluster {
    /// A cluster that answers with `nodes`.
    #[must_use]
    pub fn reachable(nodes: Vec<NodeInfo>) -> Self {
        Self {
            nodes: Some(nodes),
            ..Self::default()
        }
    }

    /// A cluster whose API server does not answer.
    #[must_use]
    pub fn unreachable() -> Self {
        Self::default()
    }

    /// A cluster that answers probes but fails node listings.
    #[must_use]
    pub fn failing_listing(reason: impl Into<String>) -> Self {
        Self {
            nodes: Some(Vec::new()),
            list_failure: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Number of probes served.
    #[must_use]
    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Number of node listings served.
    #[must_use]
    pub fn listings(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterApi for StaticCluster {
    async fn probe(&self) -> ControlResult<()> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.nodes.is_some() {
            Ok(())
        } else {
            Err(ControlError::connection("cluster API unreachable"))
        }
    }

    async fn list_nodes(&self) -> ControlResult<Vec<NodeInfo>> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = &self.list_failure {
            return Err(ControlError::connection(reason.clone()));
        }
        self.nodes
            .clone()
            .ok_or_else(|| ControlError::connection("cluster API unreachable"))
    }
}
