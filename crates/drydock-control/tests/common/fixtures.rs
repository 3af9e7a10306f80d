//! Test fixtures for reconciliation integration tests.

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use drydock_control::observer::MASTER_ROLE_LABEL;
use drydock_control::{ClusterState, HostGroup, NodeInfo, Role};

/// Builder for creating test NodeInfo instances.
pub struct NodeBuilder {
    name: String,
    addresses: Vec<String>,
    labels: BTreeMap<String, String>,
}

impl NodeBuilder {
    /// Creates a new node builder with the given name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            addresses: vec![],
            labels: BTreeMap::new(),
        }
    }

    /// Adds a reported address.
    pub fn with_address(mut self, address: &str) -> Self {
        self.addresses.push(address.to_string());
        self
    }

    /// Marks the node as control plane.
    pub fn control_plane(self) -> Self {
        self.with_label(MASTER_ROLE_LABEL)
    }

    /// Adds a label with an empty value.
    pub fn with_label(mut self, label: &str) -> Self {
        self.labels.insert(label.to_string(), String::new());
        self
    }

    /// Builds the NodeInfo.
    pub fn build(self) -> NodeInfo {
        NodeInfo {
            name: self.name,
            addresses: self.addresses,
            labels: self.labels,
        }
    }
}

/// Nodes for a cluster with the given control-plane and worker addresses.
pub fn nodes(control_plane: &[&str], workers: &[&str]) -> Vec<NodeInfo> {
    let masters = control_plane.iter().enumerate().map(|(i, addr)| {
        NodeBuilder::new(&format!("master-{i}"))
            .with_address(addr)
            .control_plane()
            .build()
    });
    let nodes = workers.iter().enumerate().map(|(i, addr)| {
        NodeBuilder::new(&format!("worker-{i}"))
            .with_address(addr)
            .build()
    });
    masters.chain(nodes).collect()
}

/// Desired state declared as explicit host groups.
pub fn desired(control_plane: &[&str], workers: &[&str]) -> ClusterState {
    ClusterState::new(vec![
        HostGroup::new(Role::ControlPlane, control_plane.iter().map(|a| ip(a))),
        HostGroup::new(Role::Worker, workers.iter().map(|a| ip(a))),
    ])
    .unwrap()
}

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

pub fn set(addrs: &[&str]) -> BTreeSet<IpAddr> {
    addrs.iter().map(|a| ip(a)).collect()
}
