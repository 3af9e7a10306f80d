//! Typed cluster membership.
//!
//! A [`ClusterState`] is an immutable snapshot: a desired state comes from a
//! cluster description, a current state from [`StateObserver`]. Either way the
//! same invariants hold:
//!
//! - at most one [`HostGroup`] per [`Role`]
//! - no address belongs to more than one group
//!
//! [`StateObserver`]: crate::observer::StateObserver

use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::error::{ControlError, ControlResult};

static NO_ADDRESSES: BTreeSet<IpAddr> = BTreeSet::new();

/// Role a host plays in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Runs the Kubernetes control plane.
    #[serde(alias = "master")]
    ControlPlane,
    /// Runs workloads only.
    #[serde(alias = "node")]
    Worker,
}

impl Role {
    /// Every role, in reconciliation order.
    pub const ALL: [Self; 2] = [Self::ControlPlane, Self::Worker];

    /// Get the role name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ControlPlane => "control-plane",
            Self::Worker => "worker",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Membership of a single role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostGroup {
    role: Role,
    addresses: BTreeSet<IpAddr>,
}

impl HostGroup {
    /// Create a host group. Duplicate addresses collapse.
    pub fn new(role: Role, addresses: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            role,
            addresses: addresses.into_iter().collect(),
        }
    }

    /// The group's role.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// The group's addresses.
    #[must_use]
    pub const fn addresses(&self) -> &BTreeSet<IpAddr> {
        &self.addresses
    }

    /// Returns true if the group has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

/// Snapshot of cluster membership.
///
/// Equality compares the address set of each role. A role without a group is
/// equal to an empty group of that role, so group order and empty groups do
/// not affect comparison.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "RawClusterState")]
pub struct ClusterState {
    host_groups: Vec<HostGroup>,
}

#[derive(Deserialize)]
struct RawClusterState {
    host_groups: Vec<HostGroup>,
}

impl TryFrom<RawClusterState> for ClusterState {
    type Error = ControlError;

    fn try_from(raw: RawClusterState) -> ControlResult<Self> {
        Self::new(raw.host_groups)
    }
}

impl ClusterState {
    /// Create a cluster state from explicit host groups.
    ///
    /// Fails if a role appears twice or an address is claimed by more than
    /// one group.
    pub fn new(host_groups: Vec<HostGroup>) -> ControlResult<Self> {
        let mut seen_roles = BTreeSet::new();
        let mut seen_addresses = BTreeSet::new();

        for group in &host_groups {
            if !seen_roles.insert(group.role) {
                return Err(ControlError::invalid_state(format!(
                    "duplicate host group for role {}",
                    group.role
                )));
            }
            for address in &group.addresses {
                if !seen_addresses.insert(*address) {
                    return Err(ControlError::invalid_state(format!(
                        "address {address} is assigned to more than one role"
                    )));
                }
            }
        }

        Ok(Self { host_groups })
    }

    /// Build a state with exactly one control-plane and one worker group.
    ///
    /// An address present in both sets stays in the control plane only.
    #[must_use]
    pub fn from_roles(control_plane: BTreeSet<IpAddr>, mut worker: BTreeSet<IpAddr>) -> Self {
        worker.retain(|address| !control_plane.contains(address));
        Self {
            host_groups: vec![
                HostGroup {
                    role: Role::ControlPlane,
                    addresses: control_plane,
                },
                HostGroup {
                    role: Role::Worker,
                    addresses: worker,
                },
            ],
        }
    }

    /// The host groups, in construction order.
    #[must_use]
    pub fn host_groups(&self) -> &[HostGroup] {
        &self.host_groups
    }

    /// Get the host group for a role, if one was declared.
    #[must_use]
    pub fn group(&self, role: Role) -> Option<&HostGroup> {
        self.host_groups.iter().find(|g| g.role == role)
    }

    /// Addresses holding `role`. Empty if the role has no group.
    #[must_use]
    pub fn addresses_for_role(&self, role: Role) -> &BTreeSet<IpAddr> {
        self.group(role).map_or(&NO_ADDRESSES, HostGroup::addresses)
    }

    /// Control-plane addresses.
    #[must_use]
    pub fn control_plane(&self) -> &BTreeSet<IpAddr> {
        self.addresses_for_role(Role::ControlPlane)
    }

    /// Worker addresses.
    #[must_use]
    pub fn workers(&self) -> &BTreeSet<IpAddr> {
        self.addresses_for_role(Role::Worker)
    }

    /// Total number of hosts across all roles.
    #[must_use]
    pub fn host_count(&self) -> usize {
        self.host_groups.iter().map(|g| g.addresses.len()).sum()
    }

    /// Returns true if no role has any member.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.host_count() == 0
    }
}

impl PartialEq for ClusterState {
    fn eq(&self, other: &Self) -> bool {
        Role::ALL
            .iter()
            .all(|role| self.addresses_for_role(*role) == other.addresses_for_role(*role))
    }
}

impl Eq for ClusterState {}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn rejects_duplicate_roles() {
        let result = ClusterState::new(vec![
            HostGroup::new(Role::Worker, [ip("10.0.1.1")]),
            HostGroup::new(Role::Worker, [ip("10.0.1.2")]),
        ]);
        assert!(matches!(result, Err(ControlError::InvalidClusterState(_))));
    }

    #[test]
    fn rejects_address_in_two_roles() {
        let err = ClusterState::new(vec![
            HostGroup::new(Role::ControlPlane, [ip("10.0.0.1")]),
            HostGroup::new(Role::Worker, [ip("10.0.0.1")]),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("10.0.0.1"));
    }

    #[test]
    fn missing_role_reads_as_empty() {
        let state =
            ClusterState::new(vec![HostGroup::new(Role::ControlPlane, [ip("10.0.0.1")])]).unwrap();
        assert!(state.workers().is_empty());
        assert!(state.group(Role::Worker).is_none());
        assert_eq!(state.host_count(), 1);
    }

    #[test]
    fn equality_ignores_group_order_and_empty_groups() {
        let a = ClusterState::new(vec![
            HostGroup::new(Role::Worker, [ip("10.0.1.1")]),
            HostGroup::new(Role::ControlPlane, [ip("10.0.0.1")]),
        ])
        .unwrap();
        let b = ClusterState::from_roles(
            BTreeSet::from([ip("10.0.0.1")]),
            BTreeSet::from([ip("10.0.1.1")]),
        );
        assert_eq!(a, b);

        let empty_group = ClusterState::new(vec![HostGroup::new(Role::Worker, [])]).unwrap();
        assert_eq!(empty_group, ClusterState::default());
    }

    #[test]
    fn from_roles_keeps_shared_address_in_control_plane() {
        let state = ClusterState::from_roles(
            BTreeSet::from([ip("10.0.0.1")]),
            BTreeSet::from([ip("10.0.0.1"), ip("10.0.1.1")]),
        );
        assert_eq!(state.control_plane(), &BTreeSet::from([ip("10.0.0.1")]));
        assert_eq!(state.workers(), &BTreeSet::from([ip("10.0.1.1")]));
    }

    #[test]
    fn role_accepts_legacy_names() {
        let role: Role = serde_json::from_str(r#""master""#).unwrap();
        assert_eq!(role, Role::ControlPlane);
        let role: Role = serde_json::from_str(r#""node""#).unwrap();
        assert_eq!(role, Role::Worker);
        assert_eq!(serde_json::to_string(&Role::ControlPlane).unwrap(), r#""control_plane""#);
    }

    #[test]
    fn deserialize_validates_invariants() {
        let json = r#"{"host_groups":[
            {"role":"control_plane","addresses":["10.0.0.1"]},
            {"role":"worker","addresses":["10.0.0.1"]}
        ]}"#;
        assert!(serde_json::from_str::<ClusterState>(json).is_err());
    }
}
