//! Membership set differences.

use std::collections::BTreeSet;
use std::net::IpAddr;

use serde::Serialize;

use crate::cluster::{ClusterState, Role};

/// Result of comparing current and desired addresses of one role.
///
/// `joined` and `left` are always disjoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AddressDiff {
    /// Desired but not present.
    pub joined: BTreeSet<IpAddr>,
    /// Present but no longer desired.
    pub left: BTreeSet<IpAddr>,
}

impl AddressDiff {
    /// Returns true if nothing joins and nothing leaves.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.left.is_empty()
    }
}

/// Compute which addresses join and which leave to go from `current` to
/// `desired`.
#[must_use]
pub fn diff(current: &BTreeSet<IpAddr>, desired: &BTreeSet<IpAddr>) -> AddressDiff {
    AddressDiff {
        joined: desired.difference(current).copied().collect(),
        left: current.difference(desired).copied().collect(),
    }
}

/// Per-role differences between two cluster states.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClusterDiff {
    /// Control-plane membership changes.
    pub control_plane: AddressDiff,
    /// Worker membership changes.
    pub worker: AddressDiff,
}

impl ClusterDiff {
    /// Diff every role of `current` against `desired`.
    #[must_use]
    pub fn between(current: &ClusterState, desired: &ClusterState) -> Self {
        Self {
            control_plane: diff(current.control_plane(), desired.control_plane()),
            worker: diff(current.workers(), desired.workers()),
        }
    }

    /// Get the diff for a role.
    #[must_use]
    pub const fn for_role(&self, role: Role) -> &AddressDiff {
        match role {
            Role::ControlPlane => &self.control_plane,
            Role::Worker => &self.worker,
        }
    }

    /// Returns true if no role changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.control_plane.is_empty() && self.worker.is_empty()
    }

    /// Returns true if any role loses a member.
    #[must_use]
    pub fn has_removals(&self) -> bool {
        !self.control_plane.left.is_empty() || !self.worker.left.is_empty()
    }
}
