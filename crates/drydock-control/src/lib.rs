//! Drydock control
//!
//! This crate decides how to converge a running cluster towards a declared
//! membership, and hands the decision to provisioning collaborators.
//!
//! # Architecture
//!
//! A reconciliation pass is built from small, independently testable parts:
//!
//! - **Cluster model** ([`cluster`]): immutable role-partitioned membership
//! - **Observer** ([`observer`]): reads current membership from the cluster API
//! - **Diff** ([`diff`]): per-role join and leave sets
//! - **Classifier** ([`image`]): app installer or cluster image, from metadata
//! - **Engine** ([`reconcile`]): combines the above into one action
//! - **Dispatch** ([`dispatch`]): forwards that action to a provisioner
//!
//! Scale-down is never applied: any requested removal rejects the pass and the
//! error lists every address that would have left.
//!
//! # Example
//!
//! ```ignore
//! use drydock_control::{ApplyOptions, ControlConfig, Reconciler};
//!
//! let config = ControlConfig::load()?;
//! let reconciler = Reconciler::from_config(&config)?;
//! let action = reconciler
//!     .reconcile(&desired, &image, &ApplyOptions::default())
//!     .await?;
//! println!("{action}");
//! ```

#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

pub mod cluster;
pub mod config;
pub mod diff;
pub mod dispatch;
pub mod error;
pub mod image;
pub mod observer;
pub mod reconcile;
pub mod types;

// Re-export commonly used types at the crate root
pub use cluster::{ClusterState, HostGroup, Role};
pub use config::ControlConfig;
pub use diff::{diff, AddressDiff, ClusterDiff};
pub use dispatch::{AppInstaller, Dispatcher, InfraProvisioner, MockProvisioner};
pub use error::{ControlError, ControlResult};
pub use image::{classify, ImageExtension, ImageIntent, ImageKind, ImageMetadataService, ImageRef};
pub use observer::{ClusterApi, NodeInfo, StateObserver};
pub use reconcile::Reconciler;
pub use types::{ApplyMode, ApplyOptions, ReconciliationAction, ScaleDownRejection};
