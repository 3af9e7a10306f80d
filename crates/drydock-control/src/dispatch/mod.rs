//! Action dispatch to provisioning collaborators.
//!
//! Dispatchers carry no decision logic: each forwards the parameters of one
//! [`ReconciliationAction`] variant to the infra provisioner or the app
//! installer. Handing them a no-op or a rejection is a caller bug and fails
//! with [`ControlError::InvalidDispatch`].

mod command;

pub use command::CommandProvisioner;

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::cluster::ClusterState;
use crate::config::{ProvisionerConfig, ProvisionerType};
use crate::error::{ControlError, ControlResult};
use crate::image::ImageRef;
use crate::types::{ApplyMode, ReconciliationAction};

/// Request to bootstrap a new cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateRequest {
    /// Cluster image.
    pub image: ImageRef,
    /// Membership to create.
    pub desired: ClusterState,
    /// Apply mode.
    pub mode: ApplyMode,
}

/// Request to join hosts to an existing cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScaleUpRequest {
    /// Cluster image.
    pub image: ImageRef,
    /// Hosts joining the control plane.
    pub control_plane_joins: BTreeSet<IpAddr>,
    /// Hosts joining as workers.
    pub worker_joins: BTreeSet<IpAddr>,
    /// Apply mode.
    pub mode: ApplyMode,
}

/// Request to install an application image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallRequest {
    /// Application image.
    pub image: ImageRef,
    /// Installer arguments.
    pub args: Vec<String>,
}

/// Creates and grows clusters.
#[async_trait]
pub trait InfraProvisioner: Send + Sync {
    /// Bootstrap a cluster with the requested membership.
    async fn create_cluster(&self, request: &CreateRequest) -> ControlResult<()>;

    /// Join hosts to a running cluster.
    async fn scale_up(&self, request: &ScaleUpRequest) -> ControlResult<()>;
}

/// Installs application images onto a running cluster.
#[async_trait]
pub trait AppInstaller: Send + Sync {
    /// Install an application.
    async fn install(&self, request: &InstallRequest) -> ControlResult<()>;
}

/// Forwards decided actions to the provisioning collaborators.
#[derive(Clone)]
pub struct Dispatcher {
    infra: Arc<dyn InfraProvisioner>,
    installer: Arc<dyn AppInstaller>,
}

impl Dispatcher {
    /// Create a dispatcher.
    pub fn new(infra: Arc<dyn InfraProvisioner>, installer: Arc<dyn AppInstaller>) -> Self {
        Self { infra, installer }
    }

    /// Create a dispatcher from configuration.
    pub fn from_config(config: &ProvisionerConfig) -> ControlResult<Self> {
        match config.provisioner_type {
            ProvisionerType::Command => {
                let provisioner = Arc::new(CommandProvisioner::new(config));
                Ok(Self::new(provisioner.clone(), provisioner))
            }
            ProvisionerType::Mock => {
                let provisioner = Arc::new(MockProvisioner::default());
                Ok(Self::new(provisioner.clone(), provisioner))
            }
        }
    }

    /// Dispatch an action to its collaborator.
    pub async fn dispatch(&self, action: &ReconciliationAction, mode: ApplyMode) -> ControlResult<()> {
        match action {
            ReconciliationAction::Create { image, desired } => {
                self.create_cluster(image, desired, mode).await
            }
            ReconciliationAction::InstallApp { image, app_args } => {
                self.install_application(image, app_args).await
            }
            ReconciliationAction::ScaleUp {
                image,
                control_plane_joins,
                worker_joins,
            } => {
                self.scale_up_cluster(image, control_plane_joins, worker_joins, mode)
                    .await
            }
            ReconciliationAction::Noop | ReconciliationAction::Rejected(_) => {
                Err(ControlError::InvalidDispatch(action.as_str()))
            }
        }
    }

    /// Bootstrap a new cluster.
    pub async fn create_cluster(
        &self,
        image: &ImageRef,
        desired: &ClusterState,
        mode: ApplyMode,
    ) -> ControlResult<()> {
        info!(
            image = %image,
            control_plane = ?desired.control_plane(),
            workers = ?desired.workers(),
            mode = %mode,
            "start to create new cluster"
        );

        self.infra
            .create_cluster(&CreateRequest {
                image: image.clone(),
                desired: desired.clone(),
                mode,
            })
            .await
    }

    /// Join hosts to the running cluster.
    pub async fn scale_up_cluster(
        &self,
        image: &ImageRef,
        control_plane_joins: &BTreeSet<IpAddr>,
        worker_joins: &BTreeSet<IpAddr>,
        mode: ApplyMode,
    ) -> ControlResult<()> {
        info!(
            image = %image,
            control_plane_joins = ?control_plane_joins,
            worker_joins = ?worker_joins,
            mode = %mode,
            "start to scale up cluster"
        );

        self.infra
            .scale_up(&ScaleUpRequest {
                image: image.clone(),
                control_plane_joins: control_plane_joins.clone(),
                worker_joins: worker_joins.clone(),
                mode,
            })
            .await
    }

    /// Install an application image.
    pub async fn install_application(&self, image: &ImageRef, args: &[String]) -> ControlResult<()> {
        info!(image = %image, args = ?args, "start to install application");

        self.installer
            .install(&InstallRequest {
                image: image.clone(),
                args: args.to_vec(),
            })
            .await
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

/// A request received by [`MockProvisioner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionCall {
    /// `create_cluster` was called.
    Create(CreateRequest),
    /// `scale_up` was called.
    ScaleUp(ScaleUpRequest),
    /// `install` was called.
    Install(InstallRequest),
}

/// Mock provisioner for testing.
///
/// Records every request; optionally fails all of them.
#[derive(Debug, Default)]
pub struct MockProvisioner {
    calls: RwLock<Vec<ProvisionCall>>,
    failure: Option<String>,
}

impl MockProvisioner {
    /// A provisioner whose every call fails with `reason`.
    #[must_use]
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            calls: RwLock::default(),
            failure: Some(reason.into()),
        }
    }

    /// Requests received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<ProvisionCall> {
        self.calls.read().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: ProvisionCall) -> Result<(), String> {
        self.calls
            .write()
            .map_err(|_| "lock poisoned".to_owned())?
            .push(call);

        match &self.failure {
            Some(reason) => Err(reason.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl InfraProvisioner for MockProvisioner {
    async fn create_cluster(&self, request: &CreateRequest) -> ControlResult<()> {
        self.record(ProvisionCall::Create(request.clone()))
            .map_err(|reason| ControlError::provision(&request.image, reason))
    }

    async fn scale_up(&self, request: &ScaleUpRequest) -> ControlResult<()> {
        self.record(ProvisionCall::ScaleUp(request.clone()))
            .map_err(|reason| ControlError::provision(&request.image, reason))
    }
}

#[async_trait]
impl AppInstaller for MockProvisioner {
    async fn install(&self, request: &InstallRequest) -> ControlResult<()> {
        self.record(ProvisionCall::Install(request.clone()))
            .map_err(|reason| ControlError::install(&request.image, reason))
    }
}
