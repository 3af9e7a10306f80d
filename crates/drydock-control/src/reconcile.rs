//! The reconciliation decision engine.
//!
//! One pass decides exactly one [`ReconciliationAction`]:
//!
//! ```text
//! classify image ──▶ app installer ───────────────▶ InstallApp
//!       │
//!       ▼
//! probe cluster ──▶ unreachable ──────────────────▶ Create
//!       │
//!       ▼
//! observe + diff ──▶ nothing changes ─────────────▶ Noop
//!                ──▶ any role loses a member ─────▶ Rejected
//!                ──▶ otherwise ───────────────────▶ ScaleUp
//! ```
//!
//! The classifier call and the probe are independent reads and run
//! concurrently. An app installer does not wait for the probe. The node
//! listing only happens on the cluster image path.
//! Errors abort the pass before anything is dispatched; nothing is retried.

use std::sync::Arc;

use tracing::{info, warn};

use crate::cluster::ClusterState;
use crate::config::ControlConfig;
use crate::diff::ClusterDiff;
use crate::dispatch::Dispatcher;
use crate::error::{ControlError, ControlResult};
use crate::image::{classify, ImageMetadataService, ImageRef, RegistryClient};
use crate::observer::{ClusterApi, KubeClient, StateObserver};
use crate::types::{ApplyOptions, ReconciliationAction, ScaleDownRejection};

/// Decides and applies the action converging a cluster.
pub struct Reconciler {
    cluster: Arc<dyn ClusterApi>,
    images: Arc<dyn ImageMetadataService>,
    observer: StateObserver,
    dispatcher: Dispatcher,
}

impl Reconciler {
    /// Create a reconciler over the given collaborators.
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        images: Arc<dyn ImageMetadataService>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            cluster,
            images,
            observer: StateObserver::default(),
            dispatcher,
        }
    }

    /// Create a reconciler wired to the collaborators named in `config`.
    pub fn from_config(config: &ControlConfig) -> ControlResult<Self> {
        let cluster = Arc::new(KubeClient::new(&config.cluster)?);
        let images = Arc::new(RegistryClient::new(&config.registry)?);
        let dispatcher = Dispatcher::from_config(&config.provisioner)?;

        Ok(Self::new(cluster, images, dispatcher).with_observer(StateObserver::new(
            config.cluster.control_plane_labels.clone(),
        )))
    }

    /// Replace the observer used to read current membership.
    #[must_use]
    pub fn with_observer(mut self, observer: StateObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Decide the action for one pass without dispatching it.
    pub async fn decide(
        &self,
        desired: &ClusterState,
        image: &ImageRef,
        options: &ApplyOptions,
    ) -> ControlResult<ReconciliationAction> {
        let classification = classify(self.images.as_ref(), image);
        let existence = self.cluster.probe();
        tokio::pin!(classification, existence);

        let mut probe = None;
        let intent = loop {
            tokio::select! {
                intent = &mut classification => break intent?,
                result = &mut existence, if probe.is_none() => probe = Some(result),
            }
        };

        if intent.is_app_installer() {
            let app_args = if options.app_args.is_empty() {
                intent.launch
            } else {
                options.app_args.clone()
            };
            return Ok(ReconciliationAction::InstallApp {
                image: image.clone(),
                app_args,
            });
        }

        let probe = match probe {
            Some(result) => result,
            None => existence.await,
        };

        if let Err(e) = probe {
            warn!(
                error = %e,
                "cluster API not reachable, treating this as a new cluster"
            );
            return Ok(ReconciliationAction::Create {
                image: image.clone(),
                desired: desired.clone(),
            });
        }

        let current = self.observer.observe(self.cluster.as_ref()).await?;
        Ok(membership_action(image, &current, desired))
    }

    /// Run one reconciliation pass: decide, then dispatch.
    ///
    /// Returns the dispatched action, or [`ReconciliationAction::Noop`] when
    /// the cluster already converged. A scale-down request fails with
    /// [`ControlError::UnsupportedOperation`] and dispatches nothing.
    pub async fn reconcile(
        &self,
        desired: &ClusterState,
        image: &ImageRef,
        options: &ApplyOptions,
    ) -> ControlResult<ReconciliationAction> {
        let action = self.decide(desired, image, options).await?;

        match &action {
            ReconciliationAction::Noop => {
                info!(image = %image, "cluster already converged");
            }
            ReconciliationAction::Rejected(rejection) => {
                return Err(ControlError::UnsupportedOperation(rejection.clone()));
            }
            _ => self.dispatcher.dispatch(&action, options.mode).await?,
        }

        Ok(action)
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("observer", &self.observer)
            .finish_non_exhaustive()
    }
}

/// Decide the membership action for a reachable cluster.
///
/// Any removal in either role rejects the whole pass, even when the other
/// role only has joins.
#[must_use]
pub fn membership_action(
    image: &ImageRef,
    current: &ClusterState,
    desired: &ClusterState,
) -> ReconciliationAction {
    let diff = ClusterDiff::between(current, desired);

    if diff.is_empty() {
        return ReconciliationAction::Noop;
    }

    if diff.has_removals() {
        return ReconciliationAction::Rejected(ScaleDownRejection {
            control_plane: diff.control_plane.left,
            worker: diff.worker.left,
        });
    }

    ReconciliationAction::ScaleUp {
        image: image.clone(),
        control_plane_joins: diff.control_plane.joined,
        worker_joins: diff.worker.joined,
    }
}
