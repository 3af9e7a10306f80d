//! Common test utilities for reconciliation integration tests.

pub mod fixtures;

use std::sync::Arc;

use drydock_control::dispatch::ProvisionCall;
use drydock_control::image::StaticImageMetadata;
use drydock_control::observer::StaticCluster;
use drydock_control::{Dispatcher, ImageExtension, ImageRef, MockProvisioner, NodeInfo, Reconciler};

pub const CLUSTER_IMAGE: &str = "registry.local/kubernetes:v1.22.15";
pub const APP_IMAGE: &str = "registry.local/apps/nginx:v1";

/// A reconciler wired to in-memory collaborators that record every call.
pub struct TestReconciler {
    pub cluster: Arc<StaticCluster>,
    pub images: Arc<StaticImageMetadata>,
    pub provisioner: Arc<MockProvisioner>,
    pub reconciler: Reconciler,
}

impl TestReconciler {
    /// Reconciler over a reachable cluster reporting `nodes`.
    pub fn reachable(nodes: Vec<NodeInfo>) -> Self {
        Self::with_cluster(StaticCluster::reachable(nodes), MockProvisioner::default())
    }

    /// Reconciler over a cluster whose API server does not answer.
    pub fn unreachable() -> Self {
        Self::with_cluster(StaticCluster::unreachable(), MockProvisioner::default())
    }

    /// Reconciler with explicit cluster and provisioner fakes.
    pub fn with_cluster(cluster: StaticCluster, provisioner: MockProvisioner) -> Self {
        let cluster = Arc::new(cluster);
        let images = Arc::new(
            StaticImageMetadata::new()
                .with_image(&cluster_image(), ImageExtension::cluster_image())
                .with_image(
                    &app_image(),
                    ImageExtension::app_installer(vec!["helm install nginx ./chart".to_owned()]),
                ),
        );
        let provisioner = Arc::new(provisioner);
        let dispatcher = Dispatcher::new(provisioner.clone(), provisioner.clone());
        let reconciler = Reconciler::new(cluster.clone(), images.clone(), dispatcher);

        Self {
            cluster,
            images,
            provisioner,
            reconciler,
        }
    }

    /// Requests the provisioner received.
    pub fn calls(&self) -> Vec<ProvisionCall> {
        self.provisioner.calls()
    }
}

pub fn cluster_image() -> ImageRef {
    CLUSTER_IMAGE.parse().unwrap()
}

pub fn app_image() -> ImageRef {
    APP_IMAGE.parse().unwrap()
}
