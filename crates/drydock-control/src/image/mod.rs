//! Image intent classification.
//!
//! Every image carries an extension document in its manifest annotations that
//! says what kind of image it is. An app installer image is installed onto an
//! existing cluster; anything else describes cluster membership and goes
//! through the diff path. This module reads that document and reduces it to
//! an [`ImageIntent`].

mod reference;
mod registry;

pub use reference::{ImageRef, DEFAULT_REGISTRY};
pub use registry::{RegistryClient, EXTENSION_ANNOTATION};

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ControlError, ControlResult};

/// What an image is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageKind {
    /// Installs an application onto an existing cluster.
    #[serde(rename = "app-installer")]
    AppInstaller,
    /// Describes and bootstraps cluster membership.
    #[serde(rename = "kube-installer", alias = "cluster-image")]
    ClusterImage,
}

/// Default launch configuration of an app installer image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppLaunch {
    /// Commands run by the installer when no arguments are supplied.
    #[serde(default)]
    pub cmds: Vec<String>,
}

/// Extension document attached to an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageExtension {
    /// Image kind.
    #[serde(rename = "type")]
    pub kind: ImageKind,
    /// Launch defaults, meaningful for app installers only.
    #[serde(default)]
    pub launch: AppLaunch,
}

impl ImageExtension {
    /// Extension of a plain cluster image.
    #[must_use]
    pub fn cluster_image() -> Self {
        Self {
            kind: ImageKind::ClusterImage,
            launch: AppLaunch::default(),
        }
    }

    /// Extension of an app installer image with default commands.
    #[must_use]
    pub fn app_installer(cmds: Vec<String>) -> Self {
        Self {
            kind: ImageKind::AppInstaller,
            launch: AppLaunch { cmds },
        }
    }
}

/// Classification of the target image for one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageIntent {
    /// Which action path the image selects.
    pub kind: ImageKind,
    /// Launch arguments baked into the image.
    pub launch: Vec<String>,
}

impl ImageIntent {
    /// Returns true if the image installs an application.
    #[must_use]
    pub fn is_app_installer(&self) -> bool {
        self.kind == ImageKind::AppInstaller
    }
}

impl From<ImageExtension> for ImageIntent {
    fn from(extension: ImageExtension) -> Self {
        Self {
            kind: extension.kind,
            launch: extension.launch.cmds,
        }
    }
}

/// Source of image extension metadata.
#[async_trait]
pub trait ImageMetadataService: Send + Sync {
    /// Fetch the extension document of an image.
    ///
    /// Fails with [`ControlError::ImageMetadata`] when the image does not
    /// exist, the registry is unreachable, or the document is malformed.
    async fn get_extension(&self, image: &ImageRef) -> ControlResult<ImageExtension>;
}

/// Classify an image by its extension metadata.
pub async fn classify(
    metadata: &dyn ImageMetadataService,
    image: &ImageRef,
) -> ControlResult<ImageIntent> {
    let extension = metadata.get_extension(image).await?;
    debug!(image = %image, kind = ?extension.kind, "classified image");
    Ok(extension.into())
}

/// In-memory image metadata for tests and offline planning.
#[derive(Debug, Default)]
pub struct StaticImageMetadata {
    extensions: RwLock<HashMap<String, ImageExtension>>,
    lookups: AtomicUsize,
}

impl StaticImageMetadata {
    /// Create an empty metadata source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the extension of an image.
    #[must_use]
    pub fn with_image(self, image: &ImageRef, extension: ImageExtension) -> Self {
        if let Ok(mut extensions) = self.extensions.write() {
            extensions.insert(image.to_string(), extension);
        }
        self
    }

    /// Number of lookups served so far.
    #[must_use]
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageMetadataService for StaticImageMetadata {
    async fn get_extension(&self, image: &ImageRef) -> ControlResult<ImageExtension> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        let extensions = self
            .extensions
            .read()
            .map_err(|_| ControlError::image_metadata(image, "lock poisoned"))?;

        extensions
            .get(&image.to_string())
            .cloned()
            .ok_or_else(|| ControlError::image_metadata(image, "image not found"))
    }
}
