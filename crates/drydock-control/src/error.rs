//! Error types for drydock-control.

use crate::types::ScaleDownRejection;

/// Result type alias using [`ControlError`].
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors that can occur while reconciling a cluster.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// The cluster API could not be reached during an active observation.
    #[error("cluster connection error: {0}")]
    Connection(String),

    /// Image metadata could not be retrieved or was malformed.
    #[error("failed to get image extension for {image}: {reason}")]
    ImageMetadata {
        /// Image reference being classified.
        image: String,
        /// Why the metadata could not be used.
        reason: String,
    },

    /// The desired state asks for node removal, which is not supported.
    #[error("scale down not supported: {0}")]
    UnsupportedOperation(ScaleDownRejection),

    /// Infra provisioning failed.
    #[error("failed to provision {image}: {reason}")]
    Provision {
        /// Cluster image being provisioned.
        image: String,
        /// Failure reported by the provisioner.
        reason: String,
    },

    /// Application install failed.
    #[error("failed to install {image}: {reason}")]
    Install {
        /// Image being installed.
        image: String,
        /// Failure reported by the installer.
        reason: String,
    },

    /// A cluster description violated a membership invariant.
    #[error("invalid cluster state: {0}")]
    InvalidClusterState(String),

    /// An image reference could not be parsed.
    #[error("invalid image reference {reference:?}: {reason}")]
    InvalidImageReference {
        /// The raw reference.
        reference: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// A dispatcher was handed an action that carries nothing to dispatch.
    #[error("invalid dispatch: {0} actions cannot be dispatched")]
    InvalidDispatch(&'static str),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP client construction error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ControlError {
    /// Create a connection error.
    #[must_use]
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create an image metadata error.
    #[must_use]
    pub fn image_metadata(image: impl ToString, reason: impl Into<String>) -> Self {
        Self::ImageMetadata {
            image: image.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a provisioning error.
    #[must_use]
    pub fn provision(image: impl ToString, reason: impl Into<String>) -> Self {
        Self::Provision {
            image: image.to_string(),
            reason: reason.into(),
        }
    }

    /// Create an install error.
    #[must_use]
    pub fn install(image: impl ToString, reason: impl Into<String>) -> Self {
        Self::Install {
            image: image.to_string(),
            reason: reason.into(),
        }
    }

    /// Create an invalid cluster state error.
    #[must_use]
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidClusterState(msg.into())
    }

    /// Returns true if this error rejects a scale-down request.
    #[must_use]
    pub const fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnsupportedOperation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_error_names_image() {
        let err = ControlError::image_metadata("registry.local/k8s:v1", "manifest not found");
        assert_eq!(
            err.to_string(),
            "failed to get image extension for registry.local/k8s:v1: manifest not found"
        );
    }

    #[test]
    fn provision_error_names_image() {
        let err = ControlError::provision("registry.local/k8s:v1", "no capacity");
        assert_eq!(
            err.to_string(),
            "failed to provision registry.local/k8s:v1: no capacity"
        );
    }

    #[test]
    fn invalid_dispatch_message() {
        let err = ControlError::InvalidDispatch("noop");
        assert_eq!(
            err.to_string(),
            "invalid dispatch: noop actions cannot be dispatched"
        );
        assert!(!err.is_unsupported());
    }
}
