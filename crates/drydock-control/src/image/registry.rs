//! Registry-backed image metadata.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::config::RegistryConfig;
use crate::error::{ControlError, ControlResult};

use super::{ImageExtension, ImageMetadataService, ImageRef};

/// Manifest annotation holding the image extension document.
pub const EXTENSION_ANNOTATION: &str = "drydock.image.extension";

const MANIFEST_MEDIA_TYPES: &str = "application/vnd.oci.image.manifest.v1+json, \
     application/vnd.oci.image.index.v1+json, \
     application/vnd.docker.distribution.manifest.v2+json, \
     application/vnd.docker.distribution.manifest.list.v2+json";

#[derive(Deserialize)]
struct RawManifest {
    #[serde(default)]
    annotations: HashMap<String, String>,
}

/// Reads image extensions from OCI distribution manifests.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    client: Client,
    insecure_registries: Vec<String>,
    credentials: Option<(String, String)>,
}

impl RegistryClient {
    /// Create a registry client from configuration.
    pub fn new(config: &RegistryConfig) -> ControlResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(ControlError::Http)?;

        let credentials = match (&config.username, &config.password) {
            (Some(username), Some(password)) => Some((username.clone(), password.clone())),
            _ => None,
        };

        Ok(Self {
            client,
            insecure_registries: config.insecure_registries.clone(),
            credentials,
        })
    }

    fn manifest_url(&self, image: &ImageRef) -> String {
        let scheme = if self
            .insecure_registries
            .iter()
            .any(|r| r == image.registry())
        {
            "http"
        } else {
            "https"
        };

        format!(
            "{scheme}://{}/v2/{}/manifests/{}",
            image.registry_endpoint(),
            image.repository(),
            image.manifest_reference()
        )
    }
}

#[async_trait]
impl ImageMetadataService for RegistryClient {
    async fn get_extension(&self, image: &ImageRef) -> ControlResult<ImageExtension> {
        let url = self.manifest_url(image);
        debug!(image = %image, url = %url, "fetching image manifest");

        let mut request = self.client.get(&url).header(ACCEPT, MANIFEST_MEDIA_TYPES);
        if let Some((username, password)) = &self.credentials {
            request = request.basic_auth(username, Some(password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ControlError::image_metadata(image, format!("registry unreachable: {e}")))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(ControlError::image_metadata(image, "image not found"));
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ControlError::image_metadata(
                    image,
                    format!("registry denied access: {}", response.status()),
                ));
            }
            status => {
                return Err(ControlError::image_metadata(
                    image,
                    format!("registry returned {status}"),
                ));
            }
        }

        let manifest: RawManifest = response
            .json()
            .await
            .map_err(|e| ControlError::image_metadata(image, format!("malformed manifest: {e}")))?;

        let document = manifest.annotations.get(EXTENSION_ANNOTATION).ok_or_else(|| {
            ControlError::image_metadata(
                image,
                format!("manifest has no {EXTENSION_ANNOTATION} annotation"),
            )
        })?;

        serde_json::from_str(document).map_err(|e| {
            ControlError::image_metadata(image, format!("malformed image extension: {e}"))
        })
    }
}
