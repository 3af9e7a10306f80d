//! Image reference parsing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ControlError, ControlResult};

/// Registry assumed when a reference names none.
pub const DEFAULT_REGISTRY: &str = "docker.io";

const DOCKER_HUB_ENDPOINT: &str = "registry-1.docker.io";
const DEFAULT_TAG: &str = "latest";

/// A parsed `[registry/]repository[:tag|@digest]` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageRef {
    registry: String,
    repository: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageRef {
    /// Parse a reference, filling in `default_registry` when none is named.
    pub fn parse_with_default(reference: &str, default_registry: &str) -> ControlResult<Self> {
        let invalid = |reason| ControlError::InvalidImageReference {
            reference: reference.to_owned(),
            reason,
        };

        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(invalid("reference is empty"));
        }

        let (name, digest) = match trimmed.split_once('@') {
            Some((name, digest)) => {
                if !digest.contains(':') {
                    return Err(invalid("digest must be algorithm:hex"));
                }
                (name, Some(digest.to_owned()))
            }
            None => (trimmed, None),
        };

        let (registry, remainder) = match name.split_once('/') {
            Some((first, rest)) if looks_like_registry(first) => (first.to_owned(), rest),
            _ => (default_registry.to_owned(), name),
        };

        let (path, tag) = match remainder.rsplit_once(':') {
            Some((path, tag)) if !tag.contains('/') => {
                if tag.is_empty() {
                    return Err(invalid("tag is empty"));
                }
                (path, Some(tag.to_owned()))
            }
            _ => (remainder, None),
        };

        if path.is_empty() || path.split('/').any(str::is_empty) {
            return Err(invalid("repository has an empty path segment"));
        }
        if path.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(invalid("repository must be lowercase"));
        }

        let repository = if registry == DEFAULT_REGISTRY && !path.contains('/') {
            format!("library/{path}")
        } else {
            path.to_owned()
        };

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Registry host (and port) as written in the reference.
    #[must_use]
    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// Host to contact for the registry API.
    #[must_use]
    pub fn registry_endpoint(&self) -> &str {
        if self.registry == DEFAULT_REGISTRY {
            DOCKER_HUB_ENDPOINT
        } else {
            &self.registry
        }
    }

    /// Repository path within the registry.
    #[must_use]
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Tag, if one was given.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Digest, if one was given.
    #[must_use]
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Manifest reference: the digest if pinned, else the tag, else `latest`.
    #[must_use]
    pub fn manifest_reference(&self) -> &str {
        self.digest
            .as_deref()
            .or(self.tag.as_deref())
            .unwrap_or(DEFAULT_TAG)
    }
}

fn looks_like_registry(segment: &str) -> bool {
    segment.contains('.') || segment.contains(':') || segment == "localhost"
}

impl FromStr for ImageRef {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_with_default(s, DEFAULT_REGISTRY)
    }
}

impl TryFrom<String> for ImageRef {
    type Error = ControlError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ImageRef> for String {
    fn from(image: ImageRef) -> Self {
        image.to_string()
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}
