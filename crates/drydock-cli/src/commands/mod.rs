//! CLI command implementations.

pub mod apply;
pub mod description;
pub mod plan;

use std::path::Path;

use drydock_control::{ControlConfig, ControlError};
use thiserror::Error;

/// Errors shared by the cluster commands.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("you must input Clusterfile")]
    ClusterfileRequired,

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid Clusterfile: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid Clusterfile: {0}")]
    Description(String),

    #[error("failed to encode action: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Control(#[from] ControlError),
}

/// Load configuration from `path`, or from the default sources.
pub fn load_config(path: Option<&Path>) -> Result<ControlConfig, CommandError> {
    let config = match path {
        Some(path) => ControlConfig::from_file(path)?,
        None => ControlConfig::load()?,
    };
    Ok(config)
}
