//! Provisioner that delegates to an external program.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::ProvisionerConfig;
use crate::error::{ControlError, ControlResult};

use super::{AppInstaller, CreateRequest, InfraProvisioner, InstallRequest, ScaleUpRequest};

/// Runs `<program> <args..> <subcommand>` with the JSON request on stdin.
///
/// Subcommands are `create`, `scale-up` and `install`. A non-zero exit fails
/// the action with the program's stderr.
#[derive(Debug, Clone)]
pub struct CommandProvisioner {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandProvisioner {
    /// Create a command provisioner from configuration.
    #[must_use]
    pub fn new(config: &ProvisionerConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
        }
    }

    async fn run(&self, subcommand: &str, payload: &impl Serialize) -> Result<(), String> {
        let input = serde_json::to_vec(payload).map_err(|e| format!("failed to encode request: {e}"))?;

        debug!(
            program = %self.program.display(),
            subcommand = %subcommand,
            "running provisioner"
        );

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(subcommand)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("failed to start {}: {e}", self.program.display()))?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(&input).await {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(format!("failed to write request: {e}"));
                }
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| format!("failed to wait for {}: {e}", self.program.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "{} {subcommand} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            ));
        }

        info!(subcommand = %subcommand, "provisioner finished");
        Ok(())
    }
}

#[async_trait]
impl InfraProvisioner for CommandProvisioner {
    async fn create_cluster(&self, request: &CreateRequest) -> ControlResult<()> {
        self.run("create", request)
            .await
            .map_err(|reason| ControlError::provision(&request.image, reason))
    }

    async fn scale_up(&self, request: &ScaleUpRequest) -> ControlResult<()> {
        self.run("scale-up", request)
            .await
            .map_err(|reason| ControlError::provision(&request.image, reason))
    }
}

#[async_trait]
impl AppInstaller for CommandProvisioner {
    async fn install(&self, request: &InstallRequest) -> ControlResult<()> {
        self.run("install", request)
            .await
            .map_err(|reason| ControlError::install(&request.image, reason))
    }
}
