//! Implementation of the `drydock apply` command.

use std::path::PathBuf;

use drydock_control::{ApplyMode, ControlConfig, ReconciliationAction, Reconciler};
use tracing::info;

use super::description::ClusterDescription;
use super::{load_config, CommandError};

/// Arguments for the apply command.
#[derive(Debug, Default)]
pub struct ApplyArgs {
    /// Clusterfile path.
    pub clusterfile: PathBuf,

    /// Configuration file; defaults to `drydock.toml`.
    pub config: Option<PathBuf>,

    /// Overrides the configured apply mode.
    pub mode: Option<ApplyMode>,

    /// Overrides the configured app installer arguments.
    pub app_args: Vec<String>,
}

pub async fn run(args: ApplyArgs) -> Result<(), CommandError> {
    let description = ClusterDescription::load(&args.clusterfile)?;
    let config = load_config(args.config.as_deref())?;

    let action = apply(&description, config, &args).await?;
    println!("{action}");
    Ok(())
}

/// Run one reconciliation pass for `description`.
pub async fn apply(
    description: &ClusterDescription,
    mut config: ControlConfig,
    args: &ApplyArgs,
) -> Result<ReconciliationAction, CommandError> {
    merge_overrides(&mut config, args);

    let desired = description.desired_state()?;
    let image = description.image_ref(&config.registry.default_registry)?;
    let reconciler = Reconciler::from_config(&config)?;

    info!(
        cluster = %description.name,
        image = %image,
        mode = %config.apply.mode,
        "applying Clusterfile"
    );

    Ok(reconciler.reconcile(&desired, &image, &config.apply).await?)
}

fn merge_overrides(config: &mut ControlConfig, args: &ApplyArgs) {
    if let Some(mode) = args.mode {
        config.apply.mode = mode;
    }
    if !args.app_args.is_empty() {
        config.apply.app_args.clone_from(&args.app_args);
    }
}
