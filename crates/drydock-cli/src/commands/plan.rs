//! Implementation of the `drydock plan` command.

use std::path::Path;

use drydock_control::{ControlConfig, ReconciliationAction, Reconciler};

use super::description::ClusterDescription;
use super::{load_config, CommandError};

pub async fn run(clusterfile: &Path, config: Option<&Path>, json: bool) -> Result<(), CommandError> {
    let description = ClusterDescription::load(clusterfile)?;
    let config = load_config(config)?;

    let action = plan(&description, &config).await?;
    println!("{}", render(&action, json)?);
    Ok(())
}

/// Decide the action an apply would dispatch.
pub async fn plan(
    description: &ClusterDescription,
    config: &ControlConfig,
) -> Result<ReconciliationAction, CommandError> {
    let desired = description.desired_state()?;
    let image = description.image_ref(&config.registry.default_registry)?;
    let reconciler = Reconciler::from_config(config)?;

    Ok(reconciler.decide(&desired, &image, &config.apply).await?)
}

fn render(action: &ReconciliationAction, json: bool) -> Result<String, CommandError> {
    if json {
        Ok(serde_json::to_string_pretty(action)?)
    } else {
        Ok(action.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use drydock_control::ScaleDownRejection;
    use std::collections::BTreeSet;

    #[test]
    fn renders_json_with_action_tag() {
        let rendered = render(&ReconciliationAction::Noop, true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["action"], "noop");
    }

    #[test]
    fn renders_rejection_addresses() {
        let action = ReconciliationAction::Rejected(ScaleDownRejection {
            control_plane: BTreeSet::from(["10.0.0.2".parse().unwrap()]),
            worker: BTreeSet::new(),
        });

        let rendered = render(&action, false).unwrap();
        assert!(rendered.contains("10.0.0.2"));
    }

    #[tokio::test]
    async fn empty_clusterfile_path_is_rejected() {
        let err = run(Path::new(""), None, false).await.unwrap_err();
        assert!(matches!(err, CommandError::ClusterfileRequired));
    }
}
