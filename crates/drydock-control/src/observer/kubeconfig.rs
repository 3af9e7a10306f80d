//! Kubeconfig discovery.
//!
//! Locates the cluster the operator's tooling already talks to: the first
//! existing entry of `$KUBECONFIG`, else `~/.kube/config`. Only the current
//! context is read; files listed in `$KUBECONFIG` are not merged.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use base64::Engine;
use serde::Deserialize;

use crate::error::{ControlError, ControlResult};

/// Environment variable listing kubeconfig files.
pub const KUBECONFIG_ENV: &str = "KUBECONFIG";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawKubeconfig {
    #[serde(default)]
    current_context: Option<String>,
    #[serde(default)]
    clusters: Vec<NamedCluster>,
    #[serde(default)]
    contexts: Vec<NamedContext>,
    #[serde(default)]
    users: Vec<NamedUser>,
}

#[derive(Debug, Deserialize)]
struct NamedCluster {
    name: String,
    cluster: RawCluster,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawCluster {
    server: String,
    #[serde(default)]
    certificate_authority: Option<PathBuf>,
    #[serde(default)]
    certificate_authority_data: Option<String>,
    #[serde(default)]
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Deserialize)]
struct NamedContext {
    name: String,
    context: RawContext,
}

#[derive(Debug, Deserialize)]
struct RawContext {
    cluster: String,
    #[serde(default)]
    user: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    name: String,
    #[serde(default)]
    user: RawUser,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawUser {
    #[serde(default)]
    token: Option<String>,
    #[serde(default, rename = "tokenFile")]
    token_file: Option<PathBuf>,
    #[serde(default)]
    client_certificate: Option<PathBuf>,
    #[serde(default)]
    client_certificate_data: Option<String>,
    #[serde(default)]
    client_key: Option<PathBuf>,
    #[serde(default)]
    client_key_data: Option<String>,
}

/// Connection settings of a kubeconfig's current context.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct KubeEndpoint {
    /// API server URL.
    pub server: String,
    /// Bearer token of the context's user.
    pub token: Option<String>,
    /// PEM bundle of the cluster CA.
    pub ca_pem: Option<Vec<u8>>,
    /// PEM client certificate followed by its key.
    pub identity_pem: Option<Vec<u8>>,
    /// Skip TLS certificate verification.
    pub insecure_skip_tls_verify: bool,
}

impl std::fmt::Debug for KubeEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeEndpoint")
            .field("server", &self.server)
            .field("insecure_skip_tls_verify", &self.insecure_skip_tls_verify)
            .finish_non_exhaustive()
    }
}

/// Default kubeconfig location for the current process.
#[must_use]
pub fn default_path() -> Option<PathBuf> {
    discover(std::env::var_os(KUBECONFIG_ENV), dirs::home_dir())
}

fn discover(kubeconfig_env: Option<OsString>, home: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(paths) = kubeconfig_env.filter(|v| !v.is_empty()) {
        let entries: Vec<PathBuf> = std::env::split_paths(&paths)
            .filter(|p| !p.as_os_str().is_empty())
            .collect();
        return entries
            .iter()
            .find(|p| p.is_file())
            .or_else(|| entries.first())
            .cloned();
    }
    home.map(|home| home.join(".kube").join("config"))
}

/// Read the current context of the kubeconfig at `path`.
///
/// Relative file references resolve against the kubeconfig's directory.
pub fn load_endpoint(path: &Path) -> ControlResult<KubeEndpoint> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ControlError::Config(format!("failed to read kubeconfig {}: {e}", path.display()))
    })?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    parse_endpoint(&content, base_dir)
}

fn parse_endpoint(content: &str, base_dir: &Path) -> ControlResult<KubeEndpoint> {
    let raw: RawKubeconfig = serde_yaml::from_str(content)
        .map_err(|e| ControlError::Config(format!("invalid kubeconfig: {e}")))?;

    let context_name = raw
        .current_context
        .as_deref()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ControlError::Config("kubeconfig has no current-context".to_owned()))?;

    let context = raw
        .contexts
        .iter()
        .find(|c| c.name == context_name)
        .map(|c| &c.context)
        .ok_or_else(|| {
            ControlError::Config(format!("kubeconfig context {context_name:?} not found"))
        })?;

    let cluster = raw
        .clusters
        .iter()
        .find(|c| c.name == context.cluster)
        .map(|c| &c.cluster)
        .ok_or_else(|| {
            ControlError::Config(format!("kubeconfig cluster {:?} not found", context.cluster))
        })?;

    let user = match &context.user {
        Some(name) => Some(
            raw.users
                .iter()
                .find(|u| &u.name == name)
                .map(|u| &u.user)
                .ok_or_else(|| ControlError::Config(format!("kubeconfig user {name:?} not found")))?,
        ),
        None => None,
    };

    let ca_pem = read_material(
        cluster.certificate_authority_data.as_deref(),
        cluster.certificate_authority.as_deref(),
        base_dir,
        "certificate-authority",
    )?;

    let (token, identity_pem) = match user {
        Some(user) => (user_token(user, base_dir)?, user_identity(user, base_dir)?),
        None => (None, None),
    };

    Ok(KubeEndpoint {
        server: cluster.server.trim_end_matches('/').to_owned(),
        token,
        ca_pem,
        identity_pem,
        insecure_skip_tls_verify: cluster.insecure_skip_tls_verify,
    })
}

fn user_token(user: &RawUser, base_dir: &Path) -> ControlResult<Option<String>> {
    if let Some(token) = &user.token {
        return Ok(Some(token.clone()));
    }
    match &user.token_file {
        Some(path) => {
            let path = base_dir.join(path);
            let token = std::fs::read_to_string(&path).map_err(|e| {
                ControlError::Config(format!("failed to read token file {}: {e}", path.display()))
            })?;
            Ok(Some(token.trim().to_owned()))
        }
        None => Ok(None),
    }
}

fn user_identity(user: &RawUser, base_dir: &Path) -> ControlResult<Option<Vec<u8>>> {
    let cert = read_material(
        user.client_certificate_data.as_deref(),
        user.client_certificate.as_deref(),
        base_dir,
        "client-certificate",
    )?;
    let key = read_material(
        user.client_key_data.as_deref(),
        user.client_key.as_deref(),
        base_dir,
        "client-key",
    )?;

    Ok(match (cert, key) {
        (Some(mut pem), Some(key)) => {
            pem.push(b'\n');
            pem.extend_from_slice(&key);
            Some(pem)
        }
        _ => None,
    })
}

/// Inline base64 data wins over a file reference.
fn read_material(
    data: Option<&str>,
    file: Option<&Path>,
    base_dir: &Path,
    field: &str,
) -> ControlResult<Option<Vec<u8>>> {
    if let Some(data) = data {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data.trim())
            .map_err(|e| ControlError::Config(format!("invalid {field}-data: {e}")))?;
        return Ok(Some(bytes));
    }
    match file {
        Some(file) => {
            let path = base_dir.join(file);
            std::fs::read(&path).map(Some).map_err(|e| {
                ControlError::Config(format!("failed to read {field} {}: {e}", path.display()))
            })
        }
        None => Ok(None),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
current-context: admin@prod
clusters:
- name: staging
  cluster:
    server: https://10.0.9.1:6443
- name: prod
  cluster:
    server: https://10.0.0.1:6443/
    certificate-authority-data: Y2EtYnVuZGxl
contexts:
- name: admin@staging
  context:
    cluster: staging
- name: admin@prod
  context:
    cluster: prod
    user: admin
users:
- name: admin
  user:
    token: s3cret
"#;

    #[test]
    fn reads_current_context() {
        let endpoint = parse_endpoint(KUBECONFIG, Path::new("/")).unwrap();
        assert_eq!(endpoint.server, "https://10.0.0.1:6443");
        assert_eq!(endpoint.token.as_deref(), Some("s3cret"));
        assert_eq!(endpoint.ca_pem.as_deref(), Some(b"ca-bundle".as_slice()));
        assert!(endpoint.identity_pem.is_none());
        assert!(!endpoint.insecure_skip_tls_verify);
    }

    #[test]
    fn relative_files_resolve_against_kubeconfig_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("token"), "from-file\n").unwrap();
        std::fs::write(dir.path().join("client.crt"), "CERT").unwrap();
        std::fs::write(dir.path().join("client.key"), "KEY").unwrap();
        let path = dir.path().join("config");
        std::fs::write(
            &path,
            r#"
current-context: local
clusters:
- name: local
  cluster:
    server: https://127.0.0.1:6443
    insecure-skip-tls-verify: true
contexts:
- name: local
  context:
    cluster: local
    user: local
users:
- name: local
  user:
    tokenFile: token
    client-certificate: client.crt
    client-key: client.key
"#,
        )
        .unwrap();

        let endpoint = load_endpoint(&path).unwrap();
        assert_eq!(endpoint.token.as_deref(), Some("from-file"));
        assert_eq!(endpoint.identity_pem.as_deref(), Some(b"CERT\nKEY".as_slice()));
        assert!(endpoint.insecure_skip_tls_verify);
    }

    #[test]
    fn missing_current_context_is_config_error() {
        let result = parse_endpoint("clusters: []\n", Path::new("/"));
        assert!(matches!(result, Err(ControlError::Config(_))));
    }

    #[test]
    fn dangling_context_is_config_error() {
        let content = KUBECONFIG.replace("current-context: admin@prod", "current-context: gone");
        let err = parse_endpoint(&content, Path::new("/")).unwrap_err();
        assert!(err.to_string().contains("\"gone\""));
    }

    #[test]
    fn invalid_ca_data_is_config_error() {
        let content = KUBECONFIG.replace("Y2EtYnVuZGxl", "not base64!");
        let result = parse_endpoint(&content, Path::new("/"));
        assert!(matches!(result, Err(ControlError::Config(_))));
    }

    #[test]
    fn env_prefers_first_existing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let present = dir.path().join("present");
        std::fs::write(&present, "").unwrap();
        let env = std::env::join_paths([&missing, &present]).unwrap();

        assert_eq!(discover(Some(env), Some(PathBuf::from("/home/op"))), Some(present));
    }

    #[test]
    fn home_is_used_without_env() {
        assert_eq!(
            discover(Some(OsString::new()), Some(PathBuf::from("/home/op"))),
            Some(PathBuf::from("/home/op/.kube/config"))
        );
        assert_eq!(discover(None, None), None);
    }
}
