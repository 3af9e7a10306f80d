//! Kubernetes API server client.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Certificate, Client, Identity, RequestBuilder};
use serde::Deserialize;
use tracing::debug;

use crate::config::ClusterConfig;
use crate::error::{ControlError, ControlResult};

use super::kubeconfig::{self, KubeEndpoint};
use super::{ClusterApi, NodeInfo};

const PAGE_SIZE: &str = "500";

#[derive(Deserialize)]
struct RawNodeList {
    #[serde(default)]
    metadata: RawListMeta,
    #[serde(default)]
    items: Vec<RawNode>,
}

#[derive(Deserialize, Default)]
struct RawListMeta {
    #[serde(rename = "continue", default)]
    continue_token: Option<String>,
}

#[derive(Deserialize)]
struct RawNode {
    #[serde(default)]
    metadata: RawNodeMeta,
    #[serde(default)]
    status: RawNodeStatus,
}

#[derive(Deserialize, Default)]
struct RawNodeMeta {
    #[serde(default)]
    name: String,
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

#[derive(Deserialize, Default)]
struct RawNodeStatus {
    #[serde(default)]
    addresses: Vec<RawNodeAddress>,
}

#[derive(Deserialize)]
struct RawNodeAddress {
    address: String,
}

impl From<RawNode> for NodeInfo {
    fn from(raw: RawNode) -> Self {
        Self {
            name: raw.metadata.name,
            addresses: raw.status.addresses.into_iter().map(|a| a.address).collect(),
            labels: raw.metadata.labels,
        }
    }
}

/// HTTP client for the Kubernetes API server.
///
/// The server comes from `api_url`, else from a kubeconfig. A client with
/// neither is valid: its probe always fails, which the reconciler reads as
/// "no cluster yet".
#[derive(Debug, Clone)]
pub struct KubeClient {
    client: Client,
    base_url: Option<String>,
    token: Option<String>,
}

impl KubeClient {
    /// Create a client from configuration.
    ///
    /// Reads `token_file` and any kubeconfig eagerly. An inline `token` or
    /// `token_file` takes precedence over the kubeconfig user's token.
    pub fn new(config: &ClusterConfig) -> ControlResult<Self> {
        let endpoint = match config.api_url {
            Some(_) => None,
            None => locate_kubeconfig(config)?,
        };

        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(
                config.insecure_skip_tls_verify
                    || endpoint.as_ref().is_some_and(|e| e.insecure_skip_tls_verify),
            );

        if let Some(endpoint) = &endpoint {
            if let Some(pem) = &endpoint.ca_pem {
                builder = builder.add_root_certificate(Certificate::from_pem(pem)?);
            }
            if let Some(pem) = &endpoint.identity_pem {
                builder = builder.identity(Identity::from_pem(pem)?);
            }
        }

        let client = builder.build().map_err(ControlError::Http)?;

        let token = match (&config.token, &config.token_file) {
            (Some(token), _) => Some(token.clone()),
            (None, Some(path)) => {
                let token = std::fs::read_to_string(path).map_err(|e| {
                    ControlError::Config(format!(
                        "failed to read token file {}: {e}",
                        path.display()
                    ))
                })?;
                Some(token.trim().to_owned())
            }
            (None, None) => endpoint.as_ref().and_then(|e| e.token.clone()),
        };

        let base_url = match (&config.api_url, endpoint) {
            (Some(url), _) => Some(url.trim_end_matches('/').to_owned()),
            (None, Some(endpoint)) => Some(endpoint.server),
            (None, None) => None,
        };

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// Create a client for an API server URL with no credentials.
    pub fn with_url(url: impl Into<String>) -> ControlResult<Self> {
        Self::new(&ClusterConfig {
            api_url: Some(url.into()),
            ..ClusterConfig::default()
        })
    }

    fn base_url(&self) -> ControlResult<&str> {
        self.base_url
            .as_deref()
            .ok_or_else(|| ControlError::connection("no cluster API endpoint or kubeconfig found"))
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let request = self.client.get(url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn locate_kubeconfig(config: &ClusterConfig) -> ControlResult<Option<KubeEndpoint>> {
    if let Some(path) = &config.kubeconfig {
        return kubeconfig::load_endpoint(path).map(Some);
    }
    if !config.kubeconfig_discovery {
        return Ok(None);
    }

    match kubeconfig::default_path() {
        Some(path) if path.is_file() => {
            debug!(path = %path.display(), "using kubeconfig");
            kubeconfig::load_endpoint(&path).map(Some)
        }
        _ => {
            debug!("no kubeconfig found");
            Ok(None)
        }
    }
}

#[async_trait]
impl ClusterApi for KubeClient {
    async fn probe(&self) -> ControlResult<()> {
        let url = format!("{}/version", self.base_url()?);
        let response = self
            .get(&url)
            .send()
            .await
            .map_err(|e| ControlError::connection(format!("{url}: {e}")))?;

        if !response.status().is_success() {
            return Err(ControlError::connection(format!(
                "{url}: probe returned {}",
                response.status()
            )));
        }

        Ok(())
    }

    async fn list_nodes(&self) -> ControlResult<Vec<NodeInfo>> {
        let url = format!("{}/api/v1/nodes", self.base_url()?);
        let mut nodes = Vec::new();
        let mut continue_token: Option<String> = None;

        loop {
            let mut request = self.get(&url).query(&[("limit", PAGE_SIZE)]);
            if let Some(token) = &continue_token {
                request = request.query(&[("continue", token.as_str())]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| ControlError::connection(format!("failed to list nodes: {e}")))?;

            if !response.status().is_success() {
                return Err(ControlError::connection(format!(
                    "failed to list nodes: {}",
                    response.status()
                )));
            }

            let page: RawNodeList = response
                .json()
                .await
                .map_err(|e| ControlError::connection(format!("malformed node list: {e}")))?;

            nodes.extend(page.items.into_iter().map(NodeInfo::from));

            match page.metadata.continue_token {
                Some(token) if !token.is_empty() => continue_token = Some(token),
                _ => break,
            }
        }

        debug!(count = nodes.len(), "listed cluster nodes");
        Ok(nodes)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn node_json(name: &str, address: &str, labels: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "metadata": { "name": name, "labels": labels },
            "status": { "addresses": [
                { "type": "InternalIP", "address": address },
                { "type": "Hostname", "address": name }
            ]}
        })
    }

    #[tokio::test]
    async fn probe_without_endpoint_fails() {
        let client = KubeClient::new(&ClusterConfig {
            kubeconfig_discovery: false,
            ..ClusterConfig::default()
        })
        .unwrap();
        let err = client.probe().await.unwrap_err();
        assert!(matches!(err, ControlError::Connection(_)));
    }

    #[tokio::test]
    async fn probe_hits_version_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({ "major": "1", "minor": "22" }),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let client = KubeClient::with_url(server.uri()).unwrap();
        client.probe().await.unwrap();
    }

    #[tokio::test]
    async fn probe_error_status_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/version"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = KubeClient::with_url(server.uri()).unwrap();
        assert!(client.probe().await.is_err());
    }

    #[tokio::test]
    async fn lists_nodes_across_pages_with_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/nodes"))
            .and(query_param("continue", "page-2"))
            .and(header("authorization", "Bearer s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "metadata": {},
                "items": [node_json("worker-0", "10.0.1.1", serde_json::json!({}))]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/nodes"))
            .and(header("authorization", "Bearer s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "metadata": { "continue": "page-2" },
                "items": [node_json(
                    "master-0",
                    "10.0.0.1",
                    serde_json::json!({ "node-role.kubernetes.io/master": "" })
                )]
            })))
            .mount(&server)
            .await;

        let mut token_file = tempfile::NamedTempFile::new().unwrap();
        writeln!(token_file, "s3cret").unwrap();
        let client = KubeClient::new(&ClusterConfig {
            api_url: Some(format!("{}/", server.uri())),
            token_file: Some(token_file.path().to_path_buf()),
            ..ClusterConfig::default()
        })
        .unwrap();

        let nodes = client.list_nodes().await.unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].name, "master-0");
        assert_eq!(nodes[0].addresses, vec!["10.0.0.1", "master-0"]);
        assert!(nodes[0].labels.contains_key("node-role.kubernetes.io/master"));
        assert_eq!(nodes[1].name, "worker-0");
    }

    #[tokio::test]
    async fn list_failure_is_connection_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/nodes"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = KubeClient::with_url(server.uri()).unwrap();
        let err = client.list_nodes().await.unwrap_err();
        assert!(matches!(err, ControlError::Connection(_)));
        assert!(err.to_string().contains("403"));
    }

    #[test]
    fn missing_token_file_is_config_error() {
        let result = KubeClient::new(&ClusterConfig {
            token_file: Some("/nonexistent/drydock/token".into()),
            kubeconfig_discovery: false,
            ..ClusterConfig::default()
        });
        assert!(matches!(result, Err(ControlError::Config(_))));
    }

    fn write_kubeconfig(dir: &std::path::Path, server: &str) -> std::path::PathBuf {
        let path = dir.join("config");
        std::fs::write(
            &path,
            format!(
                r#"
current-context: drydock
clusters:
- name: drydock
  cluster:
    server: {server}
contexts:
- name: drydock
  context:
    cluster: drydock
    user: admin
users:
- name: admin
  user:
    token: from-kubeconfig
"#
            ),
        )
        .unwrap();
        path
    }

    #[tokio::test]
    async fn kubeconfig_locates_running_cluster() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/version"))
            .and(header("authorization", "Bearer from-kubeconfig"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = KubeClient::new(&ClusterConfig {
            kubeconfig: Some(write_kubeconfig(dir.path(), &server.uri())),
            ..ClusterConfig::default()
        })
        .unwrap();

        client.probe().await.unwrap();
    }

    #[tokio::test]
    async fn configured_token_overrides_kubeconfig_user() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/version"))
            .and(header("authorization", "Bearer operator"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = KubeClient::new(&ClusterConfig {
            kubeconfig: Some(write_kubeconfig(dir.path(), &server.uri())),
            token: Some("operator".to_owned()),
            ..ClusterConfig::default()
        })
        .unwrap();

        client.probe().await.unwrap();
    }

    #[test]
    fn missing_configured_kubeconfig_is_config_error() {
        let result = KubeClient::new(&ClusterConfig {
            kubeconfig: Some("/nonexistent/drydock/kubeconfig".into()),
            ..ClusterConfig::default()
        });
        assert!(matches!(result, Err(ControlError::Config(_))));
    }
}
