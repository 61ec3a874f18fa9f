//! OpenShift Cluster Manager (OCM) API client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::access::{AccessError, AccessResult, ManagedClusterApi};
use shiftscope_types::{ManagedCluster, ServiceLogRecord};

/// Default base URL for the OCM API.
pub const DEFAULT_API_BASE: &str = "https://api.openshift.com";

/// Default timeout for OCM requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// How the client obtains its bearer token.
#[derive(Clone, Debug)]
pub enum OcmCredentials {
    /// A ready-to-use access token.
    AccessToken(String),
    /// An offline (refresh) token exchanged for an access token on every request.
    OfflineToken {
        client_id: String,
        offline_token: String,
        token_url: String,
    },
}

/// OCM managed-cluster and service-log client.
#[derive(Clone)]
pub struct OcmClient {
    client: Client,
    api_base: String,
    credentials: OcmCredentials,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct ItemList<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Deserialize, Default)]
struct IdRef {
    id: Option<String>,
}

#[derive(Deserialize, Default)]
struct UrlRef {
    url: Option<String>,
}

#[derive(Deserialize)]
struct RawCluster {
    id: String,
    #[serde(default)]
    name: String,
    state: Option<String>,
    #[serde(default)]
    api: UrlRef,
    #[serde(default)]
    console: UrlRef,
    openshift_version: Option<String>,
    #[serde(default)]
    product: IdRef,
    #[serde(default)]
    cloud_provider: IdRef,
    #[serde(default)]
    region: IdRef,
}

#[derive(Deserialize)]
struct RawServiceLog {
    #[serde(default)]
    id: String,
    cluster_id: Option<String>,
    service_name: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    severity: Option<String>,
    timestamp: Option<DateTime<Utc>>,
    created_at: Option<DateTime<Utc>>,
}

impl OcmClient {
    /// Create a new OCM client.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(api_base: impl Into<String>, credentials: OcmCredentials) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            credentials,
        })
    }

    /// Resolve a bearer token, exchanging the offline token when configured.
    async fn bearer_token(&self) -> AccessResult<String> {
        match &self.credentials {
            OcmCredentials::AccessToken(token) => Ok(token.clone()),
            OcmCredentials::OfflineToken {
                client_id,
                offline_token,
                token_url,
            } => {
                debug!(url = %token_url, "Exchanging OCM offline token");
                let response = self
                    .client
                    .post(token_url)
                    .form(&[
                        ("grant_type", "refresh_token"),
                        ("client_id", client_id.as_str()),
                        ("refresh_token", offline_token.as_str()),
                    ])
                    .send()
                    .await
                    .map_err(|e| AccessError::unavailable("ocm token", e))?;

                let token: TokenResponse = Self::handle_response("ocm token", response).await?;
                Ok(token.access_token)
            }
        }
    }

    /// Make an authenticated GET request.
    async fn get<T: DeserializeOwned>(
        &self,
        what: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> AccessResult<T> {
        let token = self.bearer_token().await?;
        let url = format!("{}{path}", self.api_base);
        debug!(url = %url, "GET request");

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await
            .map_err(|e| AccessError::unavailable(what, e))?;

        Self::handle_response(what, response).await
    }

    async fn handle_response<T: DeserializeOwned>(
        what: &str,
        response: reqwest::Response,
    ) -> AccessResult<T> {
        let status = response.status();
        match status {
            s if s.is_success() => response
                .json()
                .await
                .map_err(|e| AccessError::unavailable(what, e)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(AccessError::Forbidden(what.to_string()))
            }
            StatusCode::NOT_FOUND => Err(AccessError::NotFound(what.to_string())),
            _ => {
                let text = response.text().await.unwrap_or_default();
                warn!(status = status.as_u16(), body = %text, "OCM request failed");
                Err(AccessError::unavailable(what, format!("HTTP {status}")))
            }
        }
    }
}

#[async_trait]
impl ManagedClusterApi for OcmClient {
    async fn list_managed_clusters(
        &self,
        state: Option<&str>,
    ) -> AccessResult<Vec<ManagedCluster>> {
        // OCM search expressions are SQL-like; quotes are doubled
        let search = state.map(|state| format!("state = '{}'", state.replace('\'', "''")));
        let query: Vec<(&str, &str)> = search.iter().map(|s| ("search", s.as_str())).collect();

        let list: ItemList<RawCluster> = self
            .get("ocm clusters", "/api/clusters_mgmt/v1/clusters", &query)
            .await?;
        Ok(list.items.into_iter().map(managed_cluster).collect())
    }

    async fn get_cluster(&self, cluster_id: &str) -> AccessResult<ManagedCluster> {
        let what = format!("ocm cluster {cluster_id}");
        let raw: RawCluster = self
            .get(&what, &format!("/api/clusters_mgmt/v1/clusters/{cluster_id}"), &[])
            .await?;
        Ok(managed_cluster(raw))
    }

    async fn service_logs(&self, cluster_id: &str) -> AccessResult<Vec<ServiceLogRecord>> {
        let list: ItemList<RawServiceLog> = self
            .get(
                "ocm service logs",
                "/api/service_logs/v1/clusters/cluster_logs",
                &[("cluster_id", cluster_id)],
            )
            .await?;

        Ok(list
            .items
            .into_iter()
            .map(|log| ServiceLogRecord {
                id: log.id,
                cluster_id: log.cluster_id.unwrap_or_else(|| cluster_id.to_string()),
                service_name: log.service_name,
                summary: log.summary,
                description: log.description,
                severity: log.severity,
                timestamp: log.timestamp.or(log.created_at),
            })
            .collect())
    }
}

fn managed_cluster(c: RawCluster) -> ManagedCluster {
    ManagedCluster {
        id: c.id,
        name: c.name,
        state: c.state,
        api_url: c.api.url,
        console_url: c.console.url,
        openshift_version: c.openshift_version,
        product: c.product.id,
        cloud_provider: c.cloud_provider.id,
        region: c.region.id,
    }
}
