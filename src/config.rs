//! Configuration file and environment handling

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use shiftscope_k8s::{DEFAULT_API_BASE, OcmCredentials};
use shiftscope_logs::{DEFAULT_MAX_LINES, EngineConfig};

/// Red Hat SSO endpoint the OCM offline token is exchanged at
pub const DEFAULT_TOKEN_URL: &str =
    "https://sso.redhat.com/auth/realms/redhat-external/protocol/openid-connect/token";

/// OAuth client the OCM CLI registers offline tokens under
pub const DEFAULT_CLIENT_ID: &str = "cloud-services";

/// shiftscope configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Kubeconfig context; the current context when unset
    #[serde(default)]
    pub context: Option<String>,

    /// Kubeconfig path; the standard lookup when unset
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,

    #[serde(default = "default_max_lines")]
    pub default_max_lines: usize,

    /// Log fetches allowed in flight per query
    #[serde(default = "default_fan_out")]
    pub fan_out: usize,

    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    #[serde(default = "default_max_pod_sources")]
    pub max_pod_sources: usize,

    #[serde(default)]
    pub ocm: OcmConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OcmConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default)]
    pub access_token: Option<String>,

    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default)]
    pub offline_token: Option<String>,

    #[serde(default)]
    pub token_url: Option<String>,

    /// Clusters searched when a query names none
    #[serde(default)]
    pub cluster_ids: Vec<String>,
}

fn default_max_lines() -> usize {
    DEFAULT_MAX_LINES
}

fn default_fan_out() -> usize {
    8
}

fn default_query_timeout() -> u64 {
    30
}

fn default_max_pod_sources() -> usize {
    50
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            context: None,
            kubeconfig: None,
            default_max_lines: default_max_lines(),
            fan_out: default_fan_out(),
            query_timeout_secs: default_query_timeout(),
            max_pod_sources: default_max_pod_sources(),
            ocm: OcmConfig::default(),
        }
    }
}

impl Default for OcmConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            access_token: None,
            client_id: None,
            offline_token: None,
            token_url: None,
            cluster_ids: Vec::new(),
        }
    }
}

impl Config {
    /// Load from an explicit path, else the user config file when present,
    /// else defaults. OCM secrets from the environment are applied last.
    ///
    /// # Errors
    /// Returns error if an explicit path is unreadable or any file fails to parse.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::read(path)?,
            None => match Self::config_path() {
                Some(path) if path.exists() => Self::read(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// `$XDG_CONFIG_HOME/shiftscope/config.toml` or the platform equivalent
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("shiftscope").join("config.toml"))
    }

    /// Fill OCM tokens from `OCM_TOKEN` and `OCM_OFFLINE_TOKEN`; the
    /// environment wins over the file
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(token) = non_empty("OCM_TOKEN") {
            self.ocm.access_token = Some(token);
        }
        if let Some(token) = non_empty("OCM_OFFLINE_TOKEN") {
            self.ocm.offline_token = Some(token);
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            fan_out: self.fan_out.max(1),
            query_timeout: Duration::from_secs(self.query_timeout_secs.max(1)),
            max_pod_sources: self.max_pod_sources.max(1),
        }
    }
}

impl OcmConfig {
    /// Credentials for the OCM client; `None` leaves OCM unconfigured.
    /// A ready access token is preferred over an offline token.
    pub fn credentials(&self) -> Option<OcmCredentials> {
        if let Some(token) = &self.access_token {
            return Some(OcmCredentials::AccessToken(token.clone()));
        }
        self.offline_token
            .as_ref()
            .map(|offline_token| OcmCredentials::OfflineToken {
                client_id: self
                    .client_id
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
                offline_token: offline_token.clone(),
                token_url: self
                    .token_url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.default_max_lines, 100);
        assert_eq!(config.fan_out, 8);
        assert_eq!(config.query_timeout_secs, 30);
        assert_eq!(config.max_pod_sources, 50);
        assert_eq!(config.ocm.api_base, "https://api.openshift.com");
        assert!(config.ocm.credentials().is_none());
    }

    #[test]
    fn test_file_values() {
        let config = Config::from_toml(
            r#"
            context = "prod"
            fan_out = 4
            query_timeout_secs = 10

            [ocm]
            offline_token = "offline"
            cluster_ids = ["abc", "def"]
            "#,
        )
        .unwrap();

        assert_eq!(config.context.as_deref(), Some("prod"));
        assert_eq!(config.engine_config().fan_out, 4);
        assert_eq!(config.engine_config().query_timeout, Duration::from_secs(10));
        assert_eq!(config.ocm.cluster_ids, vec!["abc", "def"]);

        match config.ocm.credentials() {
            Some(OcmCredentials::OfflineToken {
                client_id,
                token_url,
                ..
            }) => {
                assert_eq!(client_id, DEFAULT_CLIENT_ID);
                assert_eq!(token_url, DEFAULT_TOKEN_URL);
            }
            other => panic!("unexpected credentials: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(Config::from_toml("fanout = 4").is_err());
    }

    #[test]
    fn test_env_overrides_file_token() {
        let mut config =
            Config::from_toml("[ocm]\naccess_token = \"from-file\"").unwrap();
        config.apply_env(|key| (key == "OCM_TOKEN").then(|| "from-env".to_string()));
        assert!(matches!(
            config.ocm.credentials(),
            Some(OcmCredentials::AccessToken(token)) if token == "from-env"
        ));
    }

    #[test]
    fn test_blank_env_ignored() {
        let mut config = Config::default();
        config.apply_env(|_| Some("  ".to_string()));
        assert!(config.ocm.credentials().is_none());
    }

    #[test]
    fn test_zero_limits_clamped() {
        let config = Config::from_toml("fan_out = 0\nmax_pod_sources = 0").unwrap();
        let engine = config.engine_config();
        assert_eq!(engine.fan_out, 1);
        assert_eq!(engine.max_pod_sources, 1);
    }
}
