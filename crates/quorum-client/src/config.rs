use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use quorum_core::{
    ClientSettings, ConnectivitySettings, Credentials, EndpointSet, Error, NodePreference,
    OperationOptions, Result,
};

pub const DEFAULT_CONFIG_PATH: &str = "config/quorum.toml";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ClientConfig {
    #[serde(default)]
    pub connectivity: ConnectivityConfig,

    #[serde(default)]
    pub credentials: CredentialsConfig,

    #[serde(default)]
    pub operations: OperationsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectivityConfig {
    #[serde(default = "default_seeds")]
    pub seeds: Vec<String>,

    #[serde(default = "default_node_preference")]
    pub node_preference: String,

    #[serde(default = "default_discovery_interval")]
    pub discovery_interval_ms: u64,

    #[serde(default = "default_gossip_timeout")]
    pub gossip_timeout_ms: u64,

    #[serde(default = "default_max_discover_attempts")]
    pub max_discover_attempts: u32,

    #[serde(default = "default_discovery_backoff")]
    pub discovery_backoff_ms: u64,

    #[serde(default = "default_max_discovery_backoff")]
    pub max_discovery_backoff_ms: u64,

    #[serde(default = "default_true")]
    pub dns_discovery: bool,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

#[derive(Clone, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default = "default_username")]
    pub username: Option<String>,

    #[serde(default = "default_password")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperationsConfig {
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    #[serde(default = "default_true")]
    pub throw_on_failure: bool,
}

fn default_seeds() -> Vec<String> {
    std::env::var("QUORUM_SEEDS")
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_else(|_| vec!["localhost:2113".to_string()])
}

fn default_node_preference() -> String {
    std::env::var("QUORUM_NODE_PREFERENCE").unwrap_or_else(|_| "leader".to_string())
}

fn default_username() -> Option<String> {
    std::env::var("QUORUM_USERNAME").ok()
}

fn default_password() -> Option<String> {
    std::env::var("QUORUM_PASSWORD").ok()
}

fn default_discovery_interval() -> u64 {
    30_000
}

fn default_gossip_timeout() -> u64 {
    5_000
}

fn default_max_discover_attempts() -> u32 {
    10
}

fn default_discovery_backoff() -> u64 {
    100
}

fn default_max_discovery_backoff() -> u64 {
    2_000
}

fn default_connect_timeout() -> u64 {
    5_000
}

fn default_timeout() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            seeds: default_seeds(),
            node_preference: default_node_preference(),
            discovery_interval_ms: default_discovery_interval(),
            gossip_timeout_ms: default_gossip_timeout(),
            max_discover_attempts: default_max_discover_attempts(),
            discovery_backoff_ms: default_discovery_backoff(),
            max_discovery_backoff_ms: default_max_discovery_backoff(),
            dns_discovery: true,
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            username: default_username(),
            password: default_password(),
        }
    }
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for OperationsConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout(),
            throw_on_failure: true,
        }
    }
}

impl ClientConfig {
    /// Reads the file named by `QUORUM_CONFIG`, or the default path, falling
    /// back to defaults when it does not exist.
    pub fn load() -> Result<Self> {
        let config_path =
            std::env::var("QUORUM_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let path = Path::new(&config_path);
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("invalid config: {}", e)))
    }

    pub fn connectivity_settings(&self) -> Result<ConnectivitySettings> {
        let c = &self.connectivity;
        let seeds = EndpointSet::parse_list(&c.seeds)?;
        let node_preference: NodePreference = c.node_preference.parse()?;

        let settings = ConnectivitySettings::new(seeds)
            .with_node_preference(node_preference)
            .with_discovery_interval(Duration::from_millis(c.discovery_interval_ms))
            .with_gossip_timeout(Duration::from_millis(c.gossip_timeout_ms))
            .with_max_discover_attempts(c.max_discover_attempts)
            .with_discovery_backoff(
                Duration::from_millis(c.discovery_backoff_ms),
                Duration::from_millis(c.max_discovery_backoff_ms),
            )
            .with_dns_discovery(c.dns_discovery)
            .with_connect_timeout(Duration::from_millis(c.connect_timeout_ms));
        Ok(settings)
    }

    pub fn default_credentials(&self) -> Result<Option<Credentials>> {
        match (&self.credentials.username, &self.credentials.password) {
            (Some(username), Some(password)) => {
                Ok(Some(Credentials::basic(username.clone(), password.clone())))
            }
            (None, None) => Ok(None),
            _ => Err(Error::Config(
                "username and password must be configured together".into(),
            )),
        }
    }

    pub fn into_settings(self) -> Result<ClientSettings> {
        let options = OperationOptions::default()
            .with_timeout(Duration::from_millis(self.operations.timeout_ms))
            .with_throw_on_failure(self.operations.throw_on_failure);

        let mut settings =
            ClientSettings::new(self.connectivity_settings()?).with_operation_options(options);
        if let Some(credentials) = self.default_credentials()? {
            settings = settings.with_default_credentials(credentials);
        }

        settings.validate()?;
        Ok(settings)
    }
}
