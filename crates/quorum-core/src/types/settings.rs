use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::{Credentials, Endpoint, EndpointSet, NodePreference, OperationOptions};

pub const DEFAULT_DISCOVERY_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_GOSSIP_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_DISCOVER_ATTEMPTS: u32 = 10;
pub const DEFAULT_DISCOVERY_BACKOFF: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_DISCOVERY_BACKOFF: Duration = Duration::from_secs(2);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How a client finds and picks a cluster member. Fixed for the lifetime of a client.
#[derive(Debug, Clone)]
pub struct ConnectivitySettings {
    pub seeds: EndpointSet,
    pub discovery_interval: Duration,
    pub gossip_timeout: Duration,
    pub node_preference: NodePreference,
    pub max_discover_attempts: u32,
    pub discovery_backoff: Duration,
    pub max_discovery_backoff: Duration,
    pub dns_discovery: bool,
    pub connect_timeout: Duration,
}

impl Default for ConnectivitySettings {
    fn default() -> Self {
        Self {
            seeds: EndpointSet::new([Endpoint::new("localhost", 2113)]),
            discovery_interval: DEFAULT_DISCOVERY_INTERVAL,
            gossip_timeout: DEFAULT_GOSSIP_TIMEOUT,
            node_preference: NodePreference::Leader,
            max_discover_attempts: DEFAULT_MAX_DISCOVER_ATTEMPTS,
            discovery_backoff: DEFAULT_DISCOVERY_BACKOFF,
            max_discovery_backoff: DEFAULT_MAX_DISCOVERY_BACKOFF,
            dns_discovery: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl ConnectivitySettings {
    pub fn new(seeds: EndpointSet) -> Self {
        Self {
            seeds,
            ..Self::default()
        }
    }

    pub fn single(endpoint: Endpoint) -> Self {
        Self::new(EndpointSet::new([endpoint]))
    }

    pub fn with_discovery_interval(mut self, interval: Duration) -> Self {
        self.discovery_interval = interval;
        self
    }

    pub fn with_gossip_timeout(mut self, timeout: Duration) -> Self {
        self.gossip_timeout = timeout;
        self
    }

    pub fn with_node_preference(mut self, preference: NodePreference) -> Self {
        self.node_preference = preference;
        self
    }

    pub fn with_max_discover_attempts(mut self, attempts: u32) -> Self {
        self.max_discover_attempts = attempts;
        self
    }

    pub fn with_discovery_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.discovery_backoff = initial;
        self.max_discovery_backoff = max;
        self
    }

    pub fn with_dns_discovery(mut self, enabled: bool) -> Self {
        self.dns_discovery = enabled;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.seeds.is_empty() {
            return Err(Error::Config("at least one seed endpoint is required".into()));
        }
        if self.max_discover_attempts < 1 {
            return Err(Error::Config("max_discover_attempts must be at least 1".into()));
        }
        if self.gossip_timeout.is_zero() {
            return Err(Error::Config("gossip_timeout must be non-zero".into()));
        }
        if self.discovery_interval.is_zero() {
            return Err(Error::Config("discovery_interval must be non-zero".into()));
        }
        if self.max_discovery_backoff < self.discovery_backoff {
            return Err(Error::Config(
                "max_discovery_backoff must not be below discovery_backoff".into(),
            ));
        }
        Ok(())
    }
}

/// Everything a client is constructed with.
#[derive(Debug, Clone, Default)]
pub struct ClientSettings {
    pub connectivity: ConnectivitySettings,
    pub default_credentials: Option<Credentials>,
    pub operation_options: OperationOptions,
}

impl ClientSettings {
    pub fn new(connectivity: ConnectivitySettings) -> Self {
        Self {
            connectivity,
            ..Self::default()
        }
    }

    pub fn with_default_credentials(mut self, credentials: Credentials) -> Self {
        self.default_credentials = Some(credentials);
        self
    }

    pub fn with_operation_options(mut self, options: OperationOptions) -> Self {
        self.operation_options = options;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.connectivity.validate()?;
        if matches!(self.operation_options.timeout_after, Some(t) if t.is_zero()) {
            return Err(Error::Config("default operation timeout must be non-zero".into()));
        }
        Ok(())
    }
}
