use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use quorum_cluster::{
    ChannelManager, DiscoveryEngine, DnsResolver, GrpcConnector, GrpcGossipClient, StaticResolver,
};
use quorum_core::{ClientSettings, Connector, Endpoint, GossipClient, Result, SeedResolver};

use crate::dispatcher::CallDispatcher;
use crate::exceptions::ExceptionMap;
use crate::users::UserManagementClient;

/// Entry point for talking to a cluster.
///
/// Nothing touches the network until the first call, which discovers a node
/// and opens the channel. A background task re-checks the node every
/// discovery interval until the client is disposed or dropped.
pub struct QuorumClient {
    settings: ClientSettings,
    dispatcher: CallDispatcher,
    revalidation: JoinHandle<()>,
}

impl QuorumClient {
    /// Client over gRPC, resolving seeds through DNS when enabled.
    /// Must be called inside a tokio runtime.
    pub fn connect(settings: ClientSettings) -> Result<Self> {
        let resolver: Arc<dyn SeedResolver> = if settings.connectivity.dns_discovery {
            Arc::new(DnsResolver)
        } else {
            Arc::new(StaticResolver)
        };
        let connector = Arc::new(GrpcConnector::new(settings.connectivity.connect_timeout));

        Self::with_parts(
            settings,
            Arc::new(GrpcGossipClient::new()),
            resolver,
            connector,
            ExceptionMap::standard(),
        )
    }

    pub fn with_parts(
        settings: ClientSettings,
        gossip: Arc<dyn GossipClient>,
        resolver: Arc<dyn SeedResolver>,
        connector: Arc<dyn Connector>,
        exceptions: ExceptionMap,
    ) -> Result<Self> {
        settings.validate()?;

        let discovery = DiscoveryEngine::new(settings.connectivity.clone(), gossip, resolver);
        let channels = Arc::new(ChannelManager::new(discovery, connector));
        let revalidation = channels.start_revalidation();
        let dispatcher = CallDispatcher::new(channels, exceptions, &settings);

        info!(
            "client created for {} seed(s), preferring {}",
            settings.connectivity.seeds.len(),
            settings.connectivity.node_preference
        );

        Ok(Self {
            settings,
            dispatcher,
            revalidation,
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn dispatcher(&self) -> &CallDispatcher {
        &self.dispatcher
    }

    pub fn channels(&self) -> &Arc<ChannelManager> {
        self.dispatcher.channels()
    }

    pub fn users(&self) -> UserManagementClient {
        UserManagementClient::new(self.dispatcher.clone())
    }

    /// Endpoint of the current channel, discovering one if needed.
    pub async fn current_endpoint(&self) -> Result<Endpoint> {
        let channel = self.channels().current_channel().await?;
        Ok(channel.endpoint().clone())
    }

    pub fn is_disposed(&self) -> bool {
        self.channels().is_disposed()
    }

    /// Releases the channel and stops background work. Later calls fail with `Disposed`.
    pub fn dispose(&self) {
        if !self.is_disposed() {
            self.channels().dispose();
        }
    }
}

impl Drop for QuorumClient {
    fn drop(&mut self) {
        self.dispose();
        self.revalidation.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_core::{ConnectivitySettings, EndpointSet, Error};

    #[tokio::test]
    async fn test_connect_rejects_invalid_settings() {
        let settings = ClientSettings::new(ConnectivitySettings::new(EndpointSet::default()));
        assert!(matches!(
            QuorumClient::connect(settings),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_is_lazy_and_disposable() {
        let settings = ClientSettings::new(ConnectivitySettings::single(Endpoint::new(
            "127.0.0.1",
            1,
        )));
        let client = QuorumClient::connect(settings).unwrap();
        assert!(client.channels().peek().is_none());

        client.dispose();
        assert!(client.is_disposed());
        assert_eq!(client.current_endpoint().await, Err(Error::Disposed));
    }
}
