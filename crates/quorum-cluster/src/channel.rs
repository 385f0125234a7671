use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use serde_json::Value;
use tonic::Request;

use quorum_core::{Connector, Endpoint, Error, ResponseStream, Result, Status, Transport};

use crate::discovery::DiscoveryEngine;

/// A live connection to the selected node.
pub struct ActiveChannel {
    id: Uuid,
    endpoint: Endpoint,
    valid_since: DateTime<Utc>,
    transport: Arc<dyn Transport>,
    broken: AtomicBool,
}

impl ActiveChannel {
    pub fn new(endpoint: Endpoint, transport: Arc<dyn Transport>) -> Self {
        Self {
            id: Uuid::new_v4(),
            endpoint,
            valid_since: Utc::now(),
            transport,
            broken: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn valid_since(&self) -> DateTime<Utc> {
        self.valid_since
    }

    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::SeqCst)
    }

    pub async fn call(
        &self,
        method: &str,
        request: Request<Value>,
    ) -> std::result::Result<ResponseStream, Status> {
        self.transport.call(method, request).await
    }
}

impl std::fmt::Debug for ActiveChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveChannel")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("valid_since", &self.valid_since)
            .field("broken", &self.is_broken())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revalidation {
    /// No channel yet, or a discovery pass is already running.
    Skipped,
    Valid,
    Replaced(Endpoint),
}

/// Owns the channel every call goes through.
///
/// The current channel is swapped as a whole under one lock. Calls that
/// already hold the previous channel keep it alive until they finish.
pub struct ChannelManager {
    discovery: DiscoveryEngine,
    connector: Arc<dyn Connector>,
    current: RwLock<Option<Arc<ActiveChannel>>>,
    reconnect: Mutex<()>,
    shutdown: CancellationToken,
}

impl ChannelManager {
    pub fn new(discovery: DiscoveryEngine, connector: Arc<dyn Connector>) -> Self {
        Self {
            discovery,
            connector,
            current: RwLock::new(None),
            reconnect: Mutex::new(()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn discovery(&self) -> &DiscoveryEngine {
        &self.discovery
    }

    /// The current channel without establishing one.
    pub fn peek(&self) -> Option<Arc<ActiveChannel>> {
        self.current.read().clone()
    }

    pub async fn current_channel(&self) -> Result<Arc<ActiveChannel>> {
        if self.shutdown.is_cancelled() {
            return Err(Error::Disposed);
        }
        if let Some(channel) = self.usable() {
            return Ok(channel);
        }

        let _guard = self.reconnect.lock().await;

        // another caller may have reconnected while we waited
        if let Some(channel) = self.usable() {
            return Ok(channel);
        }
        if self.shutdown.is_cancelled() {
            return Err(Error::Disposed);
        }

        let endpoint = self.discovery.discover().await?;
        let transport = self.connector.connect(&endpoint).await?;
        let channel = Arc::new(ActiveChannel::new(endpoint, transport));

        if self.shutdown.is_cancelled() {
            return Err(Error::Disposed);
        }

        info!("channel {} established to {}", channel.id(), channel.endpoint());
        self.replace(Some(channel.clone()));
        Ok(channel)
    }

    /// Forces the next `current_channel` to rediscover, unless `channel` was already replaced.
    pub fn mark_broken(&self, channel: &ActiveChannel) {
        if !channel.broken.swap(true, Ordering::SeqCst) {
            debug!("channel {} to {} marked broken", channel.id(), channel.endpoint());
        }
    }

    /// Checks that the current node still matches the node preference and
    /// replaces the channel if it does not.
    pub async fn revalidate(&self) -> Result<Revalidation> {
        let channel = match self.peek() {
            Some(channel) if !channel.is_broken() => channel,
            _ => return Ok(Revalidation::Skipped),
        };
        if self.discovery.is_discovering() {
            return Ok(Revalidation::Skipped);
        }

        match self.discovery.still_eligible(channel.endpoint()).await {
            Ok(true) => {
                debug!("{} still matches node preference", channel.endpoint());
                return Ok(Revalidation::Valid);
            }
            Ok(false) => {
                info!(
                    "{} no longer matches preference {}, replacing channel",
                    channel.endpoint(),
                    self.discovery.settings().node_preference
                );
            }
            Err(e) => {
                warn!("revalidation of {} failed: {}", channel.endpoint(), e);
            }
        }

        self.mark_broken(&channel);
        let replacement = self.current_channel().await?;
        Ok(Revalidation::Replaced(replacement.endpoint().clone()))
    }

    /// Runs `revalidate` every discovery interval until disposal.
    pub fn start_revalidation(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::downgrade(self);
        let interval = self.discovery.settings().discovery_interval;
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.tick().await;

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        let Some(manager) = manager.upgrade() else {
                            break;
                        };
                        if let Err(e) = manager.revalidate().await {
                            warn!("proactive rediscovery failed: {}", e);
                        }
                    }
                    _ = shutdown.cancelled() => {
                        break;
                    }
                }
            }
            debug!("channel revalidation stopped");
        })
    }

    pub fn is_disposed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stops revalidation and discovery and releases the channel.
    /// Calls still running on it finish first.
    pub fn dispose(&self) {
        self.shutdown.cancel();
        self.discovery.shutdown();
        self.replace(None);
        info!("channel manager disposed");
    }

    fn usable(&self) -> Option<Arc<ActiveChannel>> {
        self.current
            .read()
            .as_ref()
            .filter(|channel| !channel.is_broken())
            .cloned()
    }

    fn replace(&self, next: Option<Arc<ActiveChannel>>) {
        let previous = std::mem::replace(&mut *self.current.write(), next);
        if let Some(previous) = previous {
            metrics::counter!("quorum_channel_replacements_total").increment(1);
            debug!(
                "released channel {} to {} ({} other holders)",
                previous.id(),
                previous.endpoint(),
                Arc::strong_count(&previous) - 1
            );
        }
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
