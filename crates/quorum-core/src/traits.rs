use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use tonic::{Request, Status};

use crate::error::Result;
use crate::types::*;

/// Responses of one remote call, in server order. Ends after the last item or the first failure.
pub type ResponseStream = BoxStream<'static, std::result::Result<Value, Status>>;

#[async_trait]
pub trait GossipClient: Send + Sync {
    /// Single gossip round-trip. Fails with `Unreachable` or `Malformed`, never retries.
    async fn fetch_members(
        &self,
        endpoint: &Endpoint,
        timeout: Duration,
    ) -> Result<Vec<ClusterMember>>;
}

#[async_trait]
pub trait SeedResolver: Send + Sync {
    /// Concrete candidates for one configured seed.
    async fn resolve(&self, seed: &Endpoint) -> Result<Vec<Endpoint>>;
}

/// A connection to one node that remote operations run over.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Starts `method`. Credentials and the deadline travel in the request metadata.
    async fn call(
        &self,
        method: &str,
        request: Request<Value>,
    ) -> std::result::Result<ResponseStream, Status>;
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn Transport>>;
}
