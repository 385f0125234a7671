use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tonic::client::Grpc;
use tonic::transport::Channel;
use tonic::{Request, Status};
use tracing::debug;

use quorum_core::{
    Connector, Endpoint, Error, ResponseStream, Result, Transport, DEFAULT_CONNECT_TIMEOUT,
};

use crate::codec::JsonCodec;
use crate::protocol::{operation_path, MAX_MESSAGE_SIZE};

const TCP_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(60);
const HTTP2_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
const HTTP2_KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(10);

/// tonic endpoint for a cluster member, plain HTTP/2.
pub(crate) fn grpc_endpoint(
    endpoint: &Endpoint,
    connect_timeout: Duration,
) -> Result<tonic::transport::Endpoint> {
    let uri = format!("http://{}", endpoint);
    let grpc = tonic::transport::Endpoint::from_shared(uri)
        .map_err(|e| Error::Config(format!("invalid endpoint {}: {}", endpoint, e)))?;

    Ok(grpc
        .connect_timeout(connect_timeout)
        .tcp_nodelay(true)
        .tcp_keepalive(Some(TCP_KEEPALIVE_INTERVAL))
        .http2_keep_alive_interval(HTTP2_KEEPALIVE_INTERVAL)
        .keep_alive_timeout(HTTP2_KEEPALIVE_TIMEOUT)
        .keep_alive_while_idle(true))
}

/// One HTTP/2 connection to a node. Concurrent calls are multiplexed as
/// streams; the tonic [`Channel`] is cheap to clone per call.
pub struct GrpcTransport {
    endpoint: Endpoint,
    channel: Channel,
}

impl GrpcTransport {
    pub async fn connect(endpoint: &Endpoint, connect_timeout: Duration) -> Result<Self> {
        let channel = grpc_endpoint(endpoint, connect_timeout)?
            .connect()
            .await
            .map_err(|e| Error::Unavailable(format!("connection failed to {}: {}", endpoint, e)))?;

        debug!("connected to {}", endpoint);
        Ok(Self {
            endpoint: endpoint.clone(),
            channel,
        })
    }

    /// Transport that connects on its first call.
    pub fn connect_lazy(endpoint: &Endpoint, connect_timeout: Duration) -> Result<Self> {
        let channel = grpc_endpoint(endpoint, connect_timeout)?.connect_lazy();
        Ok(Self {
            endpoint: endpoint.clone(),
            channel,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for GrpcTransport {
    async fn call(
        &self,
        method: &str,
        request: Request<Value>,
    ) -> std::result::Result<ResponseStream, Status> {
        let path = operation_path(method)?;

        let mut grpc = Grpc::new(self.channel.clone()).max_decoding_message_size(MAX_MESSAGE_SIZE);
        grpc.ready().await.map_err(|e| {
            Status::unavailable(format!("{} is not ready: {}", self.endpoint, e))
        })?;

        let response = grpc
            .server_streaming(request, path, JsonCodec::<Value, Value>::default())
            .await?;
        Ok(response.into_inner().boxed())
    }
}

#[derive(Debug, Clone)]
pub struct GrpcConnector {
    connect_timeout: Duration,
}

impl GrpcConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for GrpcConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

#[async_trait]
impl Connector for GrpcConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn Transport>> {
        let transport = GrpcTransport::connect(endpoint, self.connect_timeout).await?;
        Ok(Arc::new(transport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tonic::Code;

    async fn closed_port() -> Endpoint {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = Endpoint::from(listener.local_addr().unwrap());
        drop(listener);
        endpoint
    }

    #[test]
    fn test_grpc_endpoint_uri() {
        let grpc = grpc_endpoint(&Endpoint::new("10.0.0.1", 2113), Duration::from_secs(1)).unwrap();
        assert_eq!(grpc.uri().host(), Some("10.0.0.1"));
        assert_eq!(grpc.uri().port_u16(), Some(2113));

        let grpc = grpc_endpoint(&Endpoint::new("::1", 2113), Duration::from_secs(1)).unwrap();
        assert_eq!(grpc.uri().host(), Some("[::1]"));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let endpoint = closed_port().await;

        let result = GrpcConnector::new(Duration::from_secs(1))
            .connect(&endpoint)
            .await;
        assert!(matches!(result, Err(Error::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_bad_method_fails_before_network() {
        let transport =
            GrpcTransport::connect_lazy(&closed_port().await, Duration::from_secs(1)).unwrap();

        let status = transport
            .call("users list", Request::new(Value::Null))
            .await
            .err()
            .unwrap();
        assert_eq!(status.code(), Code::InvalidArgument);
    }
}
