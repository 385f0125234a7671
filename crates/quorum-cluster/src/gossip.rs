use std::time::Duration;

use async_trait::async_trait;
use tonic::client::Grpc;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::{Code, Request, Status};
use tokio::time::timeout;
use tracing::debug;

use quorum_core::{ClusterMember, Endpoint, Error, GossipClient, Result};

use crate::codec::JsonCodec;
use crate::connection::grpc_endpoint;
use crate::protocol::{ClusterInfo, ReadGossip, GOSSIP_READ_PATH, MAX_MESSAGE_SIZE};

/// Reads gossip over a fresh connection per request, so a dead node never
/// leaves a cached connection behind.
#[derive(Debug, Clone, Default)]
pub struct GrpcGossipClient;

impl GrpcGossipClient {
    pub fn new() -> Self {
        Self
    }

    async fn exchange(
        endpoint: &Endpoint,
        connect_timeout: Duration,
    ) -> Result<Vec<ClusterMember>> {
        let channel = grpc_endpoint(endpoint, connect_timeout)
            .map_err(|e| unreachable(endpoint, e.to_string()))?
            .connect()
            .await
            .map_err(|e| unreachable(endpoint, format!("connect error: {}", e)))?;

        let mut grpc = Grpc::new(channel).max_decoding_message_size(MAX_MESSAGE_SIZE);
        grpc.ready()
            .await
            .map_err(|e| unreachable(endpoint, e.to_string()))?;

        let response = grpc
            .unary(
                Request::new(ReadGossip::default()),
                PathAndQuery::from_static(GOSSIP_READ_PATH),
                JsonCodec::<ReadGossip, ClusterInfo>::default(),
            )
            .await
            .map_err(|status| gossip_failure(endpoint, status))?;

        Ok(response.into_inner().members)
    }
}

#[async_trait]
impl GossipClient for GrpcGossipClient {
    async fn fetch_members(
        &self,
        endpoint: &Endpoint,
        gossip_timeout: Duration,
    ) -> Result<Vec<ClusterMember>> {
        let members = timeout(gossip_timeout, Self::exchange(endpoint, gossip_timeout))
            .await
            .map_err(|_| {
                unreachable(
                    endpoint,
                    format!("gossip timed out after {}ms", gossip_timeout.as_millis()),
                )
            })??;

        debug!("gossip from {} returned {} members", endpoint, members.len());
        Ok(members)
    }
}

fn unreachable(endpoint: &Endpoint, reason: String) -> Error {
    Error::Unreachable {
        endpoint: endpoint.to_string(),
        reason,
    }
}

fn gossip_failure(endpoint: &Endpoint, status: Status) -> Error {
    match status.code() {
        Code::DataLoss => Error::Malformed {
            endpoint: endpoint.to_string(),
            reason: status.message().to_string(),
        },
        code => unreachable(endpoint, format!("{:?}: {}", code, status.message())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn listener() -> (TcpListener, Endpoint) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = Endpoint::from(listener.local_addr().unwrap());
        (listener, endpoint)
    }

    #[tokio::test]
    async fn test_fetch_members_refused() {
        let (listener, endpoint) = listener().await;
        drop(listener);

        let result = GrpcGossipClient::new()
            .fetch_members(&endpoint, Duration::from_secs(2))
            .await;
        assert!(matches!(result, Err(Error::Unreachable { .. })));
    }

    #[tokio::test]
    async fn test_fetch_members_timeout() {
        let (listener, endpoint) = listener().await;
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let result = GrpcGossipClient::new()
            .fetch_members(&endpoint, Duration::from_millis(200))
            .await;
        assert!(matches!(result, Err(Error::Unreachable { .. })));
    }

    #[test]
    fn test_decode_failure_is_malformed() {
        let endpoint = Endpoint::new("10.0.0.1", 2113);
        assert!(matches!(
            gossip_failure(&endpoint, Status::data_loss("malformed message")),
            Error::Malformed { .. }
        ));
        assert!(matches!(
            gossip_failure(&endpoint, Status::unimplemented("no gossip here")),
            Error::Unreachable { .. }
        ));
    }
}
