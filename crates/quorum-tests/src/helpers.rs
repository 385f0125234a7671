use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::stream::{self, BoxStream};
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::codegen::{http, Body, BoxFuture, StdError};
use tonic::server::{Grpc, NamedService, ServerStreamingService, UnaryService};
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::debug;

use quorum_cluster::{
    operation_method, JsonCodec, ReadGossip, GOSSIP_READ_PATH, GOSSIP_SERVICE, OPERATIONS_SERVICE,
};
use quorum_core::{
    ClientSettings, ClusterMember, ConnectivitySettings, Endpoint, EndpointSet, MemberState,
};

/// A call as the fake node received it.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    pub metadata: HashMap<String, String>,
    pub payload: Value,
}

pub enum Reply {
    Items(Vec<Value>),
    Fail(Status),
    /// Opens the call and sends nothing until the node stops.
    Hang,
}

type Handler = Arc<dyn Fn(&RecordedCall) -> Reply + Send + Sync>;

struct NodeState {
    members: RwLock<Vec<ClusterMember>>,
    gossip_body: RwLock<Option<Value>>,
    handler: RwLock<Handler>,
    calls: Mutex<Vec<RecordedCall>>,
    gossip_calls: AtomicUsize,
    connections: AtomicUsize,
    shutdown: CancellationToken,
}

/// In-process cluster node serving gossip and operations on a loopback port.
pub struct FakeNode {
    endpoint: Endpoint,
    state: Arc<NodeState>,
}

impl FakeNode {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = Endpoint::from(listener.local_addr().unwrap());
        let default_handler: Handler = Arc::new(|_: &RecordedCall| Reply::Items(Vec::new()));
        let state = Arc::new(NodeState {
            members: RwLock::new(Vec::new()),
            gossip_body: RwLock::new(None),
            handler: RwLock::new(default_handler),
            calls: Mutex::new(Vec::new()),
            gossip_calls: AtomicUsize::new(0),
            connections: AtomicUsize::new(0),
            shutdown: CancellationToken::new(),
        });

        let counted = state.clone();
        let incoming = TcpListenerStream::new(listener).inspect(move |accepted| {
            if accepted.is_ok() {
                counted.connections.fetch_add(1, Ordering::SeqCst);
            }
        });

        let router = Server::builder()
            .add_service(GossipService(state.clone()))
            .add_service(OperationsService(state.clone()));
        let shutdown = state.shutdown.clone();
        let served = endpoint.clone();
        tokio::spawn(async move {
            if let Err(e) = router
                .serve_with_incoming_shutdown(incoming, shutdown.cancelled_owned())
                .await
            {
                debug!("fake node {} stopped: {}", served, e);
            }
        });

        Self { endpoint, state }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint.clone()
    }

    pub fn member(&self, state: MemberState, alive: bool) -> ClusterMember {
        ClusterMember::new(self.endpoint(), state, alive)
    }

    pub fn set_members(&self, members: Vec<ClusterMember>) {
        *self.state.members.write() = members;
    }

    /// Answers gossip with `body` as is instead of the member list.
    pub fn set_gossip_body(&self, body: Value) {
        *self.state.gossip_body.write() = Some(body);
    }

    pub fn on_call<F>(&self, handler: F)
    where
        F: Fn(&RecordedCall) -> Reply + Send + Sync + 'static,
    {
        *self.state.handler.write() = Arc::new(handler);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.calls.lock().clone()
    }

    pub fn gossip_calls(&self) -> usize {
        self.state.gossip_calls.load(Ordering::SeqCst)
    }

    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Stops accepting, fails hanging calls with `UNAVAILABLE` and drains the rest.
    pub fn stop(&self) {
        self.state.shutdown.cancel();
    }
}

impl Drop for FakeNode {
    fn drop(&mut self) {
        self.state.shutdown.cancel();
    }
}

fn unimplemented_response() -> http::Response<tonic::body::Body> {
    let mut response = http::Response::new(tonic::body::Body::default());
    let headers = response.headers_mut();
    headers.insert(Status::GRPC_STATUS, (tonic::Code::Unimplemented as i32).into());
    headers.insert(
        http::header::CONTENT_TYPE,
        tonic::metadata::GRPC_CONTENT_TYPE,
    );
    response
}

#[derive(Clone)]
struct GossipService(Arc<NodeState>);

impl NamedService for GossipService {
    const NAME: &'static str = GOSSIP_SERVICE;
}

struct ReadGossipSvc(Arc<NodeState>);

impl UnaryService<ReadGossip> for ReadGossipSvc {
    type Response = Value;
    type Future = BoxFuture<Response<Value>, Status>;

    fn call(&mut self, _request: Request<ReadGossip>) -> Self::Future {
        let state = self.0.clone();
        Box::pin(async move {
            state.gossip_calls.fetch_add(1, Ordering::SeqCst);
            let body = match state.gossip_body.read().clone() {
                Some(body) => body,
                None => json!({ "members": state.members.read().clone() }),
            };
            Ok(Response::new(body))
        })
    }
}

impl<B> tonic::codegen::Service<http::Request<B>> for GossipService
where
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<tonic::body::Body>;
    type Error = std::convert::Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        if req.uri().path() != GOSSIP_READ_PATH {
            return Box::pin(async move { Ok(unimplemented_response()) });
        }

        let state = self.0.clone();
        Box::pin(async move {
            let mut grpc = Grpc::new(JsonCodec::<Value, ReadGossip>::default());
            Ok(grpc.unary(ReadGossipSvc(state), req).await)
        })
    }
}

#[derive(Clone)]
struct OperationsService(Arc<NodeState>);

impl NamedService for OperationsService {
    const NAME: &'static str = OPERATIONS_SERVICE;
}

struct OperationSvc {
    state: Arc<NodeState>,
    method: String,
}

impl ServerStreamingService<Value> for OperationSvc {
    type Response = Value;
    type ResponseStream = BoxStream<'static, Result<Value, Status>>;
    type Future = BoxFuture<Response<Self::ResponseStream>, Status>;

    fn call(&mut self, request: Request<Value>) -> Self::Future {
        let state = self.state.clone();
        let method = self.method.clone();
        Box::pin(async move {
            let metadata = request
                .metadata()
                .clone()
                .into_headers()
                .iter()
                .filter_map(|(key, value)| {
                    Some((key.as_str().to_string(), value.to_str().ok()?.to_string()))
                })
                .collect();
            let call = RecordedCall {
                method,
                metadata,
                payload: request.into_inner(),
            };
            state.calls.lock().push(call.clone());
            let handler = state.handler.read().clone();

            let responses = match handler(&call) {
                Reply::Items(items) => stream::iter(items.into_iter().map(Ok)).boxed(),
                Reply::Fail(status) => return Err(status),
                Reply::Hang => {
                    let stopped = state.shutdown.clone();
                    stream::once(async move {
                        stopped.cancelled().await;
                        Err(Status::unavailable("node stopped"))
                    })
                    .boxed()
                }
            };
            Ok(Response::new(responses))
        })
    }
}

impl<B> tonic::codegen::Service<http::Request<B>> for OperationsService
where
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<tonic::body::Body>;
    type Error = std::convert::Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        let Some(method) = operation_method(req.uri().path()).map(str::to_string) else {
            return Box::pin(async move { Ok(unimplemented_response()) });
        };

        let svc = OperationSvc {
            state: self.0.clone(),
            method,
        };
        Box::pin(async move {
            let mut grpc = Grpc::new(JsonCodec::<Value, Value>::default());
            Ok(grpc.server_streaming(svc, req).await)
        })
    }
}

/// Port on loopback with nothing listening.
pub async fn dead_endpoint() -> Endpoint {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = Endpoint::from(listener.local_addr().unwrap());
    drop(listener);
    endpoint
}

pub fn connectivity(seeds: &[Endpoint]) -> ConnectivitySettings {
    ConnectivitySettings::new(EndpointSet::new(seeds.iter().cloned()))
        .with_gossip_timeout(Duration::from_millis(500))
        .with_discovery_backoff(Duration::from_millis(5), Duration::from_millis(20))
        .with_max_discover_attempts(3)
        .with_dns_discovery(false)
        .with_connect_timeout(Duration::from_millis(500))
}

pub fn client_settings(seeds: &[Endpoint]) -> ClientSettings {
    ClientSettings::new(connectivity(seeds))
}

/// Polls `check` until it holds or about two seconds pass.
pub async fn eventually<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
