use serde::{Deserialize, Serialize};
use tonic::codegen::http::uri::PathAndQuery;
use tonic::Status;

use quorum_core::ClusterMember;

pub const GOSSIP_SERVICE: &str = "quorum.Gossip";
pub const GOSSIP_READ_PATH: &str = "/quorum.Gossip/Read";
pub const OPERATIONS_SERVICE: &str = "quorum.Operations";

/// Largest message either side accepts.
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Request of `quorum.Gossip/Read`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadGossip {}

/// Response of `quorum.Gossip/Read`: the node's current view of the cluster.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub members: Vec<ClusterMember>,
}

/// Every remote operation is a server-streaming method of `quorum.Operations`.
pub fn operation_path(method: &str) -> Result<PathAndQuery, Status> {
    PathAndQuery::try_from(format!("/{}/{}", OPERATIONS_SERVICE, method))
        .map_err(|e| Status::invalid_argument(format!("invalid method name {:?}: {}", method, e)))
}

/// Operation name addressed by a request path.
pub fn operation_method(path: &str) -> Option<&str> {
    path.strip_prefix('/')?
        .strip_prefix(OPERATIONS_SERVICE)?
        .strip_prefix('/')
        .filter(|method| !method.is_empty())
}
