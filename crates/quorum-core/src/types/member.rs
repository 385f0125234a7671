use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::types::Endpoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MemberState {
    Leader,
    Follower,
    ReadOnlyReplica,
    PreLeader,
    PreReplica,
    ResigningLeader,
    ShuttingDown,
    Manager,
    ShutDown,
    Unknown,
    DiscoverLeader,
}

/// One entry of a gossip response. Replaced wholesale on every gossip, never updated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterMember {
    pub endpoint: Endpoint,
    pub state: MemberState,
    #[serde(rename = "isAlive")]
    pub is_alive: bool,
}

impl ClusterMember {
    pub fn new(endpoint: Endpoint, state: MemberState, is_alive: bool) -> Self {
        Self {
            endpoint,
            state,
            is_alive,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodePreference {
    #[default]
    Leader,
    Follower,
    ReadOnlyReplica,
    Random,
}

impl NodePreference {
    pub fn accepts(&self, member: &ClusterMember) -> bool {
        if !member.is_alive {
            return false;
        }
        match self {
            NodePreference::Leader => member.state == MemberState::Leader,
            NodePreference::Follower => member.state == MemberState::Follower,
            NodePreference::ReadOnlyReplica => member.state == MemberState::ReadOnlyReplica,
            NodePreference::Random => true,
        }
    }
}

impl fmt::Display for NodePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodePreference::Leader => "leader",
            NodePreference::Follower => "follower",
            NodePreference::ReadOnlyReplica => "read_only_replica",
            NodePreference::Random => "random",
        };
        f.write_str(name)
    }
}

impl FromStr for NodePreference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "leader" => Ok(NodePreference::Leader),
            "follower" => Ok(NodePreference::Follower),
            "readonlyreplica" => Ok(NodePreference::ReadOnlyReplica),
            "random" => Ok(NodePreference::Random),
            other => Err(Error::Config(format!("unknown node preference '{}'", other))),
        }
    }
}
