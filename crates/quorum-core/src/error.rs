use thiserror::Error;
use tonic::Code;

use crate::types::{Endpoint, NodePreference};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("endpoint {endpoint} unreachable: {reason}")]
    Unreachable { endpoint: String, reason: String },

    #[error("malformed gossip from {endpoint}: {reason}")]
    Malformed { endpoint: String, reason: String },

    #[error("no member eligible for preference {preference}")]
    NoEligibleNode { preference: NodePreference },

    #[error("discovery exhausted after {attempts} attempts ({unreachable} unreachable candidates)")]
    DiscoveryExhausted { attempts: u32, unreachable: usize },

    #[error("operation failed ({code:?}): {message}")]
    OperationFailed { code: Code, message: String },

    #[error("user '{login_name}' not found")]
    UserNotFound { login_name: String },

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("not leader{}", .leader.as_ref().map(|l| format!(", leader is {}", l)).unwrap_or_default())]
    NotLeader { leader: Option<Endpoint> },

    #[error("transport unavailable: {0}")]
    Unavailable(String),

    #[error("deadline exceeded after {timeout_ms}ms")]
    DeadlineExceeded { timeout_ms: u64 },

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("client disposed")]
    Disposed,

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Failures reported by the server for an operation that did execute.
    pub fn is_operation_failure(&self) -> bool {
        matches!(
            self,
            Error::OperationFailed { .. }
                | Error::UserNotFound { .. }
                | Error::AccessDenied(_)
                | Error::NotLeader { .. }
        )
    }

    /// The node behind the channel can no longer serve calls under the current preference.
    pub fn invalidates_channel(&self) -> bool {
        matches!(self, Error::NotLeader { .. } | Error::Unavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
