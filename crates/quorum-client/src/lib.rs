mod client;
pub mod config;
mod dispatcher;
pub mod exceptions;
pub mod metadata;
pub mod users;

pub use client::QuorumClient;
pub use config::ClientConfig;
pub use dispatcher::{CallDispatcher, ResponseStream};
pub use exceptions::ExceptionMap;
pub use users::{UserDetails, UserManagementClient};

pub use quorum_core::{
    ClientSettings, ConnectivitySettings, Credentials, Endpoint, EndpointSet, Error,
    NodePreference, OperationOptions, Result,
};
