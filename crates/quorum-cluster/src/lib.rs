pub mod discovery;
mod channel;
mod codec;
mod connection;
mod gossip;
pub mod protocol;
mod selector;

pub use channel::{ActiveChannel, ChannelManager, Revalidation};
pub use codec::JsonCodec;
pub use connection::{GrpcConnector, GrpcTransport};
pub use discovery::{DiscoveryEngine, DiscoveryState, DnsResolver, StaticResolver};
pub use gossip::GrpcGossipClient;
pub use protocol::{
    operation_method, operation_path, ClusterInfo, ReadGossip, GOSSIP_READ_PATH, GOSSIP_SERVICE,
    MAX_MESSAGE_SIZE, OPERATIONS_SERVICE,
};
pub use selector::NodeSelector;
