mod client;
mod config;
mod connector;
mod endpoint;
mod error;
mod local;
mod protocol;
mod recv_buffer;
mod remote;
mod send_buffer;
mod server;
mod stats;

pub use client::Client;
pub use config::NodeConfig;
pub use connector::{AcceptOutcome, Connector, ConnectorStatus, hello_passphrase};
pub use endpoint::{NetworkEndpoint, SendStatus};
pub use error::NetError;
pub use local::LocalLinkEnd;
pub use protocol::{
    DEFAULT_MAX_PACKET_SIZE, DEFAULT_PORT, DEFAULT_TIMEOUT, MAX_MAX_PACKET_SIZE, MIN_MAX_PACKET_SIZE,
    PacketKind, PacketOrdinal, ProtocolError,
};
pub use remote::RemoteInfo;
pub use send_buffer::{RetransmitPredicate, default_retransmit_predicate};
pub use server::{Receivers, Server, UpdateMode};
pub use stats::{PacketLossSimulation, Telemetry};
