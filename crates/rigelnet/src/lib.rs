pub mod codec;
pub mod event;
pub mod net;
pub mod rpc;
pub mod sync;

pub use codec::{Decode, Encode, ExtractError, Packet};
pub use event::{ConnectAttemptFailedReason, DisconnectReason, Event, EventListener, EventQueue};
pub use net::{
    Client, ConnectorStatus, DEFAULT_PORT, NetError, NodeConfig, PacketLossSimulation, Receivers,
    Server, Telemetry, UpdateMode,
};
pub use rpc::{HandlerRegistry, NodeRef, Rpc, RpcError};
pub use sync::{SyncError, SyncFlags, SyncId, SynchronizedObject, SynchronizedObjectRegistry};
