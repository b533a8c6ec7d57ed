use std::io;

/// Misuse of the node API or a socket failure outside any one connection.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("node is already running")]
    AlreadyRunning,
    #[error("node is not running")]
    NotRunning,
    #[error("connector is already in use")]
    AlreadyConnected,
    #[error("client {0} is not connected")]
    NotConnected(usize),
    #[error("client is not connected")]
    NotConnectedToServer,
    #[error("client index {index} is out of range for a server of size {size}")]
    InvalidClientIndex { index: usize, size: usize },
    #[error("no free client slot")]
    NoFreeSlot,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
}
