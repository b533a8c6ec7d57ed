mod node;
mod registry;

pub use node::NodeRef;
pub use registry::{
    HandlerFn, HandlerId, HandlerRegistry, HandlerRegistryBuilder, Rpc, dispatch, encode_call,
};

use crate::codec::ExtractError;
use crate::net::NetError;

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The message is not allowed on this node or in this state.
    #[error("illegal message: {0}")]
    IllegalMessage(String),
    #[error("unknown handler id {0}")]
    UnknownHandler(HandlerId),
    #[error("handler {0} is not registered")]
    Unregistered(&'static str),
    #[error("handler {0} is registered twice")]
    Duplicate(&'static str),
    #[error("{0} handlers do not fit the id space")]
    TooManyHandlers(usize),
    #[error("bad arguments: {0}")]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Net(#[from] NetError),
    #[error("handler failed: {0}")]
    Failed(String),
}
