use super::RpcError;
use crate::net::{Client, Server};

/// The node a handler runs on.
pub enum NodeRef<'a> {
    Server(&'a mut Server),
    Client(&'a mut Client),
}

impl<'a> NodeRef<'a> {
    pub fn reborrow(&mut self) -> NodeRef<'_> {
        match self {
            NodeRef::Server(server) => NodeRef::Server(&mut **server),
            NodeRef::Client(client) => NodeRef::Client(&mut **client),
        }
    }

    pub fn is_server(&self) -> bool {
        matches!(self, NodeRef::Server(_))
    }

    pub fn is_client(&self) -> bool {
        matches!(self, NodeRef::Client(_))
    }

    pub fn call_if_server<T>(self, f: impl FnOnce(&mut Server) -> T) -> Option<T> {
        match self {
            NodeRef::Server(server) => Some(f(server)),
            NodeRef::Client(_) => None,
        }
    }

    pub fn call_if_client<T>(self, f: impl FnOnce(&mut Client) -> T) -> Option<T> {
        match self {
            NodeRef::Client(client) => Some(f(client)),
            NodeRef::Server(_) => None,
        }
    }

    pub fn require_server(self) -> Result<&'a mut Server, RpcError> {
        match self {
            NodeRef::Server(server) => Ok(server),
            NodeRef::Client(_) => Err(RpcError::IllegalMessage(
                "message is only valid on a server".to_owned(),
            )),
        }
    }

    pub fn require_client(self) -> Result<&'a mut Client, RpcError> {
        match self {
            NodeRef::Client(client) => Ok(client),
            NodeRef::Server(_) => Err(RpcError::IllegalMessage(
                "message is only valid on a client".to_owned(),
            )),
        }
    }
}
