use std::collections::BTreeMap;

use super::node::NodeRef;
use super::RpcError;
use crate::codec::{Decode, Encode, Packet};

pub type HandlerId = u16;

/// A remotely callable procedure.
///
/// Both ends must register the same set of names; ids are derived from the
/// sorted name list.
pub trait Rpc: 'static {
    const NAME: &'static str;
    type Args: Encode + Decode;

    fn handle(node: NodeRef<'_>, args: Self::Args) -> Result<(), RpcError>;
}

pub type HandlerFn = fn(NodeRef<'_>, &mut Packet) -> Result<(), RpcError>;

fn decode_and_handle<R: Rpc>(node: NodeRef<'_>, payload: &mut Packet) -> Result<(), RpcError> {
    let args = payload.extract::<R::Args>()?;
    R::handle(node, args)
}

#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: BTreeMap<&'static str, HandlerFn>,
}

impl HandlerRegistryBuilder {
    pub fn register<R: Rpc>(mut self) -> Result<Self, RpcError> {
        if self.handlers.contains_key(R::NAME) {
            return Err(RpcError::Duplicate(R::NAME));
        }
        self.handlers.insert(R::NAME, decode_and_handle::<R>);
        Ok(self)
    }

    pub fn build(self) -> Result<HandlerRegistry, RpcError> {
        if self.handlers.len() > HandlerId::MAX as usize {
            return Err(RpcError::TooManyHandlers(self.handlers.len()));
        }

        let (names, handlers): (Vec<_>, Vec<_>) = self.handlers.into_iter().unzip();
        for (id, name) in names.iter().enumerate() {
            log::debug!("RPC handler {:>4} = {}", id, name);
        }
        Ok(HandlerRegistry { names, handlers })
    }
}

/// Table of RPC handlers, indexed by name order.
pub struct HandlerRegistry {
    names: Vec<&'static str>,
    handlers: Vec<HandlerFn>,
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    pub fn empty() -> Self {
        Self {
            names: Vec::new(),
            handlers: Vec::new(),
        }
    }

    pub fn id_of_name(&self, name: &'static str) -> Result<HandlerId, RpcError> {
        self.names
            .binary_search(&name)
            .map(|index| index as HandlerId)
            .map_err(|_| RpcError::Unregistered(name))
    }

    pub fn id_of<R: Rpc>(&self) -> Result<HandlerId, RpcError> {
        self.id_of_name(R::NAME)
    }

    pub fn handler(&self, id: HandlerId) -> Option<HandlerFn> {
        self.handlers.get(id as usize).copied()
    }

    pub fn name_of(&self, id: HandlerId) -> Option<&'static str> {
        self.names.get(id as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Writes one `[id][args]` record.
pub fn encode_call<A: Encode + ?Sized>(id: HandlerId, args: &A) -> Packet {
    let mut record = Packet::new();
    record.append(&id).append(args);
    record
}

/// Runs every `[id][args]` record in `payload` in order.
pub fn dispatch(
    registry: &HandlerRegistry,
    mut node: NodeRef<'_>,
    payload: &mut Packet,
) -> Result<(), RpcError> {
    while !payload.end_of_packet() {
        let id: HandlerId = payload.extract()?;
        let handler = registry.handler(id).ok_or(RpcError::UnknownHandler(id))?;
        handler(node.reborrow(), payload)?;
    }
    Ok(())
}
