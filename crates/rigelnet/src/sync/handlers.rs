use std::marker::PhantomData;

use super::id::{SyncFlags, SyncId};
use super::object::{ProxyHost, ProxyRuntime};
use super::registry::SynchronizedObjectRegistry;
use crate::codec::Packet;
use crate::net::{Client, RemoteInfo};
use crate::rpc::{HandlerRegistryBuilder, NodeRef, Rpc, RpcError};

pub const SYNC_CREATE: &str = "rigelnet::sync_create";
pub const SYNC_UPDATE: &str = "rigelnet::sync_update";
pub const SYNC_DESTROY: &str = "rigelnet::sync_destroy";
pub const SYNC_DEACTIVATE: &str = "rigelnet::sync_deactivate";

/// Finds the proxy registry inside a client.
trait HostLookup: 'static {
    fn lookup(client: &mut Client) -> Option<(&mut SynchronizedObjectRegistry, &mut dyn ProxyRuntime)>;
}

struct UserDataHost<C>(PhantomData<fn() -> C>);

impl<C: ProxyHost> HostLookup for UserDataHost<C> {
    fn lookup(client: &mut Client) -> Option<(&mut SynchronizedObjectRegistry, &mut dyn ProxyRuntime)> {
        client.user_data_mut::<C>().map(|host| host.sync_parts())
    }
}

/// Used on servers, where the sync messages are only ever sent.
struct NoHost;

impl HostLookup for NoHost {
    fn lookup(_client: &mut Client) -> Option<(&mut SynchronizedObjectRegistry, &mut dyn ProxyRuntime)> {
        None
    }
}

struct SyncCreate<H>(PhantomData<H>);
struct SyncUpdate<H>(PhantomData<H>);
struct SyncDestroy<H>(PhantomData<H>);
struct SyncDeactivate<H>(PhantomData<H>);

fn missing_host() -> RpcError {
    RpcError::Failed("client has no proxy host".to_owned())
}

struct Latencies {
    mean: std::time::Duration,
    pessimistic: std::time::Duration,
}

fn server_latencies(client: &Client) -> Latencies {
    let remote = client.server_connector().remote_info();
    Latencies {
        mean: remote.mean_latency,
        pessimistic: remote.pessimistic_latency,
    }
}

impl<H: HostLookup> Rpc for SyncCreate<H> {
    const NAME: &'static str = SYNC_CREATE;
    type Args = (SyncId, u32);

    fn handle(node: NodeRef<'_>, (id, kind): Self::Args) -> Result<(), RpcError> {
        let client = node.require_client()?;
        let (registry, runtime) = H::lookup(client).ok_or_else(missing_host)?;

        if registry.contains(id) {
            log::debug!("Proxy for {} already exists", id);
            return Ok(());
        }
        match runtime.create_proxy(kind, id) {
            Some(proxy) => registry
                .register_dummy_object(proxy, id)
                .map_err(|e| RpcError::Failed(e.to_string())),
            None => {
                log::warn!("No proxy for object {} of kind {}", id, kind);
                Ok(())
            }
        }
    }
}

impl<H: HostLookup> Rpc for SyncUpdate<H> {
    const NAME: &'static str = SYNC_UPDATE;
    type Args = (SyncId, SyncFlags, Packet);

    fn handle(node: NodeRef<'_>, (id, flags, mut state): Self::Args) -> Result<(), RpcError> {
        let client = node.require_client()?;
        let latencies = server_latencies(client);
        let (registry, _) = H::lookup(client).ok_or_else(missing_host)?;

        let delay = RemoteInfo::latency_in_steps(latencies.pessimistic, registry.step_duration());
        match registry.object_mut(id) {
            Some(proxy) => proxy.apply_state(&mut state, flags, delay).map_err(RpcError::from),
            None => {
                log::debug!("Update for unknown object {}", id);
                Ok(())
            }
        }
    }
}

impl<H: HostLookup> Rpc for SyncDestroy<H> {
    const NAME: &'static str = SYNC_DESTROY;
    type Args = SyncId;

    fn handle(node: NodeRef<'_>, id: Self::Args) -> Result<(), RpcError> {
        let client = node.require_client()?;
        let latencies = server_latencies(client);
        let (registry, runtime) = H::lookup(client).ok_or_else(missing_host)?;

        if !registry.contains(id) {
            log::debug!("Destroy for unknown object {}", id);
            return Ok(());
        }
        let mean_steps = RemoteInfo::latency_in_steps(latencies.mean, registry.step_duration());
        let delay = registry.default_delay().saturating_sub(mean_steps + 1);
        let proxy = registry
            .unregister_object(id)
            .map_err(|e| RpcError::Failed(e.to_string()))?;
        runtime.destroy_proxy(proxy, delay);
        Ok(())
    }
}

impl<H: HostLookup> Rpc for SyncDeactivate<H> {
    const NAME: &'static str = SYNC_DEACTIVATE;
    type Args = SyncId;

    fn handle(node: NodeRef<'_>, id: Self::Args) -> Result<(), RpcError> {
        let client = node.require_client()?;
        let latencies = server_latencies(client);
        let (registry, _) = H::lookup(client).ok_or_else(missing_host)?;

        let delay = RemoteInfo::latency_in_steps(latencies.pessimistic, registry.step_duration());
        match registry.object_mut(id) {
            Some(proxy) => proxy.deactivate_in(delay),
            None => log::debug!("Deactivate for unknown object {}", id),
        }
        Ok(())
    }
}

/// Registers the sync messages for a client whose user data is `C`.
pub fn register_sync_rpcs<C: ProxyHost>(
    builder: HandlerRegistryBuilder,
) -> Result<HandlerRegistryBuilder, RpcError> {
    builder
        .register::<SyncCreate<UserDataHost<C>>>()?
        .register::<SyncUpdate<UserDataHost<C>>>()?
        .register::<SyncDestroy<UserDataHost<C>>>()?
        .register::<SyncDeactivate<UserDataHost<C>>>()
}

/// Registers the same names for the sending side so handler ids line up.
pub fn register_master_sync_rpcs(
    builder: HandlerRegistryBuilder,
) -> Result<HandlerRegistryBuilder, RpcError> {
    builder
        .register::<SyncCreate<NoHost>>()?
        .register::<SyncUpdate<NoHost>>()?
        .register::<SyncDestroy<NoHost>>()?
        .register::<SyncDeactivate<NoHost>>()
}
