mod bitset;
mod handlers;
mod id;
mod object;
mod registry;

pub use handlers::{
    SYNC_CREATE, SYNC_DEACTIVATE, SYNC_DESTROY, SYNC_UPDATE, register_master_sync_rpcs,
    register_sync_rpcs,
};
pub use id::{SyncFlags, SyncId};
pub use object::{ProxyHost, ProxyRuntime, SyncFilter, SynchronizedObject};
pub use registry::{DEFAULT_PACEMAKER_PULSE_PERIOD, DEFAULT_STEP_DURATION, SynchronizedObjectRegistry};

use crate::rpc::RpcError;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("unknown object {0}")]
    UnknownObject(SyncId),
    #[error("object {0} is a proxy")]
    NotMaster(SyncId),
    #[error("object {0} was unregistered before its destruction was synced")]
    DestroyNotSynced(SyncId),
    #[error("pacemaker pulse period must be even and at least 2, got {0}")]
    InvalidPacemakerPeriod(u32),
    #[error("object {0} is already mapped")]
    AlreadyMapped(SyncId),
    #[error(transparent)]
    Rpc(#[from] RpcError),
}
