use std::any::Any;

use super::id::{SyncFlags, SyncId};
use super::registry::SynchronizedObjectRegistry;
use crate::codec::{ExtractError, Packet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncFilter {
    RegularSync,
    /// Send nothing this cycle.
    Skip,
    /// Send nothing and deactivate the client's proxy.
    Deactivate,
}

/// An object mirrored from a server to its clients.
///
/// The same trait serves both sides: masters pack their state, proxies
/// apply it.
pub trait SynchronizedObject: Any {
    /// Type tag sent in CREATE so the client knows which proxy to build.
    fn kind(&self) -> u32;

    fn filter(&self, _client: usize) -> SyncFilter {
        SyncFilter::RegularSync
    }

    fn has_changes(&self) -> bool {
        true
    }

    /// Alternating objects are updated every other cycle, plus on pacemaker pulses.
    fn uses_alternating_updates(&self) -> bool {
        false
    }

    fn pack_state(&self, flags: SyncFlags, out: &mut Packet);

    fn apply_state(
        &mut self,
        _state: &mut Packet,
        _flags: SyncFlags,
        _delay_steps: u32,
    ) -> Result<(), ExtractError> {
        Ok(())
    }

    fn deactivate_in(&mut self, _delay_steps: u32) {}

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Builds and tears down proxies on the client.
pub trait ProxyRuntime {
    fn create_proxy(&mut self, kind: u32, id: SyncId) -> Option<Box<dyn SynchronizedObject>>;

    fn destroy_proxy(&mut self, object: Box<dyn SynchronizedObject>, delay_steps: u32);
}

/// Client user data that owns the proxy registry and runtime.
pub trait ProxyHost: 'static {
    fn sync_parts(&mut self) -> (&mut SynchronizedObjectRegistry, &mut dyn ProxyRuntime);
}
