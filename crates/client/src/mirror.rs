use std::any::Any;

use glam::Vec3;
use rigelnet::sync::{ProxyHost, ProxyRuntime};
use rigelnet::{ExtractError, Packet, SyncFlags, SyncId, SynchronizedObject, SynchronizedObjectRegistry};

pub const ORBITER_KIND: u32 = 1;

/// Client-side copy of a server orbiter.
#[derive(Debug, Default)]
pub struct OrbiterProxy {
    pub position: Vec3,
    pub radius: f32,
    pub angular_speed: f32,
    pub updates: u32,
    pub active: bool,
}

impl SynchronizedObject for OrbiterProxy {
    fn kind(&self) -> u32 {
        ORBITER_KIND
    }

    fn pack_state(&self, _flags: SyncFlags, _out: &mut Packet) {}

    fn apply_state(&mut self, state: &mut Packet, flags: SyncFlags, _delay_steps: u32) -> Result<(), ExtractError> {
        let (x, y, z) = state.extract::<(f32, f32, f32)>()?;
        self.position = Vec3::new(x, y, z);
        if flags.contains(SyncFlags::FULL_STATE) {
            let (radius, angular_speed) = state.extract::<(f32, f32)>()?;
            self.radius = radius;
            self.angular_speed = angular_speed;
        }
        self.updates += 1;
        self.active = true;
        Ok(())
    }

    fn deactivate_in(&mut self, _delay_steps: u32) {
        self.active = false;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Builds proxies and keeps destroyed ones around until their delay runs out.
#[derive(Default)]
pub struct Spawner {
    retiring: Vec<(Box<dyn SynchronizedObject>, u32)>,
    pub created: u64,
    pub destroyed: u64,
}

impl Spawner {
    pub fn step(&mut self) {
        let before = self.retiring.len();
        self.retiring.retain_mut(|(_, steps)| {
            *steps = steps.saturating_sub(1);
            *steps > 0
        });
        self.destroyed += (before - self.retiring.len()) as u64;
    }

    pub fn retiring(&self) -> usize {
        self.retiring.len()
    }
}

impl ProxyRuntime for Spawner {
    fn create_proxy(&mut self, kind: u32, id: SyncId) -> Option<Box<dyn SynchronizedObject>> {
        if kind != ORBITER_KIND {
            log::warn!("Server sent object {} of unknown kind {}", id, kind);
            return None;
        }
        self.created += 1;
        Some(Box::new(OrbiterProxy::default()))
    }

    fn destroy_proxy(&mut self, object: Box<dyn SynchronizedObject>, delay_steps: u32) {
        if delay_steps == 0 {
            self.destroyed += 1;
        } else {
            self.retiring.push((object, delay_steps));
        }
    }
}

/// Client user data: the proxy registry plus the runtime that owns
/// retiring proxies.
pub struct Mirror {
    pub objects: SynchronizedObjectRegistry,
    pub spawner: Spawner,
}

impl Mirror {
    pub fn new(default_delay_steps: u32) -> Self {
        Self {
            objects: SynchronizedObjectRegistry::new(default_delay_steps),
            spawner: Spawner::default(),
        }
    }

    pub fn orbiters(&self) -> impl Iterator<Item = (SyncId, &OrbiterProxy)> {
        self.objects
            .ids()
            .filter_map(|id| self.objects.object_as::<OrbiterProxy>(id).map(|o| (id, o)))
    }
}

impl ProxyHost for Mirror {
    fn sync_parts(&mut self) -> (&mut SynchronizedObjectRegistry, &mut dyn ProxyRuntime) {
        (&mut self.objects, &mut self.spawner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_state_sets_orbit() {
        let mut proxy = OrbiterProxy::default();
        let mut state = Packet::new();
        state.append(&(1.0f32, 2.0f32, 3.0f32)).append(&(9.0f32, 0.5f32));

        proxy.apply_state(&mut state, SyncFlags::FULL_STATE, 0).unwrap();
        assert_eq!(proxy.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(proxy.radius, 9.0);
        assert!(proxy.active);
    }

    #[test]
    fn test_truncated_state_is_an_error() {
        let mut proxy = OrbiterProxy::default();
        let mut state = Packet::new();
        state.append(&1.0f32);
        assert!(proxy.apply_state(&mut state, SyncFlags::empty(), 0).is_err());
    }

    #[test]
    fn test_retiring_proxies_wait_out_their_delay() {
        let mut spawner = Spawner::default();
        spawner.destroy_proxy(Box::new(OrbiterProxy::default()), 2);
        spawner.destroy_proxy(Box::new(OrbiterProxy::default()), 0);
        assert_eq!(spawner.destroyed, 1);
        assert_eq!(spawner.retiring(), 1);

        spawner.step();
        assert_eq!(spawner.retiring(), 1);
        spawner.step();
        assert_eq!(spawner.retiring(), 0);
        assert_eq!(spawner.destroyed, 2);
    }
}
