use std::any::Any;
use std::f32::consts::TAU;

use glam::Vec3;
use rigelnet::{Packet, SyncFlags, SynchronizedObject};

pub const ORBITER_KIND: u32 = 1;

/// Orbits wider than this only update every other sync cycle.
const FAR_RADIUS: f32 = 20.0;

/// A body circling a fixed center. Every fourth one stands still.
#[derive(Debug, Clone)]
pub struct Orbiter {
    center: Vec3,
    radius: f32,
    angular_speed: f32,
    angle: f32,
    moved: bool,
}

impl Orbiter {
    pub fn new(index: usize) -> Self {
        let ring = (index / 4) as f32;
        let angular_speed = if index % 4 == 3 {
            0.0
        } else {
            0.5 + 0.25 * (index % 4) as f32
        };

        Self {
            center: Vec3::new(0.0, ring * 2.0, 0.0),
            radius: 5.0 + ring * 8.0,
            angular_speed,
            angle: index as f32 * TAU / 7.0,
            moved: true,
        }
    }

    pub fn advance(&mut self, dt: f32) {
        if self.angular_speed == 0.0 {
            self.moved = false;
            return;
        }
        self.angle = (self.angle + self.angular_speed * dt) % TAU;
        self.moved = true;
    }

    pub fn position(&self) -> Vec3 {
        let (sin, cos) = self.angle.sin_cos();
        self.center + Vec3::new(cos * self.radius, 0.0, sin * self.radius)
    }
}

impl SynchronizedObject for Orbiter {
    fn kind(&self) -> u32 {
        ORBITER_KIND
    }

    fn has_changes(&self) -> bool {
        self.moved
    }

    fn uses_alternating_updates(&self) -> bool {
        self.radius > FAR_RADIUS
    }

    fn pack_state(&self, flags: SyncFlags, out: &mut Packet) {
        let position = self.position();
        out.append(&(position.x, position.y, position.z));
        if flags.contains(SyncFlags::FULL_STATE) {
            out.append(&(self.radius, self.angular_speed));
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stationary_orbiter_reports_no_changes() {
        let mut orbiter = Orbiter::new(3);
        orbiter.advance(0.1);
        assert!(!orbiter.has_changes());

        let mut moving = Orbiter::new(0);
        let before = moving.position();
        moving.advance(0.1);
        assert!(moving.has_changes());
        assert!(moving.position().distance(before) > 0.0);
    }

    #[test]
    fn test_full_state_carries_orbit() {
        let orbiter = Orbiter::new(5);
        let mut regular = Packet::new();
        orbiter.pack_state(SyncFlags::empty(), &mut regular);
        let mut full = Packet::new();
        orbiter.pack_state(SyncFlags::FULL_STATE, &mut full);

        assert_eq!(regular.len(), 12);
        assert_eq!(full.len(), 20);
    }

    #[test]
    fn test_outer_rings_alternate() {
        assert!(!Orbiter::new(0).uses_alternating_updates());
        assert!(Orbiter::new(8).uses_alternating_updates());
    }
}
