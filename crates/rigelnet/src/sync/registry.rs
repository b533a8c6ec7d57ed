use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use super::SyncError;
use super::bitset::ClientBitset;
use super::handlers::{SYNC_CREATE, SYNC_DEACTIVATE, SYNC_DESTROY, SYNC_UPDATE};
use super::id::{SyncFlags, SyncId};
use super::object::{SyncFilter, SynchronizedObject};
use crate::codec::Packet;
use crate::net::{Receivers, Server};

/// Pulse every 2 * 30 cycles unless changed.
pub const DEFAULT_PACEMAKER_PULSE_PERIOD: u32 = 30;

/// One simulation step at 60 Hz.
pub const DEFAULT_STEP_DURATION: Duration = Duration::from_nanos(16_666_667);

struct Entry {
    id: SyncId,
    is_master: bool,
    object: Box<dyn SynchronizedObject>,
    deactivated: ClientBitset,
    skipped: ClientBitset,
    no_diff_skipped: ClientBitset,
}

impl Entry {
    fn new(id: SyncId, is_master: bool, object: Box<dyn SynchronizedObject>) -> Self {
        Self {
            id,
            is_master,
            object,
            deactivated: ClientBitset::default(),
            skipped: ClientBitset::default(),
            no_diff_skipped: ClientBitset::default(),
        }
    }

    fn reset_client(&mut self, client: usize) {
        self.deactivated.set(client, false);
        self.skipped.set(client, false);
        self.no_diff_skipped.set(client, false);
    }
}

/// Owns every synchronized object of a node, keyed by [`SyncId::key`].
pub struct SynchronizedObjectRegistry {
    entries: BTreeMap<SyncId, Entry>,
    newly_created: BTreeSet<SyncId>,
    already_updated: BTreeSet<SyncId>,
    already_destroyed: BTreeSet<SyncId>,
    id_counter: u64,
    default_delay: u32,
    step_duration: Duration,
    pacemaker_pulse_period: u32,
    pacemaker_pulse_countdown: u32,
    alternating_update_flag: bool,
}

impl SynchronizedObjectRegistry {
    pub fn new(default_delay_steps: u32) -> Self {
        Self {
            entries: BTreeMap::new(),
            newly_created: BTreeSet::new(),
            already_updated: BTreeSet::new(),
            already_destroyed: BTreeSet::new(),
            id_counter: 2,
            default_delay: default_delay_steps,
            step_duration: DEFAULT_STEP_DURATION,
            pacemaker_pulse_period: DEFAULT_PACEMAKER_PULSE_PERIOD,
            pacemaker_pulse_countdown: DEFAULT_PACEMAKER_PULSE_PERIOD,
            alternating_update_flag: true,
        }
    }

    pub fn with_step_duration(mut self, step: Duration) -> Self {
        self.step_duration = step;
        self
    }

    pub fn step_duration(&self) -> Duration {
        self.step_duration
    }

    pub fn default_delay(&self) -> u32 {
        self.default_delay
    }

    pub fn set_default_delay(&mut self, steps: u32) {
        self.default_delay = steps;
    }

    /// `period` must be even and at least 2.
    pub fn set_pacemaker_pulse_period(&mut self, period: u32) -> Result<(), SyncError> {
        if period < 2 || period % 2 == 1 {
            return Err(SyncError::InvalidPacemakerPeriod(period));
        }
        self.pacemaker_pulse_period = period / 2;
        self.pacemaker_pulse_countdown = self.pacemaker_pulse_period;
        Ok(())
    }

    /// Whether the most recent [`Self::sync_state_updates`] included
    /// objects that use alternating updates.
    pub fn alternating_updates_flag(&self) -> bool {
        !self.alternating_update_flag
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: SyncId) -> bool {
        self.entries.contains_key(&id.key())
    }

    /// Ids as registered: odd for masters, the master's id for proxies.
    pub fn ids(&self) -> impl Iterator<Item = SyncId> + '_ {
        self.entries.values().map(|entry| entry.id)
    }

    pub fn object(&self, id: SyncId) -> Option<&dyn SynchronizedObject> {
        self.entries.get(&id.key()).map(|entry| entry.object.as_ref())
    }

    pub fn object_mut(&mut self, id: SyncId) -> Option<&mut dyn SynchronizedObject> {
        self.entries
            .get_mut(&id.key())
            .map(|entry| entry.object.as_mut())
    }

    pub fn object_as<T: SynchronizedObject>(&self, id: SyncId) -> Option<&T> {
        self.object(id)?.as_any().downcast_ref()
    }

    pub fn object_as_mut<T: SynchronizedObject>(&mut self, id: SyncId) -> Option<&mut T> {
        self.object_mut(id)?.as_any_mut().downcast_mut()
    }

    pub fn register_master_object(&mut self, object: Box<dyn SynchronizedObject>) -> SyncId {
        let id = SyncId(self.id_counter | 1);
        self.id_counter += 2;

        self.entries.insert(id.key(), Entry::new(id, true, object));
        self.newly_created.insert(id.key());
        log::debug!("Registered master object {}", id);
        id
    }

    pub fn register_dummy_object(
        &mut self,
        object: Box<dyn SynchronizedObject>,
        master_id: SyncId,
    ) -> Result<(), SyncError> {
        if self.contains(master_id) {
            return Err(SyncError::AlreadyMapped(master_id));
        }
        self.entries.insert(master_id.key(), Entry::new(master_id, false, object));
        Ok(())
    }

    /// Removes and returns the object. A master must have synced its
    /// destruction first.
    pub fn unregister_object(&mut self, id: SyncId) -> Result<Box<dyn SynchronizedObject>, SyncError> {
        let key = id.key();
        let entry = self.entries.get(&key).ok_or(SyncError::UnknownObject(id))?;

        if entry.is_master && !self.already_destroyed.remove(&key) {
            return Err(SyncError::DestroyNotSynced(entry.id));
        }

        self.newly_created.remove(&key);
        self.already_updated.remove(&key);
        let entry = self.entries.remove(&key).ok_or(SyncError::UnknownObject(id))?;
        Ok(entry.object)
    }

    pub fn deactivate_object(&mut self, id: SyncId, delay_steps: u32) -> Result<(), SyncError> {
        self.object_mut(id)
            .ok_or(SyncError::UnknownObject(id))?
            .deactivate_in(delay_steps);
        Ok(())
    }

    pub fn is_deactivated_for_client(&self, id: SyncId, client: usize) -> bool {
        self.entries
            .get(&id.key())
            .is_some_and(|entry| entry.deactivated.get(client))
    }

    /// Whether the last update owed to `client` was dropped because nothing changed.
    pub fn is_unchanged_for_client(&self, id: SyncId, client: usize) -> bool {
        self.entries
            .get(&id.key())
            .is_some_and(|entry| entry.no_diff_skipped.get(client))
    }

    /// One sync cycle: pending CREATEs, then an UPDATE for every master not
    /// updated explicitly since the last cycle.
    pub fn sync_state_updates(&mut self, server: &mut Server) -> Result<(), SyncError> {
        let recipients: Vec<usize> = server.connected_clients().collect();

        for key in std::mem::take(&mut self.newly_created) {
            self.send_create(server, key, Receivers::Many(&recipients))?;
        }

        if !self.alternating_update_flag && self.pacemaker_pulse_countdown > 0 {
            self.pacemaker_pulse_countdown -= 1;
        }
        let pulse = self.pacemaker_pulse_countdown == 0;
        let flags = if pulse {
            SyncFlags::PACEMAKER_PULSE
        } else {
            SyncFlags::empty()
        };

        let keys: Vec<SyncId> = self
            .entries
            .values()
            .filter(|entry| entry.is_master)
            .map(|entry| entry.id.key())
            .collect();
        for key in keys {
            if self.already_updated.contains(&key) {
                continue;
            }
            let Some(entry) = self.entries.get(&key) else {
                continue;
            };
            if self.alternating_update_flag || pulse || !entry.object.uses_alternating_updates() {
                self.send_update(server, key, flags, &recipients)?;
            }
        }
        self.already_updated.clear();

        self.alternating_update_flag = !self.alternating_update_flag;
        if pulse {
            self.pacemaker_pulse_countdown = self.pacemaker_pulse_period;
        }
        Ok(())
    }

    /// Brings a single client up to date, typically right after it connects.
    pub fn sync_complete_state(&mut self, server: &mut Server, client: usize) -> Result<(), SyncError> {
        let keys: Vec<SyncId> = self
            .entries
            .values()
            .filter(|entry| entry.is_master)
            .map(|entry| entry.id.key())
            .collect();

        for key in keys {
            self.send_create(server, key, Receivers::One(client))?;
            let Some(entry) = self.entries.get_mut(&key) else {
                continue;
            };
            let state = pack(entry.object.as_ref(), SyncFlags::FULL_STATE);
            server.compose_by_name(
                SYNC_UPDATE,
                Receivers::One(client),
                &(entry.id, SyncFlags::FULL_STATE, state),
            )?;
            entry.reset_client(client);
        }
        Ok(())
    }

    pub fn sync_object_create(&mut self, server: &mut Server, id: SyncId) -> Result<(), SyncError> {
        let key = self.master_key(id)?;
        let recipients: Vec<usize> = server.connected_clients().collect();
        self.send_create(server, key, Receivers::Many(&recipients))?;
        self.newly_created.remove(&key);
        Ok(())
    }

    pub fn sync_object_update(&mut self, server: &mut Server, id: SyncId) -> Result<(), SyncError> {
        let key = self.master_key(id)?;
        let recipients: Vec<usize> = server.connected_clients().collect();

        if self.newly_created.remove(&key) {
            self.send_create(server, key, Receivers::Many(&recipients))?;
        }
        self.send_update(server, key, SyncFlags::empty(), &recipients)?;
        self.already_updated.insert(key);
        Ok(())
    }

    /// Sends whatever CREATE and UPDATE are still owed, then DESTROY.
    pub fn sync_object_destroy(&mut self, server: &mut Server, id: SyncId) -> Result<(), SyncError> {
        let key = self.master_key(id)?;
        let recipients: Vec<usize> = server.connected_clients().collect();

        if self.newly_created.remove(&key) {
            self.send_create(server, key, Receivers::Many(&recipients))?;
        }
        if self.already_updated.insert(key) {
            self.send_update(server, key, SyncFlags::empty(), &recipients)?;
        }

        let master_id = SyncId(key.0 | 1);
        server.compose_by_name(SYNC_DESTROY, Receivers::Many(&recipients), &master_id)?;
        self.already_destroyed.insert(key);
        Ok(())
    }

    fn master_key(&self, id: SyncId) -> Result<SyncId, SyncError> {
        match self.entries.get(&id.key()) {
            Some(entry) if entry.is_master => Ok(id.key()),
            Some(entry) => Err(SyncError::NotMaster(entry.id)),
            None => Err(SyncError::UnknownObject(id)),
        }
    }

    fn send_create(&self, server: &mut Server, key: SyncId, receivers: Receivers<'_>) -> Result<(), SyncError> {
        let Some(entry) = self.entries.get(&key) else {
            return Ok(());
        };
        server.compose_by_name(SYNC_CREATE, receivers, &(entry.id, entry.object.kind()))?;
        Ok(())
    }

    fn send_update(
        &mut self,
        server: &mut Server,
        key: SyncId,
        flags: SyncFlags,
        recipients: &[usize],
    ) -> Result<(), SyncError> {
        let Some(entry) = self.entries.get_mut(&key) else {
            return Ok(());
        };

        let mut regular = Vec::new();
        let mut full = Vec::new();
        for &client in recipients {
            match entry.object.filter(client) {
                SyncFilter::RegularSync => {
                    if entry.skipped.get(client) || entry.deactivated.get(client) {
                        full.push(client);
                    } else {
                        regular.push(client);
                    }
                }
                SyncFilter::Skip => entry.skipped.set(client, true),
                SyncFilter::Deactivate => {
                    if !entry.deactivated.get(client) {
                        server.compose_by_name(SYNC_DEACTIVATE, Receivers::One(client), &entry.id)?;
                        entry.deactivated.set(client, true);
                    }
                }
            }
        }

        if !regular.is_empty() {
            if !flags.contains(SyncFlags::FULL_STATE) && !entry.object.has_changes() {
                for &client in &regular {
                    entry.no_diff_skipped.set(client, true);
                }
            } else {
                let state = pack(entry.object.as_ref(), flags);
                server.compose_by_name(SYNC_UPDATE, Receivers::Many(&regular), &(entry.id, flags, state))?;
                for &client in &regular {
                    entry.no_diff_skipped.set(client, false);
                }
            }
        }

        if !full.is_empty() {
            let full_flags = flags | SyncFlags::FULL_STATE;
            let state = pack(entry.object.as_ref(), full_flags);
            server.compose_by_name(SYNC_UPDATE, Receivers::Many(&full), &(entry.id, full_flags, state))?;
            for &client in &full {
                entry.reset_client(client);
            }
        }

        Ok(())
    }
}

fn pack(object: &dyn SynchronizedObject, flags: SyncFlags) -> Packet {
    let mut state = Packet::new();
    object.pack_state(flags, &mut state);
    state
}

#[cfg(test)]
mod tests {
    use std::any::Any;

    use super::*;

    struct Marker(u32);

    impl SynchronizedObject for Marker {
        fn kind(&self) -> u32 {
            self.0
        }

        fn pack_state(&self, _flags: SyncFlags, out: &mut Packet) {
            out.append(&self.0);
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn master_ids_are_odd_and_step_by_two() {
        let mut registry = SynchronizedObjectRegistry::new(2);
        let a = registry.register_master_object(Box::new(Marker(1)));
        let b = registry.register_master_object(Box::new(Marker(2)));

        assert_eq!(a, SyncId(3));
        assert_eq!(b, SyncId(5));
        assert!(registry.contains(SyncId(4)));
        assert_eq!(registry.object_as::<Marker>(b).map(|m| m.0), Some(2));
    }

    #[test]
    fn unregister_requires_synced_destroy() {
        let mut registry = SynchronizedObjectRegistry::new(2);
        let id = registry.register_master_object(Box::new(Marker(1)));

        assert!(matches!(
            registry.unregister_object(id),
            Err(SyncError::DestroyNotSynced(_))
        ));
        assert!(registry.contains(id));
    }

    #[test]
    fn dummies_unregister_freely() {
        let mut registry = SynchronizedObjectRegistry::new(2);
        registry
            .register_dummy_object(Box::new(Marker(9)), SyncId(11))
            .unwrap();
        assert!(matches!(
            registry.register_dummy_object(Box::new(Marker(9)), SyncId(11)),
            Err(SyncError::AlreadyMapped(_))
        ));

        let object = registry.unregister_object(SyncId(11)).unwrap();
        assert_eq!(object.kind(), 9);
        assert!(registry.is_empty());
    }

    #[test]
    fn pacemaker_period_must_be_even() {
        let mut registry = SynchronizedObjectRegistry::new(2);
        assert!(registry.set_pacemaker_pulse_period(0).is_err());
        assert!(registry.set_pacemaker_pulse_period(3).is_err());
        assert!(registry.set_pacemaker_pulse_period(4).is_ok());
    }

    #[test]
    fn unknown_objects_are_reported() {
        let mut registry = SynchronizedObjectRegistry::new(2);
        assert!(matches!(
            registry.deactivate_object(SyncId(3), 1),
            Err(SyncError::UnknownObject(_))
        ));
        assert!(registry.unregister_object(SyncId(3)).is_err());
    }
}
