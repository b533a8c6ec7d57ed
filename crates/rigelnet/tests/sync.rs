use std::any::Any;
use std::sync::Arc;

use rigelnet::net::RemoteInfo;
use rigelnet::sync::{
    DEFAULT_STEP_DURATION, ProxyHost, ProxyRuntime, SyncFilter, register_master_sync_rpcs,
    register_sync_rpcs,
};
use rigelnet::{
    Client, ExtractError, HandlerRegistry, NodeConfig, Packet, Server, SyncError, SyncFlags,
    SyncId, SynchronizedObject, SynchronizedObjectRegistry, UpdateMode,
};

const COUNTER_KIND: u32 = 7;

#[derive(Default)]
struct Counter {
    value: u32,
    alternating: bool,
    changed: bool,
    deactivate_for_all: bool,
    deactivate_for: Option<usize>,
    skip_for: Option<usize>,
    applied: u32,
    last_flags: SyncFlags,
    last_delay: u32,
    deactivated_in: Option<u32>,
}

impl SynchronizedObject for Counter {
    fn kind(&self) -> u32 {
        COUNTER_KIND
    }

    fn filter(&self, client: usize) -> SyncFilter {
        if self.deactivate_for_all || self.deactivate_for == Some(client) {
            SyncFilter::Deactivate
        } else if self.skip_for == Some(client) {
            SyncFilter::Skip
        } else {
            SyncFilter::RegularSync
        }
    }

    fn has_changes(&self) -> bool {
        self.changed
    }

    fn uses_alternating_updates(&self) -> bool {
        self.alternating
    }

    fn pack_state(&self, _flags: SyncFlags, out: &mut Packet) {
        out.append(&self.value);
    }

    fn apply_state(&mut self, state: &mut Packet, flags: SyncFlags, delay_steps: u32) -> Result<(), ExtractError> {
        self.value = state.extract()?;
        self.applied += 1;
        self.last_flags = flags;
        self.last_delay = delay_steps;
        Ok(())
    }

    fn deactivate_in(&mut self, delay_steps: u32) {
        self.deactivated_in = Some(delay_steps);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Default)]
struct Spawner {
    destroyed: Vec<(u32, u32)>,
}

impl ProxyRuntime for Spawner {
    fn create_proxy(&mut self, kind: u32, _id: SyncId) -> Option<Box<dyn SynchronizedObject>> {
        (kind == COUNTER_KIND).then(|| Box::new(Counter::default()) as Box<dyn SynchronizedObject>)
    }

    fn destroy_proxy(&mut self, object: Box<dyn SynchronizedObject>, delay_steps: u32) {
        let value = object
            .as_any()
            .downcast_ref::<Counter>()
            .map_or(0, |c| c.value);
        self.destroyed.push((value, delay_steps));
    }
}

struct Mirror {
    registry: SynchronizedObjectRegistry,
    spawner: Spawner,
}

impl ProxyHost for Mirror {
    fn sync_parts(&mut self) -> (&mut SynchronizedObjectRegistry, &mut dyn ProxyRuntime) {
        (&mut self.registry, &mut self.spawner)
    }
}

fn join(server: &mut Server) -> Client {
    let client_rpcs = register_sync_rpcs::<Mirror>(HandlerRegistry::builder())
        .unwrap()
        .build()
        .unwrap();
    let mut client = Client::new(NodeConfig::new("sync"), Arc::new(client_rpcs)).unwrap();
    client.set_user_data(Mirror {
        registry: SynchronizedObjectRegistry::new(4),
        spawner: Spawner::default(),
    });
    client.connect_local(server).unwrap();
    client
}

fn setup() -> (Server, Client, SynchronizedObjectRegistry) {
    let server_rpcs = register_master_sync_rpcs(HandlerRegistry::builder())
        .unwrap()
        .build()
        .unwrap();

    let mut server = Server::new(NodeConfig::new("sync"), 2, Arc::new(server_rpcs)).unwrap();
    server.start(0).unwrap();
    let client = join(&mut server);

    (server, client, SynchronizedObjectRegistry::new(4))
}

fn deliver_all(server: &mut Server, clients: &mut [&mut Client]) {
    server.update(UpdateMode::Send);
    for client in clients.iter_mut() {
        client.update(UpdateMode::Receive);
    }
}

fn deliver(server: &mut Server, client: &mut Client) {
    server.update(UpdateMode::Send);
    client.update(UpdateMode::Receive);
}

fn proxy(client: &Client, id: SyncId) -> Option<&Counter> {
    client
        .user_data::<Mirror>()?
        .registry
        .object_as::<Counter>(id)
}

#[test]
fn test_create_precedes_first_update() {
    let (mut server, mut client, mut masters) = setup();
    let id = masters.register_master_object(Box::new(Counter {
        value: 42,
        changed: true,
        ..Default::default()
    }));

    masters.sync_state_updates(&mut server).unwrap();
    deliver(&mut server, &mut client);

    let counter = proxy(&client, id).expect("proxy created");
    assert_eq!(counter.value, 42);
    assert_eq!(counter.applied, 1);

    let expected = RemoteInfo::latency_in_steps(
        client.server_connector().remote_info().pessimistic_latency,
        DEFAULT_STEP_DURATION,
    );
    assert_eq!(counter.last_delay, expected);
    assert!(client.is_running());
}

#[test]
fn test_unchanged_objects_are_not_resent() {
    let (mut server, mut client, mut masters) = setup();
    let id = masters.register_master_object(Box::new(Counter {
        value: 1,
        changed: true,
        ..Default::default()
    }));
    masters.sync_state_updates(&mut server).unwrap();
    deliver(&mut server, &mut client);

    assert!(!masters.is_unchanged_for_client(id, 0));

    masters.object_as_mut::<Counter>(id).unwrap().changed = false;
    masters.sync_state_updates(&mut server).unwrap();
    deliver(&mut server, &mut client);
    assert_eq!(proxy(&client, id).unwrap().applied, 1);
    assert!(masters.is_unchanged_for_client(id, 0));

    let master = masters.object_as_mut::<Counter>(id).unwrap();
    master.changed = true;
    master.value = 2;
    masters.sync_state_updates(&mut server).unwrap();
    deliver(&mut server, &mut client);
    assert_eq!(proxy(&client, id).unwrap().value, 2);
    assert!(!masters.is_unchanged_for_client(id, 0));
    assert!(!proxy(&client, id).unwrap().last_flags.contains(SyncFlags::FULL_STATE));
}

#[test]
fn test_alternating_objects_skip_every_other_cycle() {
    let (mut server, mut client, mut masters) = setup();
    masters.set_pacemaker_pulse_period(100).unwrap();
    let id = masters.register_master_object(Box::new(Counter {
        alternating: true,
        changed: true,
        ..Default::default()
    }));

    let mut seen = Vec::new();
    for _ in 0..4 {
        masters.sync_state_updates(&mut server).unwrap();
        deliver(&mut server, &mut client);
        seen.push(proxy(&client, id).unwrap().applied);
    }
    assert_eq!(seen, vec![1, 1, 2, 2]);
}

#[test]
fn test_pacemaker_pulse_forces_update() {
    let (mut server, mut client, mut masters) = setup();
    masters.set_pacemaker_pulse_period(2).unwrap();
    let id = masters.register_master_object(Box::new(Counter {
        alternating: true,
        changed: true,
        ..Default::default()
    }));

    masters.sync_state_updates(&mut server).unwrap();
    deliver(&mut server, &mut client);
    assert!(masters.alternating_updates_flag());

    masters.sync_state_updates(&mut server).unwrap();
    deliver(&mut server, &mut client);
    let counter = proxy(&client, id).unwrap();
    assert_eq!(counter.applied, 2);
    assert!(counter.last_flags.contains(SyncFlags::PACEMAKER_PULSE));
}

#[test]
fn test_explicit_update_is_not_repeated_in_cycle() {
    let (mut server, mut client, mut masters) = setup();
    let id = masters.register_master_object(Box::new(Counter {
        value: 5,
        changed: true,
        ..Default::default()
    }));

    masters.sync_object_update(&mut server, id).unwrap();
    masters.sync_state_updates(&mut server).unwrap();
    deliver(&mut server, &mut client);

    assert_eq!(proxy(&client, id).unwrap().applied, 1);
}

#[test]
fn test_deactivated_client_gets_full_state_later() {
    let (mut server, mut client, mut masters) = setup();
    let id = masters.register_master_object(Box::new(Counter {
        value: 3,
        changed: true,
        ..Default::default()
    }));
    masters.sync_state_updates(&mut server).unwrap();
    deliver(&mut server, &mut client);

    masters.object_as_mut::<Counter>(id).unwrap().deactivate_for_all = true;
    masters.sync_state_updates(&mut server).unwrap();
    masters.sync_state_updates(&mut server).unwrap();
    deliver(&mut server, &mut client);
    assert!(masters.is_deactivated_for_client(id, 0));
    let counter = proxy(&client, id).unwrap();
    assert!(counter.deactivated_in.is_some());
    assert_eq!(counter.applied, 1);

    masters.object_as_mut::<Counter>(id).unwrap().deactivate_for_all = false;
    masters.sync_state_updates(&mut server).unwrap();
    deliver(&mut server, &mut client);
    assert!(!masters.is_deactivated_for_client(id, 0));
    let counter = proxy(&client, id).unwrap();
    assert_eq!(counter.applied, 2);
    assert!(counter.last_flags.contains(SyncFlags::FULL_STATE));
}

#[test]
fn test_skipped_client_resumes_with_full_state() {
    let (mut server, mut first, mut masters) = setup();
    let mut second = join(&mut server);
    let skipped = first.client_index().unwrap();
    let id = masters.register_master_object(Box::new(Counter {
        value: 1,
        changed: true,
        ..Default::default()
    }));
    masters.sync_state_updates(&mut server).unwrap();
    deliver_all(&mut server, &mut [&mut first, &mut second]);
    assert_eq!(proxy(&first, id).unwrap().applied, 1);
    assert_eq!(proxy(&second, id).unwrap().applied, 1);

    let master = masters.object_as_mut::<Counter>(id).unwrap();
    master.skip_for = Some(skipped);
    master.value = 2;
    masters.sync_state_updates(&mut server).unwrap();
    deliver_all(&mut server, &mut [&mut first, &mut second]);
    assert_eq!(proxy(&first, id).unwrap().value, 1);
    assert_eq!(proxy(&second, id).unwrap().value, 2);

    // Nothing changed, yet the skipped client is owed the whole state.
    let master = masters.object_as_mut::<Counter>(id).unwrap();
    master.skip_for = None;
    master.changed = false;
    masters.sync_state_updates(&mut server).unwrap();
    deliver_all(&mut server, &mut [&mut first, &mut second]);

    let resumed = proxy(&first, id).unwrap();
    assert_eq!(resumed.value, 2);
    assert_eq!(resumed.applied, 2);
    assert!(resumed.last_flags.contains(SyncFlags::FULL_STATE));
    let other = proxy(&second, id).unwrap();
    assert_eq!(other.applied, 2);
    assert!(!other.last_flags.contains(SyncFlags::FULL_STATE));
}

#[test]
fn test_deactivation_is_per_client() {
    let (mut server, mut first, mut masters) = setup();
    let mut second = join(&mut server);
    let hidden = first.client_index().unwrap();
    let visible = second.client_index().unwrap();
    let id = masters.register_master_object(Box::new(Counter {
        value: 1,
        changed: true,
        ..Default::default()
    }));
    masters.sync_state_updates(&mut server).unwrap();
    deliver_all(&mut server, &mut [&mut first, &mut second]);

    for value in [5, 6] {
        let master = masters.object_as_mut::<Counter>(id).unwrap();
        master.deactivate_for = Some(hidden);
        master.value = value;
        masters.sync_state_updates(&mut server).unwrap();
        deliver_all(&mut server, &mut [&mut first, &mut second]);
    }

    assert!(masters.is_deactivated_for_client(id, hidden));
    assert!(!masters.is_deactivated_for_client(id, visible));

    let deactivated = proxy(&first, id).unwrap();
    assert!(deactivated.deactivated_in.is_some());
    assert_eq!(deactivated.applied, 1);
    assert_eq!(deactivated.value, 1);

    let updated = proxy(&second, id).unwrap();
    assert!(updated.deactivated_in.is_none());
    assert_eq!(updated.applied, 3);
    assert_eq!(updated.value, 6);
}

#[test]
fn test_destroy_removes_proxy() {
    let (mut server, mut client, mut masters) = setup();
    let id = masters.register_master_object(Box::new(Counter {
        value: 9,
        changed: true,
        ..Default::default()
    }));
    masters.sync_state_updates(&mut server).unwrap();
    deliver(&mut server, &mut client);

    assert!(matches!(
        masters.unregister_object(id),
        Err(SyncError::DestroyNotSynced(_))
    ));
    masters.sync_object_destroy(&mut server, id).unwrap();
    assert!(masters.unregister_object(id).is_ok());
    deliver(&mut server, &mut client);

    let mirror = client.user_data::<Mirror>().unwrap();
    assert!(!mirror.registry.contains(id));

    let mean = RemoteInfo::latency_in_steps(
        client.server_connector().remote_info().mean_latency,
        DEFAULT_STEP_DURATION,
    );
    let mirror = client.user_data::<Mirror>().unwrap();
    assert_eq!(mirror.spawner.destroyed, vec![(9, 4u32.saturating_sub(mean + 1))]);
}

#[test]
fn test_late_joiner_receives_complete_state() {
    let (mut server, mut client, mut masters) = setup();
    let id = masters.register_master_object(Box::new(Counter {
        value: 11,
        changed: true,
        ..Default::default()
    }));
    masters.sync_state_updates(&mut server).unwrap();
    deliver(&mut server, &mut client);

    let mut late = join(&mut server);
    let index = late.client_index().unwrap();

    masters.sync_complete_state(&mut server, index).unwrap();
    server.update(UpdateMode::Send);
    late.update(UpdateMode::Receive);

    let counter = proxy(&late, id).expect("proxy created");
    assert_eq!(counter.value, 11);
    assert!(counter.last_flags.contains(SyncFlags::FULL_STATE));
}

#[test]
fn test_sync_needs_registered_messages() {
    let mut server = Server::new(NodeConfig::new("sync"), 1, Arc::new(HandlerRegistry::empty())).unwrap();
    server.start(0).unwrap();
    let mut masters = SynchronizedObjectRegistry::new(4);
    masters.register_master_object(Box::new(Counter::default()));

    assert!(matches!(
        masters.sync_state_updates(&mut server),
        Err(SyncError::Rpc(_))
    ));
}
