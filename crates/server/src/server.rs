use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use rigelnet::sync::register_master_sync_rpcs;
use rigelnet::{
    Event, HandlerRegistry, Server, SyncId, SynchronizedObjectRegistry, Telemetry, UpdateMode,
};

use crate::chat::{ChatLog, register_chat_rpcs};
use crate::config::ServerConfig;
use crate::events::{LogEntry, Severity, describe};
use crate::orbiters::Orbiter;

/// Steps a destroyed proxy lingers on clients before it disappears.
const DESTROY_DELAY_STEPS: u32 = 6;

/// Every this many ticks the oldest orbiter is replaced by a new one.
const RESPAWN_INTERVAL: u64 = 600;

pub fn handler_registry() -> Result<HandlerRegistry> {
    let builder = register_master_sync_rpcs(HandlerRegistry::builder())?;
    Ok(register_chat_rpcs(builder)?.build()?)
}

pub struct DemoServer {
    server: Server,
    objects: SynchronizedObjectRegistry,
    orbiters: VecDeque<SyncId>,
    spawned: usize,
    config: ServerConfig,
    tick: u64,
    tick_duration: Duration,
    last_tick_time: Instant,
    accumulator: Duration,
    running: Arc<AtomicBool>,
    start_time: Instant,
    telemetry: Telemetry,
    pending_log: VecDeque<LogEntry>,
}

impl DemoServer {
    pub fn new(config: ServerConfig) -> Result<Self> {
        let registry = Arc::new(handler_registry()?);
        let mut server = Server::new(config.node_config(), config.max_clients, registry)?;
        server.start(config.port)?;
        server.set_user_data(ChatLog::default());

        let tick_duration = config.tick_duration();
        let mut demo = Self {
            server,
            objects: SynchronizedObjectRegistry::new(DESTROY_DELAY_STEPS)
                .with_step_duration(tick_duration),
            orbiters: VecDeque::new(),
            spawned: 0,
            tick: 0,
            tick_duration,
            last_tick_time: Instant::now(),
            accumulator: Duration::ZERO,
            running: Arc::new(AtomicBool::new(true)),
            start_time: Instant::now(),
            telemetry: Telemetry::default(),
            pending_log: VecDeque::new(),
            config,
        };

        for _ in 0..demo.config.orbiter_count {
            demo.spawn_orbiter();
        }
        if let Some(addr) = demo.server.local_addr() {
            demo.pending_log
                .push_back(LogEntry::info(format!("Server started on {}", addr)));
        }
        Ok(demo)
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn drain_log(&mut self) -> impl Iterator<Item = LogEntry> + '_ {
        self.pending_log.drain(..)
    }

    pub fn run(&mut self) {
        while self.running.load(Ordering::SeqCst) {
            self.tick_once();
            for entry in self.drain_log().collect::<Vec<_>>() {
                match entry.severity {
                    Severity::Info => log::info!("{}", entry.message),
                    Severity::Warn => log::warn!("{}", entry.message),
                }
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        self.shutdown();
    }

    pub fn shutdown(&mut self) {
        self.server.stop();
        self.handle_events();
    }

    pub fn tick_once(&mut self) {
        let now = Instant::now();
        self.accumulator += now - self.last_tick_time;
        self.last_tick_time = now;

        self.telemetry += self.server.update(UpdateMode::Receive);
        self.handle_events();

        let mut ticked = false;
        while self.accumulator >= self.tick_duration {
            self.accumulator -= self.tick_duration;
            self.tick();
            ticked = true;
        }

        if ticked {
            if let Err(e) = self.objects.sync_state_updates(&mut self.server) {
                self.pending_log
                    .push_back(LogEntry::warn(format!("Sync failed: {}", e)));
            }
            self.telemetry += self.server.update(UpdateMode::Send);
        }
    }

    fn tick(&mut self) {
        self.tick += 1;
        let dt = self.tick_duration.as_secs_f32();
        for &id in &self.orbiters {
            if let Some(orbiter) = self.objects.object_as_mut::<Orbiter>(id) {
                orbiter.advance(dt);
            }
        }

        if self.tick % RESPAWN_INTERVAL == 0 {
            self.respawn_oldest();
        }
    }

    fn spawn_orbiter(&mut self) {
        let id = self
            .objects
            .register_master_object(Box::new(Orbiter::new(self.spawned)));
        self.spawned += 1;
        self.orbiters.push_back(id);
    }

    fn respawn_oldest(&mut self) {
        let Some(id) = self.orbiters.pop_front() else {
            return;
        };

        let result = self
            .objects
            .sync_object_destroy(&mut self.server, id)
            .and_then(|()| self.objects.unregister_object(id).map(drop));
        match result {
            Ok(()) => self
                .pending_log
                .push_back(LogEntry::info(format!("Orbiter {} retired", id))),
            Err(e) => self
                .pending_log
                .push_back(LogEntry::warn(format!("Failed to retire {}: {}", id, e))),
        }
        self.spawn_orbiter();
    }

    fn handle_events(&mut self) {
        while let Some(event) = self.server.poll_event() {
            if let Event::Connected {
                client_index: Some(index),
            } = &event
            {
                let index = *index;
                if let Err(e) = self.objects.sync_complete_state(&mut self.server, index) {
                    self.pending_log.push_back(LogEntry::warn(format!(
                        "Failed to send world to client {}: {}",
                        index, e
                    )));
                }
            }
            self.pending_log.push_back(describe(&event));
        }
    }

    pub fn stats(&self) -> ServerStats {
        let clients: Vec<usize> = self.server.connected_clients().collect();
        let latency_sum: Duration = clients
            .iter()
            .filter_map(|&i| self.server.client_connector(i).ok())
            .map(|c| c.remote_info().mean_latency)
            .sum();
        let mean_latency_ms = if clients.is_empty() {
            0.0
        } else {
            latency_sum.as_secs_f64() * 1000.0 / clients.len() as f64
        };

        let idle_objects = self
            .orbiters
            .iter()
            .filter(|&&id| {
                !clients.is_empty()
                    && clients
                        .iter()
                        .all(|&client| self.objects.is_unchanged_for_client(id, client))
            })
            .count();

        ServerStats {
            uptime_secs: self.start_time.elapsed().as_secs(),
            tick: self.tick,
            client_count: clients.len(),
            max_clients: self.server.size(),
            object_count: self.objects.len(),
            idle_objects,
            rejected_connections: self.server.rejected_connection_count(),
            telemetry: self.telemetry,
            mean_latency_ms,
            packet_loss_percent: self
                .config
                .packet_loss
                .as_ref()
                .filter(|sim| sim.enabled)
                .map_or(0.0, |sim| sim.loss_percent),
            chat: self
                .server
                .user_data::<ChatLog>()
                .map(|chat| chat.recent(5).map(str::to_owned).collect())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub uptime_secs: u64,
    pub tick: u64,
    pub client_count: usize,
    pub max_clients: usize,
    pub object_count: usize,
    /// Objects whose last update was dropped for every client as unchanged.
    pub idle_objects: usize,
    pub rejected_connections: u64,
    pub telemetry: Telemetry,
    pub mean_latency_ms: f64,
    pub packet_loss_percent: f32,
    pub chat: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_contains_sync_and_chat() {
        let registry = handler_registry().unwrap();
        assert_eq!(registry.len(), 6);
        assert!(registry.id_of_name("demo::say").is_ok());
        assert!(registry.id_of_name(rigelnet::sync::SYNC_UPDATE).is_ok());
    }

    #[test]
    fn test_demo_spawns_orbiters() {
        let config = ServerConfig {
            port: 0,
            orbiter_count: 3,
            ..Default::default()
        };
        let mut demo = DemoServer::new(config).unwrap();
        assert_eq!(demo.stats().object_count, 3);

        demo.respawn_oldest();
        assert_eq!(demo.stats().object_count, 3);
        assert_eq!(demo.spawned, 4);
    }
}
