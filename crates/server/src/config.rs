use std::time::Duration;

use rigelnet::{NodeConfig, PacketLossSimulation};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub tick_rate: u32,
    pub max_clients: usize,
    pub orbiter_count: usize,
    pub passphrase: String,
    pub timeout: Duration,
    pub packet_loss: Option<PacketLossSimulation>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: rigelnet::DEFAULT_PORT,
            tick_rate: 60,
            max_clients: 8,
            orbiter_count: 12,
            passphrase: "rigel".to_owned(),
            timeout: rigelnet::net::DEFAULT_TIMEOUT,
            packet_loss: None,
        }
    }
}

impl ServerConfig {
    pub fn node_config(&self) -> NodeConfig {
        NodeConfig {
            timeout_limit: self.timeout,
            packet_loss: self.packet_loss.clone(),
            ..NodeConfig::new(self.passphrase.clone())
        }
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }
}
