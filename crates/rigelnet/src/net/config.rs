use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::NetError;
use super::protocol::{
    DEFAULT_MAX_PACKET_SIZE, DEFAULT_TIMEOUT, MAX_MAX_PACKET_SIZE, MIN_MAX_PACKET_SIZE,
};
use super::send_buffer::{RetransmitPredicate, default_retransmit_predicate};
use super::stats::PacketLossSimulation;

fn default_predicate() -> RetransmitPredicate {
    default_retransmit_predicate
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub passphrase: String,
    pub max_packet_size: usize,
    /// Zero disables timeouts.
    pub timeout_limit: Duration,
    #[serde(skip, default = "default_predicate")]
    pub retransmit_predicate: RetransmitPredicate,
    pub packet_loss: Option<PacketLossSimulation>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            passphrase: String::new(),
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            timeout_limit: DEFAULT_TIMEOUT,
            retransmit_predicate: default_retransmit_predicate,
            packet_loss: None,
        }
    }
}

impl NodeConfig {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: passphrase.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), NetError> {
        if self.max_packet_size < MIN_MAX_PACKET_SIZE {
            return Err(NetError::InvalidConfig(format!(
                "max_packet_size {} is below the minimum of {}",
                self.max_packet_size, MIN_MAX_PACKET_SIZE
            )));
        }
        if self.max_packet_size > MAX_MAX_PACKET_SIZE {
            return Err(NetError::InvalidConfig(format!(
                "max_packet_size {} exceeds the largest UDP payload of {}",
                self.max_packet_size, MAX_MAX_PACKET_SIZE
            )));
        }
        if let Some(sim) = &self.packet_loss {
            if !(0.0..=100.0).contains(&sim.loss_percent) {
                return Err(NetError::InvalidConfig(format!(
                    "loss_percent {} is outside 0-100",
                    sim.loss_percent
                )));
            }
        }
        Ok(())
    }
}
