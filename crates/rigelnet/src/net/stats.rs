use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

use super::protocol::UDP_HEADER_BYTE_COUNT;

/// Bytes moved by one `update` call, UDP headers included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Telemetry {
    pub upload_bytes: u64,
    pub download_bytes: u64,
}

impl Telemetry {
    pub fn uploaded(datagram_len: usize) -> Self {
        Self {
            upload_bytes: datagram_len as u64 + UDP_HEADER_BYTE_COUNT,
            download_bytes: 0,
        }
    }

    pub fn downloaded(datagram_len: usize) -> Self {
        Self {
            upload_bytes: 0,
            download_bytes: datagram_len as u64 + UDP_HEADER_BYTE_COUNT,
        }
    }
}

impl Add for Telemetry {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            upload_bytes: self.upload_bytes + rhs.upload_bytes,
            download_bytes: self.download_bytes + rhs.download_bytes,
        }
    }
}

impl AddAssign for Telemetry {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PacketLossSimulation {
    pub enabled: bool,
    pub loss_percent: f32,
    #[serde(skip)]
    rng_state: u64,
}

impl PacketLossSimulation {
    pub fn new(loss_percent: f32) -> Self {
        Self {
            enabled: true,
            loss_percent,
            rng_state: 0,
        }
    }

    pub fn with_seed(loss_percent: f32, seed: u64) -> Self {
        Self {
            enabled: true,
            loss_percent,
            rng_state: seed,
        }
    }

    pub fn should_drop(&mut self) -> bool {
        if !self.enabled || self.loss_percent <= 0.0 {
            return false;
        }
        if self.rng_state == 0 {
            self.rng_state = rand_u64() | 1;
        }
        self.next_percent() < self.loss_percent
    }

    fn next_percent(&mut self) -> f32 {
        // xorshift64
        let mut x = self.rng_state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng_state = x;
        (x % 10_000) as f32 / 100.0
    }
}

pub fn rand_u64() -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use std::time::Instant;

    let mut hasher = DefaultHasher::new();
    Instant::now().hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telemetry_counts_udp_header() {
        let mut total = Telemetry::default();
        total += Telemetry::uploaded(100);
        total += Telemetry::downloaded(10);
        total += Telemetry::downloaded(0);

        assert_eq!(total.upload_bytes, 108);
        assert_eq!(total.download_bytes, 26);
    }

    #[test]
    fn disabled_simulation_never_drops() {
        let mut sim = PacketLossSimulation::default();
        assert!((0..1000).all(|_| !sim.should_drop()));
    }

    #[test]
    fn full_loss_always_drops() {
        let mut sim = PacketLossSimulation::with_seed(100.0, 42);
        assert!((0..1000).all(|_| sim.should_drop()));
    }

    #[test]
    fn partial_loss_drops_some() {
        let mut sim = PacketLossSimulation::with_seed(30.0, 7);
        let dropped = (0..10_000).filter(|_| sim.should_drop()).count();
        assert!(dropped > 2_000 && dropped < 4_000, "dropped {dropped}");
    }
}
