use std::net::SocketAddr;
use std::time::{Duration, Instant};

const INITIAL_LATENCY: Duration = Duration::from_millis(50);

/// What a connector knows about its peer.
#[derive(Debug, Clone)]
pub struct RemoteInfo {
    pub addr: Option<SocketAddr>,
    pub mean_latency: Duration,
    pub optimistic_latency: Duration,
    pub pessimistic_latency: Duration,
    last_activity: Instant,
}

impl Default for RemoteInfo {
    fn default() -> Self {
        Self {
            addr: None,
            mean_latency: INITIAL_LATENCY,
            optimistic_latency: INITIAL_LATENCY,
            pessimistic_latency: INITIAL_LATENCY,
            last_activity: Instant::now(),
        }
    }
}

impl RemoteInfo {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr: Some(addr),
            ..Default::default()
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn time_since_activity(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Whole steps of `step` the given latency spans, rounded to nearest.
    pub fn latency_in_steps(latency: Duration, step: Duration) -> u32 {
        if step.is_zero() {
            return 0;
        }
        (latency.as_secs_f64() / step.as_secs_f64()).round() as u32
    }
}

/// Time-to-acknowledgement samples gathered during one receive pass.
#[derive(Debug, Default)]
pub struct LatencySamples {
    total: Duration,
    count: u32,
    min: Duration,
    max: Duration,
}

impl LatencySamples {
    pub fn record(&mut self, sample: Duration) {
        if self.count == 0 {
            self.min = sample;
            self.max = sample;
        } else {
            self.min = self.min.min(sample);
            self.max = self.max.max(sample);
        }
        self.total += sample;
        self.count += 1;
    }

    /// Folds the samples into `remote` and starts a fresh pass.
    pub fn apply_to(&mut self, remote: &mut RemoteInfo) {
        if self.count > 0 {
            remote.mean_latency = self.total / self.count;
            remote.optimistic_latency = self.min;
            remote.pessimistic_latency = self.max;
        }
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_update_latency() {
        let mut remote = RemoteInfo::default();
        let mut samples = LatencySamples::default();
        samples.record(Duration::from_millis(10));
        samples.record(Duration::from_millis(30));
        samples.record(Duration::from_millis(20));
        samples.apply_to(&mut remote);

        assert_eq!(remote.mean_latency, Duration::from_millis(20));
        assert_eq!(remote.optimistic_latency, Duration::from_millis(10));
        assert_eq!(remote.pessimistic_latency, Duration::from_millis(30));
    }

    #[test]
    fn empty_pass_keeps_latency() {
        let mut remote = RemoteInfo::default();
        remote.mean_latency = Duration::from_millis(7);
        LatencySamples::default().apply_to(&mut remote);
        assert_eq!(remote.mean_latency, Duration::from_millis(7));
    }

    #[test]
    fn latency_steps_round() {
        let step = Duration::from_millis(16);
        assert_eq!(RemoteInfo::latency_in_steps(Duration::from_millis(40), step), 3);
        assert_eq!(RemoteInfo::latency_in_steps(Duration::from_millis(7), step), 0);
        assert_eq!(RemoteInfo::latency_in_steps(Duration::from_secs(1), Duration::ZERO), 0);
    }
}
