//! Link quality views and the egress-side TX byte meter.

use crate::link::MAX_RADIO_INTERFACES;
use crate::time::{Duration, Instant};

/// Per-interface link quality, produced by the external RX collector.
///
/// The RX side runs on its own thread under a single-writer discipline; the egress core only
/// reads scalar snapshots and tolerates slightly stale values (they are advisory).
pub struct LinkStatsView {
    rx_quality: [i32; MAX_RADIO_INTERFACES],
}

impl LinkStatsView {
    pub fn new() -> Self {
        Self {
            // Interfaces that never received anything sort below every real quality value.
            rx_quality: [-1_000_000; MAX_RADIO_INTERFACES],
        }
    }

    /// Updates the relative RX quality of an interface. Called by the RX collector.
    pub fn set_rx_quality(&mut self, interface: usize, quality: i32) {
        if let Some(q) = self.rx_quality.get_mut(interface) {
            *q = quality;
        }
    }

    /// Returns the relative RX quality of an interface.
    pub fn rx_quality(&self, interface: usize) -> i32 {
        self.rx_quality
            .get(interface)
            .copied()
            .unwrap_or(-1_000_000)
    }
}

impl Default for LinkStatsView {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Copy, Clone)]
struct Bucket {
    window_start: Option<Instant>,
    in_window: u32,
    rate: u32,
}

/// Per-interface outbound byte meter with one-second buckets.
///
/// Owned by the egress dispatcher; the serial pacer reads it to enforce the airtime budget.
pub struct TxMeter {
    buckets: [Bucket; MAX_RADIO_INTERFACES],
}

impl TxMeter {
    pub fn new() -> Self {
        Self {
            buckets: [Bucket {
                window_start: None,
                in_window: 0,
                rate: 0,
            }; MAX_RADIO_INTERFACES],
        }
    }

    /// Records `bytes` sent on `interface` at `now`.
    pub fn record(&mut self, interface: usize, bytes: u32, now: Instant) {
        let bucket = match self.buckets.get_mut(interface) {
            Some(b) => b,
            None => return,
        };
        match bucket.window_start {
            Some(start) if now.duration_since(start) < Duration::from_secs(1) => {}
            _ => {
                bucket.rate = bucket.in_window;
                bucket.in_window = 0;
                bucket.window_start = Some(now);
            }
        }
        bucket.in_window = bucket.in_window.saturating_add(bytes);
    }

    /// Returns the bytes per second measured over the last completed window.
    pub fn bytes_per_sec(&self, interface: usize) -> u32 {
        self.buckets.get(interface).map(|b| b.rate).unwrap_or(0)
    }
}

impl Default for TxMeter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meter_rolls_windows() {
        let mut meter = TxMeter::new();
        let t0 = Instant::from_raw_micros(0);
        meter.record(0, 800, t0);
        meter.record(0, 1200, t0 + Duration::from_millis(500));
        assert_eq!(meter.bytes_per_sec(0), 0);

        // The next record after a full second completes the window.
        meter.record(0, 10, t0 + Duration::from_millis(1100));
        assert_eq!(meter.bytes_per_sec(0), 2000);
    }

    #[test]
    fn meter_ignores_out_of_range() {
        let mut meter = TxMeter::new();
        meter.record(99, 100, Instant::from_raw_micros(0));
        assert_eq!(meter.bytes_per_sec(99), 0);
    }
}
