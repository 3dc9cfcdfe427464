//! Per-Device Clock Fusion
//!
//! Sensors stamp each packet with a free-running 32-bit tick counter
//! (microseconds, wrapping at 2^32). This module reconciles that counter with
//! the host's monotonic clock: deltas between consecutive ticks are projected
//! onto the host timeline with a fixed drift correction, and the projection is
//! clamped so it can never run ahead of the actual packet arrival time.
//!
//! The algorithm is deterministic for a given sequence of `(tick, host_us)`
//! pairs and never consults wall-clock time itself.

use crate::domain::models::{Device, OrientationSample};
use crate::infrastructure::radio::protocol::RawPacket;

/// Fixed drift compensation factor. The sensor crystal runs consistently
/// slightly faster than the host clock; tick deltas are stretched by this
/// fraction before being applied to the host timeline.
pub const CLOCK_DELTA: f64 = 0.0002;

/// Clock fusion state of a single device.
///
/// `last_host_us` is seeded from the first packet's arrival time and from then
/// on only advances. `last_tick` is the last observed device tick, interpreted
/// modulo 2^32.
#[derive(Debug, Clone, Default)]
pub struct ClockFusion {
    last_host_us: Option<f64>,
    last_tick: u32,
}

impl ClockFusion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Align a device tick with the host timeline.
    ///
    /// `host_us` is the host monotonic capture time of the packet carrying
    /// `tick`, in microseconds. Returns the host-aligned timestamp for the
    /// packet.
    pub fn align(&mut self, tick: u32, host_us: f64) -> f64 {
        let Some(last) = self.last_host_us else {
            // First packet: arrival time is taken as-is, no correction yet.
            self.last_host_us = Some(host_us);
            self.last_tick = tick;
            return host_us;
        };

        // Wrapping subtraction folds the 2^32 rollover correction into the
        // delta: 50 - 4294967200 comes out as 146.
        let delta = tick.wrapping_sub(self.last_tick) as f64;
        self.last_tick = tick;

        let candidate = last + delta * (1.0 + CLOCK_DELTA);

        // The correction cannot predict the future. Clamping here bounds the
        // overshoot that accumulates when scheduling jitter delays packets.
        let aligned = if candidate > host_us { host_us } else { candidate };
        self.last_host_us = Some(aligned);
        aligned
    }

    /// Host-aligned timestamp of the most recent packet, if any was seen.
    pub fn last_host_us(&self) -> Option<f64> {
        self.last_host_us
    }
}

/// Convert one raw packet into a host-time-aligned orientation sample,
/// advancing the device's clock fusion state.
pub fn synchronize(device: &mut Device, packet: &RawPacket, host_us: f64) -> OrientationSample {
    let timestamp = device.clock.align(packet.tick, host_us);
    OrientationSample {
        timestamp,
        address: device.address.clone(),
        q_w: packet.quaternion[0],
        q_x: packet.quaternion[1],
        q_y: packet.quaternion[2],
        q_z: packet.quaternion[3],
    }
}
