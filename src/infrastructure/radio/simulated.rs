//! Simulated Radio
//!
//! In-process stand-in for the physical transport, used by the demo binary
//! and the integration tests. Completions are delivered through the service
//! queue exactly like a real adapter's would be, so the whole lifecycle runs
//! unmodified. Measurement packets carry a synthetic tick counter and a
//! synthetic host capture clock with deterministic jitter, which exercises
//! both the drift projection and the arrival-time clamp.

use crate::domain::models::{Advertisement, CentralEvent, HostEvent, RadioEvent};
use crate::infrastructure::radio::protocol::{CONTROL_UUID, MEASUREMENT_UUID, SENSOR_NAME};
use crate::infrastructure::radio::{RadioCentral, RadioLink};
use std::collections::HashSet;
use tokio::sync::mpsc;
use tracing::debug;

/// Description of one simulated sensor.
#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    /// Advertised address. May be empty to exercise address synthesis.
    pub address: String,
    /// Initial tick counter value. Values near `u32::MAX` exercise rollover.
    pub start_tick: u32,
    /// Tick advance per packet, microseconds.
    pub tick_interval_us: u32,
    /// Packets emitted per measurement subscription.
    pub packet_count: usize,
}

impl Default for SimulatedSensor {
    fn default() -> Self {
        Self {
            address: "d4:22:cd:00:00:01".into(),
            start_tick: 0,
            tick_interval_us: 16_667, // ~60 Hz
            packet_count: 64,
        }
    }
}

/// The adapter-wide half of the simulation.
pub struct SimulatedRadio {
    tx: mpsc::UnboundedSender<HostEvent>,
    sensors: Vec<SimulatedSensor>,
    opened: HashSet<usize>,
}

impl SimulatedRadio {
    pub fn new(tx: mpsc::UnboundedSender<HostEvent>, sensors: Vec<SimulatedSensor>) -> Self {
        // A real central reports its power state as soon as it comes up.
        let _ = tx.send(HostEvent::Central(CentralEvent::PoweredOn));
        Self {
            tx,
            sensors,
            opened: HashSet::new(),
        }
    }

    fn advertisement(sensor: &SimulatedSensor) -> Advertisement {
        Advertisement {
            address: sensor.address.clone(),
            local_name: Some(SENSOR_NAME.to_string()),
            advertisement_data: Vec::new(),
        }
    }
}

impl RadioCentral for SimulatedRadio {
    fn start_scan(&mut self) {
        let _ = self
            .tx
            .send(HostEvent::Central(CentralEvent::ScanningStarted));
        for sensor in &self.sensors {
            let _ = self.tx.send(HostEvent::Central(CentralEvent::Discovered(
                Self::advertisement(sensor),
            )));
        }
    }

    fn stop_scan(&mut self) {
        let _ = self
            .tx
            .send(HostEvent::Central(CentralEvent::ScanningStopped));
    }

    fn open_link(&mut self, advertisement: &Advertisement, address: &str) -> Box<dyn RadioLink> {
        let index = self
            .sensors
            .iter()
            .enumerate()
            .position(|(i, s)| s.address == advertisement.address && !self.opened.contains(&i));

        let sensor = match index {
            Some(i) => {
                self.opened.insert(i);
                self.sensors[i].clone()
            }
            None => SimulatedSensor::default(),
        };

        debug!(%address, "simulated link opened");
        Box::new(SimulatedLink {
            tx: self.tx.clone(),
            address: address.to_string(),
            tick: sensor.start_tick,
            host_us: 1_000_000.0,
            packets_sent: 0,
            sensor,
        })
    }
}

/// Per-device half of the simulation.
struct SimulatedLink {
    tx: mpsc::UnboundedSender<HostEvent>,
    address: String,
    sensor: SimulatedSensor,
    tick: u32,
    host_us: f64,
    packets_sent: usize,
}

impl SimulatedLink {
    fn emit(&self, event: RadioEvent) {
        let _ = self.tx.send(HostEvent::Link {
            address: self.address.clone(),
            event,
        });
    }

    fn emit_packets(&mut self) {
        let interval = f64::from(self.sensor.tick_interval_us);
        for _ in 0..self.sensor.packet_count {
            self.tick = self.tick.wrapping_add(self.sensor.tick_interval_us);
            // Deterministic arrival jitter around the nominal interval.
            let jitter = ((self.packets_sent % 7) as f64 - 3.0) * 25.0;
            self.host_us += interval + jitter;
            self.packets_sent += 1;

            let angle = self.packets_sent as f32 * 0.01;
            let quaternion = [(angle / 2.0).cos(), 0.0, 0.0, (angle / 2.0).sin()];

            let mut data = Vec::with_capacity(20);
            data.extend_from_slice(&self.tick.to_le_bytes());
            for q in quaternion {
                data.extend_from_slice(&q.to_le_bytes());
            }

            self.emit(RadioEvent::Measurement {
                data,
                host_us: self.host_us,
            });
        }
    }
}

impl RadioLink for SimulatedLink {
    fn connect(&mut self) {
        self.emit(RadioEvent::Connected);
    }

    fn enumerate_capabilities(&mut self) {
        self.emit(RadioEvent::Capabilities(vec![
            CONTROL_UUID.to_string(),
            MEASUREMENT_UUID.to_string(),
        ]));
    }

    fn write_control(&mut self, _command: [u8; 3], _ack_requested: bool) {
        self.emit(RadioEvent::ControlWritten);
    }

    fn subscribe_measurement(&mut self) {
        self.emit(RadioEvent::Subscribed);
        self.emit_packets();
    }

    fn unsubscribe_measurement(&mut self) {
        // Burst emission has already completed; nothing to stop.
    }

    fn disconnect(&mut self) {
        self.emit(RadioEvent::Disconnected);
    }
}
