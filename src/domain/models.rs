//! Shared domain vocabulary: devices, capabilities, samples and the event
//! enums exchanged between the radio boundary, the sessions and the service
//! loop.

use crate::domain::clock::ClockFusion;
use std::collections::HashMap;
use thiserror::Error;

/// The two device capabilities the host ever talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Command endpoint: receives the 3-byte enable/disable control command.
    Control,
    /// Streaming endpoint: emits 20-byte orientation packets when enabled.
    Measurement,
}

/// One discovered sensor, exclusively owned by its session controller.
#[derive(Debug, Clone)]
pub struct Device {
    pub address: String,
    pub name: String,
    /// Capability -> characteristic handle, populated during enumeration.
    pub capabilities: HashMap<Capability, String>,
    /// Per-device clock fusion state (`lastHostTime` / `lastRawTick`).
    pub clock: ClockFusion,
}

impl Device {
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
            capabilities: HashMap::new(),
            clock: ClockFusion::new(),
        }
    }

    pub fn capability(&self, capability: Capability) -> Option<&str> {
        self.capabilities.get(&capability).map(String::as_str)
    }
}

/// Host-time-aligned orientation sample, one per inbound packet.
#[derive(Debug, Clone, PartialEq)]
pub struct OrientationSample {
    /// Host-aligned timestamp in microseconds.
    pub timestamp: f64,
    pub address: String,
    pub q_w: f32,
    pub q_x: f32,
    pub q_y: f32,
    pub q_z: f32,
}

/// Advertisement reported by the radio central during discovery.
#[derive(Debug, Clone, Default)]
pub struct Advertisement {
    /// May be empty; the registry synthesizes an address in that case.
    pub address: String,
    pub local_name: Option<String>,
    pub advertisement_data: Vec<u8>,
}

/// Radio-layer failures, carried as `SensorError` events. Non-fatal: the
/// session can be retried by re-issuing a connect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RadioError {
    #[error("discovery failed: {0}")]
    Discovery(String),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("capability enumeration failed: {0}")]
    CapabilityEnumeration(String),
    #[error("control command write failed: {0}")]
    CommandWrite(String),
    #[error("measurement subscription failed: {0}")]
    Subscription(String),
}

/// Events published on the host event bus for external consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorEvent {
    PoweredOn,
    ScanningStarted,
    ScanningStopped,
    SensorDiscovered { address: String, name: String },
    SensorConnected { address: String },
    SensorDisconnected { address: String },
    SensorEnabled { address: String },
    SensorDisabled { address: String },
    SensorError { address: String, error: RadioError },
    SensorData(OrientationSample),
}

/// Events emitted by the radio central (adapter-wide, not per device).
#[derive(Debug, Clone)]
pub enum CentralEvent {
    PoweredOn,
    ScanningStarted,
    ScanningStopped,
    Discovered(Advertisement),
}

/// Completions and notifications emitted by one device link.
///
/// The radio collaborator's `onComplete(error)` callbacks surface here: a
/// successful completion is the matching variant, a failed one is `Failed`.
#[derive(Debug, Clone)]
pub enum RadioEvent {
    Connected,
    /// Characteristic handles discovered during capability enumeration.
    Capabilities(Vec<String>),
    ControlWritten,
    Subscribed,
    Disconnected,
    /// One inbound measurement packet, stamped with the host monotonic
    /// capture time (microseconds) as close to arrival as possible.
    Measurement { data: Vec<u8>, host_us: f64 },
    Failed(RadioError),
}

/// Lifecycle commands accepted by the service loop.
#[derive(Debug, Clone)]
pub enum Command {
    StartScan,
    StopScan,
    Connect(String),
    Enable(String),
    Disable(String),
    Disconnect(String),
    Shutdown,
}

/// Everything that flows through the service's single dispatch queue.
#[derive(Debug, Clone)]
pub enum HostEvent {
    Central(CentralEvent),
    Link { address: String, event: RadioEvent },
    Command(Command),
    /// Publication deferred to the next scheduling turn (error events).
    Publish(SensorEvent),
}
