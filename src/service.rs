//! Sensor Service
//!
//! Coordinates the whole host: owns the radio central, the device registry,
//! the per-device session controllers and the outbound event bus. Everything
//! runs on one logical dispatch loop fed by a single queue; radio completions,
//! caller commands and deferred publications are all just messages on it, so
//! no session state ever needs a lock.

use crate::domain::event_bus::EventBus;
use crate::domain::models::{
    Advertisement, CentralEvent, Command, HostEvent, RadioEvent, SensorEvent,
};
use crate::domain::registry::DeviceRegistry;
use crate::domain::session::{DeviceSessionController, SessionEvent, SessionParams};
use crate::infrastructure::radio::RadioCentral;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Cloneable command surface for callers (and for radio adapters, which feed
/// the same queue).
#[derive(Clone)]
pub struct ServiceHandle {
    tx: mpsc::UnboundedSender<HostEvent>,
}

impl ServiceHandle {
    pub fn start_scan(&self) {
        self.send(Command::StartScan);
    }

    pub fn stop_scan(&self) {
        self.send(Command::StopScan);
    }

    pub fn connect(&self, address: impl Into<String>) {
        self.send(Command::Connect(address.into()));
    }

    pub fn enable(&self, address: impl Into<String>) {
        self.send(Command::Enable(address.into()));
    }

    pub fn disable(&self, address: impl Into<String>) {
        self.send(Command::Disable(address.into()));
    }

    pub fn disconnect(&self, address: impl Into<String>) {
        self.send(Command::Disconnect(address.into()));
    }

    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }

    fn send(&self, command: Command) {
        if self.tx.send(HostEvent::Command(command)).is_err() {
            warn!("service queue closed, command dropped");
        }
    }
}

/// The host's single-threaded coordinator.
pub struct SensorService {
    bus: EventBus<SensorEvent>,
    registry: DeviceRegistry,
    sessions: HashMap<String, DeviceSessionController>,
    central: Box<dyn RadioCentral>,
    sensor_name: String,
    tx: mpsc::UnboundedSender<HostEvent>,
    rx: mpsc::UnboundedReceiver<HostEvent>,
}

impl SensorService {
    /// Create the service around its dispatch queue. Radio adapters are
    /// constructed with a clone of the same `tx` so their events land on the
    /// one queue the loop drains.
    pub fn new(
        central: Box<dyn RadioCentral>,
        sensor_name: impl Into<String>,
        tx: mpsc::UnboundedSender<HostEvent>,
        rx: mpsc::UnboundedReceiver<HostEvent>,
    ) -> Self {
        Self {
            bus: EventBus::new(),
            registry: DeviceRegistry::new(),
            sessions: HashMap::new(),
            central,
            sensor_name: sensor_name.into(),
            tx,
            rx,
        }
    }

    pub fn handle(&self) -> ServiceHandle {
        ServiceHandle {
            tx: self.tx.clone(),
        }
    }

    /// Register an event bus subscriber. Must happen before `run`.
    pub fn subscribe(&mut self, subscriber: impl Fn(&SensorEvent) + Send + 'static) {
        self.bus.subscribe(subscriber);
    }

    /// Run the dispatch loop until a shutdown command arrives or every queue
    /// sender is gone.
    pub async fn run(mut self) {
        info!(sensor_name = %self.sensor_name, "sensor service started");
        while let Some(message) = self.rx.recv().await {
            if !self.process(message) {
                break;
            }
        }
        info!("sensor service stopped");
    }

    fn process(&mut self, message: HostEvent) -> bool {
        match message {
            HostEvent::Central(event) => self.on_central(event),
            HostEvent::Link { address, event } => self.on_link(&address, event),
            HostEvent::Command(Command::Shutdown) => return false,
            HostEvent::Command(command) => self.on_command(command),
            HostEvent::Publish(event) => self.bus.publish(&event),
        }
        true
    }

    fn on_central(&mut self, event: CentralEvent) {
        match event {
            CentralEvent::PoweredOn => self.bus.publish(&SensorEvent::PoweredOn),
            CentralEvent::ScanningStarted => self.bus.publish(&SensorEvent::ScanningStarted),
            CentralEvent::ScanningStopped => self.bus.publish(&SensorEvent::ScanningStopped),
            CentralEvent::Discovered(advertisement) => self.on_discovered(advertisement),
        }
    }

    fn on_discovered(&mut self, advertisement: Advertisement) {
        // Fixed device-name filter; everything else in range is ignored.
        if advertisement.local_name.as_deref() != Some(self.sensor_name.as_str()) {
            return;
        }

        let Some(device) = self.registry.admit(&advertisement, &self.sensor_name) else {
            return; // duplicate advertisement
        };

        let address = device.address.clone();
        let name = device.name.clone();
        let link = self.central.open_link(&advertisement, &address);

        let mut session = match DeviceSessionController::new(device, link, self.tx.clone()) {
            Ok(session) => session,
            Err(error) => {
                warn!(%address, %error, "failed to build session");
                self.registry.release(&address);
                return;
            }
        };

        session.dispatch(SessionEvent::Discover, SessionParams::None);
        self.sessions.insert(address.clone(), session);

        info!(%address, %name, "sensor discovered");
        self.bus
            .publish(&SensorEvent::SensorDiscovered { address, name });
    }

    fn on_link(&mut self, address: &str, event: RadioEvent) {
        let Some(session) = self.sessions.get_mut(address) else {
            warn!(%address, "radio event for unknown session");
            return;
        };
        for post in session.handle_radio_event(event) {
            self.bus.publish(&post);
        }
    }

    fn on_command(&mut self, command: Command) {
        let (address, event) = match command {
            Command::StartScan => {
                self.central.start_scan();
                return;
            }
            Command::StopScan => {
                self.central.stop_scan();
                return;
            }
            Command::Connect(address) => (address, SessionEvent::Connect),
            Command::Enable(address) => (address, SessionEvent::Enable),
            Command::Disable(address) => (address, SessionEvent::Disable),
            Command::Disconnect(address) => (address, SessionEvent::Disconnect),
            Command::Shutdown => return, // handled in `process`
        };

        let Some(session) = self.sessions.get_mut(&address) else {
            warn!(%address, ?event, "command for unknown sensor");
            return;
        };
        for post in session.dispatch(event, SessionParams::None) {
            self.bus.publish(&post);
        }
    }
}
