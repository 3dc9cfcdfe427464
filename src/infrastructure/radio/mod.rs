//! Radio Boundary
//!
//! The physical transport is an external collaborator. The core consumes it
//! through two traits: a central for discovery and per-device links for the
//! connection lifecycle. Every operation is non-blocking; completions and
//! failures come back later as [`RadioEvent`] messages on the service queue,
//! never by blocking the dispatcher.
//!
//! ## Modules
//!
//! - [`protocol`] - sensor wire protocol: UUIDs, control command, packet layout
//! - [`simulated`] - in-process radio used by the demo binary and tests

pub mod protocol;
pub mod simulated;

use crate::domain::models::Advertisement;

/// Adapter-wide radio surface: discovery and link creation.
pub trait RadioCentral: Send {
    /// Begin scanning. Advertisements arrive as `CentralEvent::Discovered`
    /// messages; duplicates are allowed and filtered by the registry.
    fn start_scan(&mut self);

    fn stop_scan(&mut self);

    /// Open a communication link to an advertised device. `address` is the
    /// registry-assigned identity, which may differ from the advertisement's
    /// when it had to be synthesized.
    fn open_link(&mut self, advertisement: &Advertisement, address: &str) -> Box<dyn RadioLink>;
}

/// Per-device radio operations. All fire-and-forget: the matching completion
/// (or `RadioEvent::Failed`) is delivered on the service queue.
pub trait RadioLink: Send {
    fn connect(&mut self);

    fn enumerate_capabilities(&mut self);

    /// Write the 3-byte control command to the control capability.
    fn write_control(&mut self, command: [u8; 3], ack_requested: bool);

    /// Subscribe to measurement notifications. Packets then arrive as
    /// `RadioEvent::Measurement` until unsubscribed.
    fn subscribe_measurement(&mut self);

    /// Stop measurement notifications. No completion is reported.
    fn unsubscribe_measurement(&mut self);

    fn disconnect(&mut self);
}
