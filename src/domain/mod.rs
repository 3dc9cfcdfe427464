//! Core domain: the state-machine engine, clock fusion, device sessions and
//! the event bus.

pub mod clock;
pub mod event_bus;
pub mod models;
pub mod registry;
pub mod session;
pub mod settings;
pub mod state_machine;
