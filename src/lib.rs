//! dot-sensor-host
//!
//! Host-side driver for a fleet of wireless orientation sensors: discovers
//! devices over a short-range radio link, walks each one through an explicit
//! connection lifecycle, enables on-device streaming and converts raw packets
//! into host-time-aligned orientation samples.

pub mod domain;
pub mod infrastructure;
pub mod service;
