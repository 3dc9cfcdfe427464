//! Infrastructure: logging setup and the radio transport boundary.

pub mod logging;
pub mod radio;
