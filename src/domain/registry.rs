//! Device Registry
//!
//! Admits discovery advertisements into `Device` records. Some transports
//! report devices without a usable address; the registry synthesizes one from
//! its own counter so every session has a stable identity. The counter lives
//! here, not in ambient global state: a fresh registry (one per service)
//! starts counting from zero again.

use crate::domain::models::{Advertisement, Device};
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    synthesized_counter: u32,
    admitted: HashSet<String>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit an advertisement, returning a new `Device` record.
    ///
    /// Scanning runs with duplicates allowed, so an address that was already
    /// admitted returns `None` and the advertisement is dropped.
    pub fn admit(&mut self, advertisement: &Advertisement, fallback_name: &str) -> Option<Device> {
        let address = if advertisement.address.is_empty() {
            let synthesized = format!("{:x}", self.synthesized_counter);
            self.synthesized_counter += 1;
            synthesized
        } else {
            advertisement.address.clone()
        };

        if !self.admitted.insert(address.clone()) {
            return None;
        }

        let name = advertisement
            .local_name
            .clone()
            .unwrap_or_else(|| fallback_name.to_string());
        Some(Device::new(address, name))
    }

    /// Forget an address so a later advertisement can admit it again.
    pub fn release(&mut self, address: &str) {
        self.admitted.remove(address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adv(address: &str, name: Option<&str>) -> Advertisement {
        Advertisement {
            address: address.to_string(),
            local_name: name.map(str::to_string),
            advertisement_data: Vec::new(),
        }
    }

    #[test]
    fn synthesizes_hex_addresses_for_anonymous_devices() {
        let mut registry = DeviceRegistry::new();
        let addresses: Vec<String> = (0..11)
            .map(|_| registry.admit(&adv("", Some("Xsens DOT")), "Xsens DOT").unwrap().address)
            .collect();
        assert_eq!(addresses[0], "0");
        assert_eq!(addresses[9], "9");
        assert_eq!(addresses[10], "a");
    }

    #[test]
    fn duplicate_advertisements_are_suppressed() {
        let mut registry = DeviceRegistry::new();
        assert!(registry.admit(&adv("aa:bb", Some("Xsens DOT")), "Xsens DOT").is_some());
        assert!(registry.admit(&adv("aa:bb", Some("Xsens DOT")), "Xsens DOT").is_none());

        registry.release("aa:bb");
        assert!(registry.admit(&adv("aa:bb", Some("Xsens DOT")), "Xsens DOT").is_some());
    }
}
