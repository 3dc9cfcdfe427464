//! Sensor Wire Protocol
//!
//! Protocol definitions for the Xsens DOT class of orientation sensors:
//! characteristic UUIDs, the 3-byte control command and the 20-byte
//! measurement packet layout.

use crate::domain::models::Capability;
use anyhow::Result;

/// Advertised local name the host filters on during discovery.
pub const SENSOR_NAME: &str = "Xsens DOT";

/// Control characteristic UUID - receives enable/disable commands.
pub const CONTROL_UUID: &str = "15172001-4947-11e9-8646-d663bd873d93";

/// Measurement characteristic UUID - emits orientation packets.
pub const MEASUREMENT_UUID: &str = "15172004-4947-11e9-8646-d663bd873d93";

const SENSOR_ENABLE: u8 = 0x01;
const SENSOR_DISABLE: u8 = 0x00;

/// Measurement packet length in bytes.
pub const PACKET_LEN: usize = 20;

/// Decoded measurement packet.
///
/// # Packet structure (20 bytes, all little-endian)
///
/// ```text
/// [0-3]   : device tick counter (u32, microseconds, wraps at 2^32)
/// [4-7]   : quaternion w (f32)
/// [8-11]  : quaternion x (f32)
/// [12-15] : quaternion y (f32)
/// [16-19] : quaternion z (f32)
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RawPacket {
    pub tick: u32,
    /// Orientation quaternion in w, x, y, z order.
    pub quaternion: [f32; 4],
}

/// Decode one measurement packet.
pub fn decode_packet(bytes: &[u8]) -> Result<RawPacket> {
    if bytes.len() != PACKET_LEN {
        return Err(anyhow::anyhow!(
            "invalid packet size: {} (expected {})",
            bytes.len(),
            PACKET_LEN
        ));
    }

    let tick = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);

    let mut quaternion = [0.0f32; 4];
    for (i, q) in quaternion.iter_mut().enumerate() {
        let offset = 4 + i * 4;
        *q = f32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ]);
    }

    Ok(RawPacket { tick, quaternion })
}

/// Build the 3-byte control command: `[0x01, enable flag, 0x02]`.
pub fn control_command(enable: bool) -> [u8; 3] {
    let flag = if enable { SENSOR_ENABLE } else { SENSOR_DISABLE };
    [0x01, flag, 0x02]
}

/// Map a characteristic UUID reported during enumeration onto the capability
/// the host knows how to use. Unrelated characteristics map to `None`.
pub fn capability_for_uuid(uuid: &str) -> Option<Capability> {
    let normalized = uuid.to_ascii_lowercase().replace('-', "");
    if normalized == CONTROL_UUID.replace('-', "") {
        Some(Capability::Control)
    } else if normalized == MEASUREMENT_UUID.replace('-', "") {
        Some(Capability::Measurement)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet_bytes(tick: u32, w: f32, x: f32, y: f32, z: f32) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(PACKET_LEN);
        bytes.extend_from_slice(&tick.to_le_bytes());
        for q in [w, x, y, z] {
            bytes.extend_from_slice(&q.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn decodes_tick_and_quaternion() {
        let bytes = packet_bytes(123_456, 0.5, -0.25, 0.125, 1.0);
        let packet = decode_packet(&bytes).unwrap();
        assert_eq!(packet.tick, 123_456);
        assert_eq!(packet.quaternion, [0.5, -0.25, 0.125, 1.0]);
    }

    #[test]
    fn rejects_short_packets() {
        assert!(decode_packet(&[0u8; 19]).is_err());
        assert!(decode_packet(&[0u8; 21]).is_err());
    }

    #[test]
    fn control_command_bytes() {
        assert_eq!(control_command(true), [0x01, 0x01, 0x02]);
        assert_eq!(control_command(false), [0x01, 0x00, 0x02]);
    }

    #[test]
    fn maps_known_uuids_to_capabilities() {
        assert_eq!(capability_for_uuid(CONTROL_UUID), Some(Capability::Control));
        assert_eq!(
            capability_for_uuid(&MEASUREMENT_UUID.replace('-', "")),
            Some(Capability::Measurement)
        );
        assert_eq!(capability_for_uuid("deadbeef"), None);
    }
}
