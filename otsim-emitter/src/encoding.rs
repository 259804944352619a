//! Wire encoders for each transport.
//!
//! - Publish/subscribe: a self-describing payload (JSON or CBOR) published on
//!   `ot/device/<archetype>/<device_id>`.
//! - Fieldbus: 16-bit registers, timestamp first, then one scaled register per
//!   populated field, serialized big-endian.
//! - Constrained-device: nothing is encoded. That session only observes a
//!   remote resource and never sends measurements.

use otsim_common::{Format, Measurement, encode};

use crate::error::EncodeError;

/// Root of the publish/subscribe topic hierarchy.
pub const TOPIC_ROOT: &str = "ot/device";

/// Register address the fieldbus session writes to.
pub const REGISTER_START: u16 = 0;

/// Scale applied to readings before they are stored as integers.
pub const REGISTER_SCALE: f64 = 100.0;

/// Topic for a measurement: `ot/device/<archetype>/<device_id>`.
pub fn pubsub_topic(measurement: &Measurement) -> String {
    build_topic(measurement.archetype().as_str(), measurement.device_id())
}

/// Build a topic from its parts.
pub fn build_topic(archetype: &str, device_id: &str) -> String {
    format!("{}/{}/{}", TOPIC_ROOT, archetype, device_id)
}

/// Serialize a measurement as a publish/subscribe payload.
pub fn encode_pubsub(measurement: &Measurement, format: Format) -> Result<Vec<u8>, EncodeError> {
    Ok(encode(measurement, format)?)
}

/// Convert a measurement to register words.
///
/// The first two words hold the low and high 16 bits of the Unix timestamp.
/// Each populated field follows in register order as `round(value * 100)`.
/// Values that do not fit in a `u16` are rejected rather than wrapped.
pub fn encode_registers(measurement: &Measurement) -> Result<Vec<u16>, EncodeError> {
    let secs = measurement.timestamp().timestamp();
    let mut registers = vec![(secs & 0xFFFF) as u16, ((secs >> 16) & 0xFFFF) as u16];

    for (field, value) in measurement.readings().populated() {
        let scaled = (value * REGISTER_SCALE).round();
        if !(0.0..=f64::from(u16::MAX)).contains(&scaled) {
            return Err(EncodeError::RegisterOverflow {
                field: field.as_str(),
                value,
            });
        }
        registers.push(scaled as u16);
    }

    Ok(registers)
}

/// Serialize register words big-endian, two bytes per register.
pub fn registers_to_bytes(registers: &[u16]) -> Vec<u8> {
    registers.iter().flat_map(|reg| reg.to_be_bytes()).collect()
}

/// Parse big-endian bytes back into register words.
///
/// A trailing odd byte is ignored.
pub fn bytes_to_registers(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect()
}
