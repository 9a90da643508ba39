/// Decoding of the sensor characteristic payload
use log::warn;

use crate::error::BleError;
use crate::models::SensorReading;

/// Minimum payload length: two little-endian f32 values
pub const PAYLOAD_LEN: usize = 8;

/// Decode the temperature/humidity characteristic
///
/// The sensor exposes a payload of at least 8 bytes:
/// - Bytes 0-3: Temperature (little-endian f32, °C)
/// - Bytes 4-7: Humidity (little-endian f32, %RH)
///
/// Trailing bytes are ignored.
pub fn decode_sensor_payload(data: &[u8]) -> Result<SensorReading, BleError> {
    if data.len() < PAYLOAD_LEN {
        warn!("Short sensor payload: len={}", data.len());
        return Err(BleError::InvalidPayload(format!(
            "expected at least {} bytes, got {}",
            PAYLOAD_LEN,
            data.len()
        )));
    }

    let temperature = f32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    let humidity = f32::from_le_bytes([data[4], data[5], data[6], data[7]]);

    Ok(SensorReading {
        temperature,
        humidity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_little_endian_float_pair() {
        let reading = decode_sensor_payload(&[0, 0, 128, 63, 0, 0, 0, 64]).unwrap();
        assert_eq!(reading.temperature, 1.0);
        assert_eq!(reading.humidity, 2.0);
    }

    #[test]
    fn ignores_trailing_bytes() {
        let mut payload = 23.5f32.to_le_bytes().to_vec();
        payload.extend_from_slice(&55.25f32.to_le_bytes());
        payload.extend_from_slice(&[0xff, 0xee]);
        let reading = decode_sensor_payload(&payload).unwrap();
        assert_eq!(reading.temperature, 23.5);
        assert_eq!(reading.humidity, 55.25);
    }

    #[test]
    fn short_payload_is_an_error() {
        for len in 0..PAYLOAD_LEN {
            let err = decode_sensor_payload(&vec![0u8; len]).unwrap_err();
            assert!(matches!(err, BleError::InvalidPayload(_)));
        }
    }
}
