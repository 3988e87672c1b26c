//! codec.rs
//! Fixed-width little-endian payload codec for the environmental service.
//! - Temperature, humidity, light: 4-byte IEEE-754 f32
//! - Moisture: 2-byte signed ADC count
//! - Actuator brightness: single unsigned byte in 0..=100
//!
//! Range policing is not done here: a `-1000.0` temperature sentinel or a
//! negative lux value decodes fine and is left to the control side.

use std::{fmt, time::SystemTime};

use byteorder::{ByteOrder, LittleEndian};
use uuid::Uuid;

use crate::control::command_channel::ActuatorCommand;
use crate::error::{DecodeError, EncodeError};

/// Advertised name of the sensor node firmware.
pub const SENSOR_NODE_NAME: &str = "SmartAgr";

pub const ENV_SERVICE_UUID: Uuid = Uuid::from_u128(0x12345678_1234_5678_1234_56789abcdea0);
pub const TEMPERATURE_CHAR_UUID: Uuid = Uuid::from_u128(0x12345678_1234_5678_1234_56789abcdea1);
pub const MOISTURE_CHAR_UUID: Uuid = Uuid::from_u128(0x12345678_1234_5678_1234_56789abcdea2);
pub const LIGHT_CHAR_UUID: Uuid = Uuid::from_u128(0x12345678_1234_5678_1234_56789abcdea3);
pub const HUMIDITY_CHAR_UUID: Uuid = Uuid::from_u128(0x12345678_1234_5678_1234_56789abcdea4);
/// Brightness characteristic of the light actuator.
pub const BRIGHTNESS_CHAR_UUID: Uuid = Uuid::from_u128(0x12345678_1234_5678_1234_56789abcdeb1);

const FLOAT_WIDTH: usize = 4;
const MOISTURE_WIDTH: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorChannel {
    Temperature,
    Humidity,
    Light,
    Moisture,
}

impl SensorChannel {
    pub const ALL: [SensorChannel; 4] = [
        SensorChannel::Temperature,
        SensorChannel::Humidity,
        SensorChannel::Light,
        SensorChannel::Moisture,
    ];

    pub fn characteristic(&self) -> Uuid {
        match self {
            SensorChannel::Temperature => TEMPERATURE_CHAR_UUID,
            SensorChannel::Humidity => HUMIDITY_CHAR_UUID,
            SensorChannel::Light => LIGHT_CHAR_UUID,
            SensorChannel::Moisture => MOISTURE_CHAR_UUID,
        }
    }

    pub fn from_characteristic(uuid: &Uuid) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.characteristic() == *uuid)
    }

    pub fn payload_width(&self) -> usize {
        match self {
            SensorChannel::Moisture => MOISTURE_WIDTH,
            _ => FLOAT_WIDTH,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SensorChannel::Temperature => "Temperature",
            SensorChannel::Humidity => "Humidity",
            SensorChannel::Light => "Light",
            SensorChannel::Moisture => "Moisture",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            SensorChannel::Temperature => "°C",
            SensorChannel::Humidity => "%",
            SensorChannel::Light => "lx",
            SensorChannel::Moisture => "adc",
        }
    }
}

impl fmt::Display for SensorChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One decoded, timestamped telemetry value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub channel: SensorChannel,
    pub value: f64,
    pub observed_at: SystemTime,
}

impl fmt::Display for SensorReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.channel {
            SensorChannel::Moisture => write!(f, "{}: {:.0}", self.channel, self.value),
            _ => write!(f, "{}: {:.2} {}", self.channel, self.value, self.channel.unit()),
        }
    }
}

/// Decodes a notification payload for `channel`.
pub fn decode(channel: SensorChannel, bytes: &[u8]) -> Result<f64, DecodeError> {
    let expected = channel.payload_width();
    if bytes.len() != expected {
        return Err(DecodeError::MalformedPayload {
            channel,
            expected,
            actual: bytes.len(),
        });
    }

    let value = match channel {
        SensorChannel::Moisture => LittleEndian::read_i16(bytes) as f64,
        _ => LittleEndian::read_f32(bytes) as f64,
    };
    Ok(value)
}

/// Inverse of [`decode`]. Float channels are narrowed to f32; moisture is
/// rounded and saturated to the i16 range.
pub fn encode_reading(channel: SensorChannel, value: f64) -> Vec<u8> {
    let mut buf = vec![0u8; channel.payload_width()];
    match channel {
        SensorChannel::Moisture => {
            let raw = value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16;
            LittleEndian::write_i16(&mut buf, raw);
        }
        _ => LittleEndian::write_f32(&mut buf, value as f32),
    }
    buf
}

/// Encodes an actuator command as the single brightness byte.
pub fn encode(command: &ActuatorCommand) -> Result<[u8; 1], EncodeError> {
    let percent = command.brightness_percent();
    if percent > 100 {
        return Err(EncodeError::OutOfRange(percent));
    }
    Ok([percent])
}

/// Decodes a brightness byte written to the actuator (used by transports that echo writes).
pub fn decode_brightness(bytes: &[u8]) -> Option<u8> {
    match bytes {
        [b] if *b <= 100 => Some(*b),
        _ => None,
    }
}
