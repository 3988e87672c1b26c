//! transport.rs
//! Opaque wireless transport capability plus a simulated sensor node.
//!
//! The core only needs four things from the radio stack: discover peers, open a
//! session, subscribe to a characteristic, write a value. Everything below that
//! (advertising parsing, GATT discovery, pairing) belongs to the implementation.
//!
//! `SimulatedTransport` stands in for real hardware: it advertises the sensor node
//! and a light bulb, and emits drifting readings once per sample period.

use std::{
    collections::{HashSet, VecDeque},
    fmt,
    time::{Duration, Instant},
};

use log::{debug, info};
use rand::random_range;
use spin_sleep::{SpinSleeper, SpinStrategy};
use uuid::Uuid;

use crate::error::TransportError;
use crate::ingest::codec::{self, SensorChannel, BRIGHTNESS_CHAR_UUID};

/// A peer seen during a scan. Value type; never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerDescriptor {
    pub name: String,
    pub address: String,
    /// RSSI in dBm, when the scan reported one.
    pub signal_strength: Option<i16>,
}

impl PeerDescriptor {
    pub fn new(name: impl Into<String>, address: impl Into<String>, signal_strength: Option<i16>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            signal_strength,
        }
    }

    /// Descriptor for an address that was never seen in a scan.
    pub fn bare(address: impl Into<String>) -> Self {
        Self::new("", address, None)
    }
}

impl fmt::Display for PeerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = if self.name.is_empty() { "(unnamed)" } else { &self.name };
        match self.signal_strength {
            Some(rssi) => write!(f, "{} | {} | RSSI {} dBm", name, self.address, rssi),
            None => write!(f, "{} | {}", name, self.address),
        }
    }
}

/// Transport-issued identifier of an open session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(pub u32);

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Raw notification pushed by the peer on a subscribed characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub characteristic: Uuid,
    pub payload: Vec<u8>,
}

/// Capability the session drives. All operations may block; they are the only
/// suspension points of the ingestion thread.
pub trait Transport: Send {
    fn scan(&mut self, timeout: Duration) -> Result<Vec<PeerDescriptor>, TransportError>;

    fn connect(&mut self, address: &str) -> Result<SessionHandle, TransportError>;

    fn subscribe(&mut self, handle: SessionHandle, characteristic: Uuid) -> Result<(), TransportError>;

    fn write(&mut self, handle: SessionHandle, characteristic: Uuid, value: &[u8]) -> Result<(), TransportError>;

    /// Waits at most `timeout` for the next notification.
    fn next_notification(
        &mut self,
        handle: SessionHandle,
        timeout: Duration,
    ) -> Result<Option<Notification>, TransportError>;

    fn disconnect(&mut self, handle: SessionHandle) -> Result<(), TransportError>;
}

// ============================================================================
// Simulated sensor node
// ============================================================================

/// Drift profile of a simulated channel: base value plus uniform noise.
fn base_value(channel: SensorChannel) -> f64 {
    match channel {
        SensorChannel::Temperature => 22.0,
        SensorChannel::Humidity => 45.0,
        SensorChannel::Light => 120.0,
        SensorChannel::Moisture => 2_200.0,
    }
}

fn noise_range(channel: SensorChannel) -> (f64, f64) {
    match channel {
        SensorChannel::Temperature => (0.0, 1.5),
        SensorChannel::Humidity => (0.0, 10.0),
        SensorChannel::Light => (0.0, 80.0),
        SensorChannel::Moisture => (-400.0, 400.0),
    }
}

pub struct SimulatedTransport {
    devices: Vec<PeerDescriptor>,
    sample_period: Duration,
    sleeper: SpinSleeper,
    next_sample: Instant,
    pending: VecDeque<Notification>,
    open: Option<SessionHandle>,
    subscribed: HashSet<Uuid>,
    next_handle: u32,
    brightness: Option<u8>,
}

impl SimulatedTransport {
    pub fn new(devices: Vec<PeerDescriptor>, sample_period: Duration) -> Self {
        Self {
            devices,
            sample_period,
            sleeper: SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread),
            next_sample: Instant::now(),
            pending: VecDeque::new(),
            open: None,
            subscribed: HashSet::new(),
            next_handle: 1,
            brightness: None,
        }
    }

    /// The two peers the bench setup advertises.
    pub fn default_devices() -> Vec<PeerDescriptor> {
        vec![
            PeerDescriptor::new("nRF52840_SensorNode", "AA:BB:CC:11:22:33", Some(-48)),
            PeerDescriptor::new("AwoX SmartLight", "DD:EE:FF:44:55:66", Some(-60)),
        ]
    }

    /// Last brightness written by the core, if any.
    pub fn brightness(&self) -> Option<u8> {
        self.brightness
    }

    fn check_handle(&self, handle: SessionHandle) -> bool {
        self.open == Some(handle)
    }

    fn sample(&mut self) {
        for channel in SensorChannel::ALL {
            let characteristic = channel.characteristic();
            if !self.subscribed.contains(&characteristic) {
                continue;
            }
            let (lo, hi) = noise_range(channel);
            let value = base_value(channel) + random_range(lo..hi);
            self.pending.push_back(Notification {
                characteristic,
                payload: codec::encode_reading(channel, value),
            });
        }
        self.next_sample += self.sample_period;
    }
}

impl Transport for SimulatedTransport {
    fn scan(&mut self, _timeout: Duration) -> Result<Vec<PeerDescriptor>, TransportError> {
        debug!("[SimNode] scan -> {} device(s)", self.devices.len());
        Ok(self.devices.clone())
    }

    fn connect(&mut self, address: &str) -> Result<SessionHandle, TransportError> {
        if self.open.is_some() {
            return Err(TransportError::ConnectFailed("session already open".into()));
        }
        if !self.devices.iter().any(|d| d.address == address) {
            return Err(TransportError::ConnectFailed(format!("no peer at {}", address)));
        }

        let handle = SessionHandle(self.next_handle);
        self.next_handle += 1;
        self.open = Some(handle);
        self.next_sample = Instant::now() + self.sample_period;
        info!("[SimNode] connected {} as {}", address, handle);
        Ok(handle)
    }

    fn subscribe(&mut self, handle: SessionHandle, characteristic: Uuid) -> Result<(), TransportError> {
        if !self.check_handle(handle) {
            return Err(TransportError::SubscribeFailed(format!("unknown session {}", handle)));
        }
        self.subscribed.insert(characteristic);
        Ok(())
    }

    fn write(&mut self, handle: SessionHandle, characteristic: Uuid, value: &[u8]) -> Result<(), TransportError> {
        if !self.check_handle(handle) {
            return Err(TransportError::WriteFailed(format!("unknown session {}", handle)));
        }
        if characteristic != BRIGHTNESS_CHAR_UUID {
            return Err(TransportError::WriteFailed(format!("characteristic {} is not writable", characteristic)));
        }
        let percent = codec::decode_brightness(value)
            .ok_or_else(|| TransportError::WriteFailed(format!("bad brightness payload {:?}", value)))?;

        self.brightness = Some(percent);
        info!("[SimNode] brightness -> {}%", percent);
        Ok(())
    }

    fn next_notification(
        &mut self,
        handle: SessionHandle,
        timeout: Duration,
    ) -> Result<Option<Notification>, TransportError> {
        if !self.check_handle(handle) {
            return Err(TransportError::LinkLost(format!("unknown session {}", handle)));
        }
        if let Some(n) = self.pending.pop_front() {
            return Ok(Some(n));
        }

        let now = Instant::now();
        if now < self.next_sample {
            let wait = self.next_sample - now;
            if wait > timeout {
                self.sleeper.sleep(timeout);
                return Ok(None);
            }
            self.sleeper.sleep(wait);
        }

        self.sample();
        Ok(self.pending.pop_front())
    }

    fn disconnect(&mut self, handle: SessionHandle) -> Result<(), TransportError> {
        if !self.check_handle(handle) {
            return Err(TransportError::LinkLost(format!("unknown session {}", handle)));
        }
        self.open = None;
        self.subscribed.clear();
        self.pending.clear();
        info!("[SimNode] disconnected {}", handle);
        Ok(())
    }
}
