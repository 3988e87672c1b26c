//! # agrisense
//! Ingestion and control core for a wireless agricultural sensor node.
//!
//! A worker thread drives the sensor session (scan, connect, subscribe,
//! stream) and decodes telemetry into events. A control loop turns light
//! readings into brightness commands for a smart bulb and forwards every
//! event to the presentation layer. `monitor::Monitor` ties both together.

pub mod config;
pub mod control;
pub mod error;
pub mod ingest;
pub mod monitor;
pub mod utils;

pub use config::AppConfig;
pub use control::controller::{ControlConfig, ControlMode};
pub use error::{ConfigError, DecodeError, EncodeError, MonitorError, SessionError, TransportError};
pub use ingest::event_channel::{Event, EventReceiver, Severity, StatusDetail, StatusReport};
pub use ingest::session::ConnectionState;
pub use ingest::transport::{PeerDescriptor, SimulatedTransport, Transport};
pub use monitor::Monitor;
