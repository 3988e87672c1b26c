//! error.rs
//! Error taxonomy for the ingestion/control core.
//!
//! - Codec errors never leave the worker (logged, reading dropped).
//! - Transport errors are absorbed by the Session and turned into `Failed(reason)` + a status event.
//! - Session errors are returned synchronously to whoever asked for the operation.

use thiserror::Error;

use crate::ingest::codec::SensorChannel;

/// Payload could not be decoded for its channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed {channel} payload: expected {expected} bytes, got {actual}")]
    MalformedPayload {
        channel: SensorChannel,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("brightness {0}% is outside 0..=100")]
    OutOfRange(u8),
}

/// Failures reported by the underlying wireless transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("scan failed: {0}")]
    ScanFailed(String),
    #[error("connect failed: {0}")]
    ConnectFailed(String),
    #[error("subscribe failed: {0}")]
    SubscribeFailed(String),
    #[error("write failed: {0}")]
    WriteFailed(String),
    #[error("link lost: {0}")]
    LinkLost(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("no live session (state must be Connected or Streaming)")]
    NotConnected,
    #[error("{operation} not allowed while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("worker is not running")]
    WorkerStopped,
    #[error("control loop is not running")]
    ControlLoopStopped,
    #[error("transport was lost when the worker thread panicked")]
    TransportLost,
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}
