//! session.rs
//! Connection/session state machine for one sensor peer.
//!
//! ```text
//! Idle --scan--> Scanning --results--> Idle
//! Idle --connect--> Discovered --> Connecting --ack--> Connected
//! Connected --subscribe_all--> Subscribing --ack--> Streaming
//! Connected | Subscribing | Streaming | Failed --disconnect--> Disconnecting --> Idle
//! any --transport error--> Failed(reason)
//! ```
//!
//! Transport failures stop here: they become `Failed(reason)` plus an error
//! status notice, never an `Err` for the caller. The caller only sees
//! `SessionError` for operations that are illegal in the current state.
//! Every transition and status is queued as a `SessionNotice`; the worker drains
//! and publishes them.

use std::{
    collections::{HashSet, VecDeque},
    fmt,
    time::Duration,
};

use log::{debug, error, info, warn};

use crate::control::command_channel::ActuatorCommand;
use crate::error::{SessionError, TransportError};
use crate::ingest::{
    codec::{self, SensorChannel, BRIGHTNESS_CHAR_UUID},
    event_channel::{Severity, StatusDetail, StatusReport},
    transport::{Notification, PeerDescriptor, SessionHandle, Transport},
};

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Idle,
    Scanning,
    Discovered(PeerDescriptor),
    Connecting(PeerDescriptor),
    Connected(PeerDescriptor, SessionHandle),
    Subscribing(PeerDescriptor, SessionHandle),
    Streaming(PeerDescriptor, SessionHandle),
    Disconnecting,
    Failed(TransportError),
}

impl ConnectionState {
    /// Connected or Streaming: the only states that accept actuator writes.
    #[inline]
    pub fn is_live(&self) -> bool {
        matches!(self, ConnectionState::Connected(..) | ConnectionState::Streaming(..))
    }

    #[inline]
    pub fn is_streaming(&self) -> bool {
        matches!(self, ConnectionState::Streaming(..))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "Idle",
            ConnectionState::Scanning => "Scanning",
            ConnectionState::Discovered(_) => "Discovered",
            ConnectionState::Connecting(_) => "Connecting",
            ConnectionState::Connected(..) => "Connected",
            ConnectionState::Subscribing(..) => "Subscribing",
            ConnectionState::Streaming(..) => "Streaming",
            ConnectionState::Disconnecting => "Disconnecting",
            ConnectionState::Failed(_) => "Failed",
        }
    }

    fn handle(&self) -> Option<SessionHandle> {
        match self {
            ConnectionState::Connected(_, h)
            | ConnectionState::Subscribing(_, h)
            | ConnectionState::Streaming(_, h) => Some(*h),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Discovered(p) | ConnectionState::Connecting(p) => {
                write!(f, "{} ({})", self.name(), p.address)
            }
            ConnectionState::Connected(p, h)
            | ConnectionState::Subscribing(p, h)
            | ConnectionState::Streaming(p, h) => write!(f, "{} ({} {})", self.name(), p.address, h),
            ConnectionState::Failed(reason) => write!(f, "Failed: {}", reason),
            _ => f.write_str(self.name()),
        }
    }
}

/// Something the session wants published.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    Transition(ConnectionState),
    Status(StatusReport),
}

pub struct Session<T: Transport> {
    transport: T,
    state: ConnectionState,
    peers: Vec<PeerDescriptor>,
    max_scan_results: usize,
    scan_timeout: Duration,
    open: Option<SessionHandle>,
    notices: VecDeque<SessionNotice>,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, max_scan_results: usize, scan_timeout: Duration) -> Self {
        Self {
            transport,
            state: ConnectionState::Idle,
            peers: Vec::new(),
            max_scan_results,
            scan_timeout,
            open: None,
            notices: VecDeque::new(),
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Snapshot of the last scan, strongest signal first.
    pub fn peers(&self) -> &[PeerDescriptor] {
        &self.peers
    }

    pub fn drain_notices(&mut self) -> impl Iterator<Item = SessionNotice> + '_ {
        self.notices.drain(..)
    }

    /// Hands the transport back, e.g. when the worker stops.
    pub fn into_transport(self) -> T {
        self.transport
    }

    fn transition(&mut self, next: ConnectionState) {
        debug!("[Session] {} -> {}", self.state.name(), next.name());
        self.state = next.clone();
        self.notices.push_back(SessionNotice::Transition(next));
    }

    fn status(&mut self, status: StatusReport) {
        self.notices.push_back(SessionNotice::Status(status));
    }

    fn fail(&mut self, reason: TransportError) {
        error!("[Session] {}", reason);
        self.transition(ConnectionState::Failed(reason.clone()));
        self.status(StatusReport::new(
            Severity::Error,
            reason.to_string(),
            StatusDetail::Failure(reason),
        ));
    }

    fn invalid(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidState {
            operation,
            state: self.state.name().to_string(),
        }
    }

    /// Discovers peers. Scanning with zero results is not an error.
    pub fn scan(&mut self) -> Result<(), SessionError> {
        if self.state != ConnectionState::Idle {
            return Err(self.invalid("scan"));
        }
        self.transition(ConnectionState::Scanning);

        match self.transport.scan(self.scan_timeout) {
            Ok(mut found) => {
                let mut seen = HashSet::new();
                found.retain(|p| seen.insert(p.address.clone()));
                found.sort_by(|a, b| b.signal_strength.cmp(&a.signal_strength));
                found.truncate(self.max_scan_results);
                self.peers = found.clone();
                self.transition(ConnectionState::Idle);

                let status = if found.is_empty() {
                    StatusReport::new(Severity::Warn, "No devices found", StatusDetail::ScanComplete(found))
                } else {
                    StatusReport::new(
                        Severity::Ok,
                        format!("Found {} device(s)", found.len()),
                        StatusDetail::ScanComplete(found),
                    )
                };
                info!("[Session] {}", status.text);
                self.status(status);
            }
            Err(e) => self.fail(e),
        }
        Ok(())
    }

    /// Opens a session to `address`. Fails fast, without a transition, unless Idle.
    pub fn connect(&mut self, address: &str) -> Result<(), SessionError> {
        if self.state != ConnectionState::Idle {
            return Err(self.invalid("connect"));
        }

        let peer = self
            .peers
            .iter()
            .find(|p| p.address == address)
            .cloned()
            .unwrap_or_else(|| PeerDescriptor::bare(address));

        self.transition(ConnectionState::Discovered(peer.clone()));
        self.transition(ConnectionState::Connecting(peer.clone()));

        match self.transport.connect(address) {
            Ok(handle) => {
                info!("[Session] connected to {} ({})", address, handle);
                self.open = Some(handle);
                self.status(StatusReport::note(Severity::Ok, format!("Connected to {}", address)));
                self.transition(ConnectionState::Connected(peer, handle));
            }
            Err(e) => self.fail(e),
        }
        Ok(())
    }

    /// Subscribes every telemetry characteristic; Connected -> Streaming.
    pub fn subscribe_all(&mut self) -> Result<(), SessionError> {
        let (peer, handle) = match &self.state {
            ConnectionState::Connected(p, h) => (p.clone(), *h),
            _ => return Err(self.invalid("subscribe")),
        };
        self.transition(ConnectionState::Subscribing(peer.clone(), handle));

        for channel in SensorChannel::ALL {
            if let Err(e) = self.transport.subscribe(handle, channel.characteristic()) {
                self.fail(e);
                return Ok(());
            }
        }

        info!("[Session] streaming from {}", peer.address);
        self.transition(ConnectionState::Streaming(peer, handle));
        Ok(())
    }

    /// Closes the session. While Idle nothing is closed, but `Idle` is re-announced.
    pub fn disconnect(&mut self) -> Result<(), SessionError> {
        match &self.state {
            ConnectionState::Idle => {
                self.transition(ConnectionState::Idle);
                return Ok(());
            }
            ConnectionState::Connected(..)
            | ConnectionState::Subscribing(..)
            | ConnectionState::Streaming(..)
            | ConnectionState::Failed(_) => {}
            _ => return Err(self.invalid("disconnect")),
        }

        // Failed keeps no handle in its state, but the transport session may still be open.
        let handle = self.open.take();
        self.transition(ConnectionState::Disconnecting);

        if let Some(h) = handle {
            if let Err(e) = self.transport.disconnect(h) {
                warn!("[Session] close failed: {}", e);
                self.status(StatusReport::new(
                    Severity::Warn,
                    format!("Close failed: {}", e),
                    StatusDetail::Failure(e),
                ));
            }
        }

        self.transition(ConnectionState::Idle);
        self.status(StatusReport::note(Severity::Warn, "Disconnected"));
        Ok(())
    }

    /// Writes a brightness command. Outside Connected/Streaming the command is dropped.
    pub fn write(&mut self, command: &ActuatorCommand) -> Result<(), SessionError> {
        let handle = match (&self.state, self.state.handle()) {
            (s, Some(h)) if s.is_live() => h,
            _ => return Err(SessionError::NotConnected),
        };

        let payload = match codec::encode(command) {
            Ok(p) => p,
            Err(e) => {
                warn!("[Session] dropping command: {}", e);
                return Ok(());
            }
        };

        let percent = command.brightness_percent();
        match self.transport.write(handle, BRIGHTNESS_CHAR_UUID, &payload) {
            Ok(()) => {
                info!("[Session] brightness -> {}%", percent);
                self.status(StatusReport::new(
                    Severity::Ok,
                    format!("Light brightness -> {}%", percent),
                    StatusDetail::WriteApplied(percent),
                ));
            }
            Err(e) => self.fail(e),
        }
        Ok(())
    }

    /// Waits up to `timeout` for the next notification while Streaming.
    pub fn next_notification(&mut self, timeout: Duration) -> Option<Notification> {
        let handle = match &self.state {
            ConnectionState::Streaming(_, h) => *h,
            _ => return None,
        };
        match self.transport.next_notification(handle, timeout) {
            Ok(n) => n,
            Err(e) => {
                self.fail(e);
                None
            }
        }
    }

    /// Closes whatever is open; used when the worker stops.
    pub fn shutdown(&mut self) {
        if self.state == ConnectionState::Idle {
            return;
        }
        if self.open.is_some() || matches!(self.state, ConnectionState::Failed(_)) {
            let _ = self.disconnect();
        } else {
            // Transient states only exist inside a single call on this thread.
            self.transition(ConnectionState::Idle);
        }
    }
}
