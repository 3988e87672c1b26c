//! Scripted transport shared by the integration tests.
//!
//! The test keeps a `Script` handle while the worker owns the transport, so it
//! can feed notifications, inject failures and inspect writes from outside.

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use uuid::Uuid;

use agrisense::{
    AppConfig, Event, EventReceiver, PeerDescriptor, TransportError,
    ingest::{
        codec::{self, SensorChannel},
        transport::{Notification, SessionHandle, Transport},
    },
};

pub const NODE: &str = "AA:BB:CC";

#[derive(Default)]
struct ScriptState {
    peers: Vec<PeerDescriptor>,
    notifications: VecDeque<Notification>,
    writes: Vec<u8>,
    subscriptions: Vec<Uuid>,
    open: Option<SessionHandle>,
    next_handle: u32,
    fail_scan: bool,
    fail_connect: bool,
    fail_subscribe: bool,
    fail_write: bool,
    link_lost: bool,
}

#[derive(Clone, Default)]
pub struct Script {
    state: Arc<Mutex<ScriptState>>,
}

impl Script {
    pub fn with_peers(peers: Vec<PeerDescriptor>) -> Self {
        let script = Self::default();
        script.state.lock().peers = peers;
        script
    }

    pub fn transport(&self) -> ScriptedTransport {
        ScriptedTransport { script: self.clone() }
    }

    pub fn notify(&self, characteristic: Uuid, payload: Vec<u8>) {
        self.state.lock().notifications.push_back(Notification { characteristic, payload });
    }

    pub fn notify_reading(&self, channel: SensorChannel, value: f64) {
        self.notify(channel.characteristic(), codec::encode_reading(channel, value));
    }

    pub fn writes(&self) -> Vec<u8> {
        self.state.lock().writes.clone()
    }

    pub fn subscriptions(&self) -> usize {
        self.state.lock().subscriptions.len()
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open.is_some()
    }

    pub fn fail_scan(&self, fail: bool) {
        self.state.lock().fail_scan = fail;
    }

    pub fn fail_connect(&self, fail: bool) {
        self.state.lock().fail_connect = fail;
    }

    pub fn fail_subscribe(&self, fail: bool) {
        self.state.lock().fail_subscribe = fail;
    }

    pub fn fail_write(&self, fail: bool) {
        self.state.lock().fail_write = fail;
    }

    pub fn lose_link(&self, lost: bool) {
        self.state.lock().link_lost = lost;
    }
}

pub struct ScriptedTransport {
    script: Script,
}

impl Transport for ScriptedTransport {
    fn scan(&mut self, _timeout: Duration) -> Result<Vec<PeerDescriptor>, TransportError> {
        let s = self.script.state.lock();
        if s.fail_scan {
            return Err(TransportError::ScanFailed("adapter unavailable".into()));
        }
        Ok(s.peers.clone())
    }

    fn connect(&mut self, address: &str) -> Result<SessionHandle, TransportError> {
        let mut s = self.script.state.lock();
        if s.fail_connect {
            return Err(TransportError::ConnectFailed(format!("{} refused", address)));
        }
        s.next_handle += 1;
        let handle = SessionHandle(s.next_handle);
        s.open = Some(handle);
        s.link_lost = false;
        Ok(handle)
    }

    fn subscribe(&mut self, _handle: SessionHandle, characteristic: Uuid) -> Result<(), TransportError> {
        let mut s = self.script.state.lock();
        if s.fail_subscribe {
            return Err(TransportError::SubscribeFailed(format!("{} not notifiable", characteristic)));
        }
        s.subscriptions.push(characteristic);
        Ok(())
    }

    fn write(&mut self, _handle: SessionHandle, _characteristic: Uuid, value: &[u8]) -> Result<(), TransportError> {
        let mut s = self.script.state.lock();
        if s.fail_write {
            return Err(TransportError::WriteFailed("peer rejected write".into()));
        }
        s.writes.extend_from_slice(value);
        Ok(())
    }

    fn next_notification(
        &mut self,
        _handle: SessionHandle,
        timeout: Duration,
    ) -> Result<Option<Notification>, TransportError> {
        {
            let mut s = self.script.state.lock();
            if s.link_lost {
                return Err(TransportError::LinkLost("peer out of range".into()));
            }
            if let Some(n) = s.notifications.pop_front() {
                return Ok(Some(n));
            }
        }
        thread::sleep(timeout);
        Ok(None)
    }

    fn disconnect(&mut self, _handle: SessionHandle) -> Result<(), TransportError> {
        let mut s = self.script.state.lock();
        s.open = None;
        s.subscriptions.clear();
        Ok(())
    }
}

pub fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.worker.poll_interval_ms = 5;
    config
}

/// Polls `cond` until it holds or two seconds pass.
pub fn eventually(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Collects presentation events until `stop` matches one, or two seconds pass.
pub fn collect_until(events: &EventReceiver, stop: impl Fn(&Event) -> bool) -> Vec<Event> {
    let deadline = Instant::now() + Duration::from_secs(2);
    let mut seen = Vec::new();
    while Instant::now() < deadline {
        if let Ok(e) = events.recv_timeout(Duration::from_millis(20)) {
            let done = stop(&e);
            seen.push(e);
            if done {
                break;
            }
        }
    }
    seen
}

pub fn lifecycle_names(events: &[Event]) -> Vec<&'static str> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Lifecycle(s) => Some(s.name()),
            _ => None,
        })
        .collect()
}
