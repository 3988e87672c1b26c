//! event_channel.rs
//! Bounded, ordered, multi-producer/single-consumer conduit for core events.
//!
//! Push never blocks the producer. When the queue is full:
//! - the oldest pending `SensorUpdate` is evicted to make room,
//! - failing that, the oldest pending `Status` is evicted,
//! - `Lifecycle` events are never evicted. Only when the queue holds nothing but
//!   lifecycle events is an incoming `SensorUpdate`/`Status` dropped, and an
//!   incoming `Lifecycle` queued past capacity.
//!
//! Every loss is counted.
//!
//! FIFO order is kept for everything that survives, so events of one channel
//! reach the consumer in production order.

use std::{
    collections::VecDeque,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use crossbeam::channel::{RecvError, RecvTimeoutError, TryRecvError};
use parking_lot::{Condvar, Mutex};

use crate::control::command_channel::ActuatorCommand;
use crate::error::TransportError;
use crate::ingest::{
    codec::SensorReading,
    session::ConnectionState,
    transport::PeerDescriptor,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Ok,
    Warn,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Ok => "ok",
            Severity::Warn => "warn",
            Severity::Error => "error",
        })
    }
}

/// Typed payload of a status report, so a consumer can render without calling back.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusDetail {
    Note,
    ScanComplete(Vec<PeerDescriptor>),
    CommandIssued(ActuatorCommand),
    WriteApplied(u8),
    WriteDropped(u8),
    Failure(TransportError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub severity: Severity,
    pub text: String,
    pub detail: StatusDetail,
}

impl StatusReport {
    pub fn new(severity: Severity, text: impl Into<String>, detail: StatusDetail) -> Self {
        Self {
            severity,
            text: text.into(),
            detail,
        }
    }

    pub fn note(severity: Severity, text: impl Into<String>) -> Self {
        Self::new(severity, text, StatusDetail::Note)
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.text)
    }
}

/// Everything that flows from the worker to the control loop and on to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Lifecycle(ConnectionState),
    SensorUpdate(SensorReading),
    Status(StatusReport),
}

impl Event {
    /// Lifecycle transitions are the only events that are never discarded.
    #[inline]
    pub fn is_droppable(&self) -> bool {
        !matches!(self, Event::Lifecycle(_))
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Lifecycle(state) => write!(f, "state: {}", state),
            Event::SensorUpdate(reading) => write!(f, "{}", reading),
            Event::Status(status) => write!(f, "{}", status),
        }
    }
}

/// Result of a non-blocking push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queued after evicting the oldest pending sensor update.
    EvictedOldest,
    /// Queued after evicting the oldest pending status (no sensor update was left).
    EvictedStatus,
    /// Queue held only lifecycle events; the incoming event was discarded.
    DroppedIncoming,
}

impl PushOutcome {
    #[inline]
    pub fn lost_event(&self) -> bool {
        !matches!(self, PushOutcome::Queued)
    }
}

struct Shared {
    queue: Mutex<VecDeque<Event>>,
    ready: Condvar,
    capacity: usize,
    senders: AtomicUsize,
    dropped: AtomicU64,
}

/// Creates a channel holding at most `capacity` events, plus any lifecycle
/// events that arrive while it is full of lifecycle events.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    let capacity = capacity.max(1);
    let shared = Arc::new(Shared {
        queue: Mutex::new(VecDeque::with_capacity(capacity)),
        ready: Condvar::new(),
        capacity,
        senders: AtomicUsize::new(1),
        dropped: AtomicU64::new(0),
    });
    (
        EventSender { shared: shared.clone() },
        EventReceiver { shared },
    )
}

pub struct EventSender {
    shared: Arc<Shared>,
}

impl EventSender {
    pub fn push(&self, event: Event) -> PushOutcome {
        let outcome = {
            let mut q = self.shared.queue.lock();
            if q.len() < self.shared.capacity {
                q.push_back(event);
                PushOutcome::Queued
            } else if let Some(pos) = q.iter().position(|e| matches!(e, Event::SensorUpdate(_))) {
                q.remove(pos);
                q.push_back(event);
                PushOutcome::EvictedOldest
            } else if let Some(pos) = q.iter().position(|e| matches!(e, Event::Status(_))) {
                q.remove(pos);
                q.push_back(event);
                PushOutcome::EvictedStatus
            } else if event.is_droppable() {
                PushOutcome::DroppedIncoming
            } else {
                q.push_back(event);
                PushOutcome::Queued
            }
        };

        if outcome.lost_event() {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
        }
        if outcome != PushOutcome::DroppedIncoming {
            self.shared.ready.notify_one();
        }
        outcome
    }

    /// Total events lost to backpressure on this channel.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

impl Clone for EventSender {
    fn clone(&self) -> Self {
        self.shared.senders.fetch_add(1, Ordering::AcqRel);
        Self { shared: self.shared.clone() }
    }
}

impl Drop for EventSender {
    fn drop(&mut self) {
        if self.shared.senders.fetch_sub(1, Ordering::AcqRel) == 1 {
            // Take the lock so a receiver between its empty-check and wait sees the notify.
            let _guard = self.shared.queue.lock();
            self.shared.ready.notify_all();
        }
    }
}

/// Consumer end. Clones compete for the same queue.
#[derive(Clone)]
pub struct EventReceiver {
    shared: Arc<Shared>,
}

impl EventReceiver {
    fn disconnected(&self) -> bool {
        self.shared.senders.load(Ordering::Acquire) == 0
    }

    pub fn try_recv(&self) -> Result<Event, TryRecvError> {
        let mut q = self.shared.queue.lock();
        match q.pop_front() {
            Some(e) => Ok(e),
            None if self.disconnected() => Err(TryRecvError::Disconnected),
            None => Err(TryRecvError::Empty),
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<Event, RecvTimeoutError> {
        let deadline = Instant::now() + timeout;
        let mut q = self.shared.queue.lock();
        loop {
            if let Some(e) = q.pop_front() {
                return Ok(e);
            }
            if self.disconnected() {
                return Err(RecvTimeoutError::Disconnected);
            }
            if self.shared.ready.wait_until(&mut q, deadline).timed_out() {
                return q.pop_front().ok_or(RecvTimeoutError::Timeout);
            }
        }
    }

    pub fn recv(&self) -> Result<Event, RecvError> {
        let mut q = self.shared.queue.lock();
        loop {
            if let Some(e) = q.pop_front() {
                return Ok(e);
            }
            if self.disconnected() {
                return Err(RecvError);
            }
            self.shared.ready.wait(&mut q);
        }
    }

    /// Drains everything currently queued without waiting.
    pub fn try_iter(&self) -> impl Iterator<Item = Event> + '_ {
        std::iter::from_fn(move || self.try_recv().ok())
    }

    pub fn len(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}
