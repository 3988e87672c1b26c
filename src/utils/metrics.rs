//! Run counters for the ingestion/control core.
//!
//! Producers only ever increment; the collaborator reads a copy through
//! `Monitor::metrics()`. Nothing in the core makes decisions from these values.

use std::{
    collections::VecDeque,
    fmt,
    sync::{Arc, Mutex},
};

/// Counted occurrences, attributed to the component that saw them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    /// Raw notification pulled from the transport.
    Notification,
    /// Notification decoded and published as a reading.
    Reading,
    DecodeError,
    UnknownCharacteristic,
    /// Event lost on the worker → control loop channel.
    DroppedEvent,
    /// Event lost on the presentation stream (consumer lagging or absent).
    PresentationDropped,
    CommandIssued,
    /// Undelivered command overwritten by a newer one.
    CommandCoalesced,
    WriteApplied,
    WriteFailed,
    /// Write refused because no session was live.
    WriteDropped,
}

#[derive(Debug, Default, Clone)]
pub struct Metrics {
    pub notifications: u64,
    pub readings: u64,
    pub decode_errors: u64,
    pub unknown_characteristics: u64,
    pub dropped_events: u64,
    pub presentation_dropped: u64,
    pub commands_issued: u64,
    pub commands_coalesced: u64,
    pub writes_applied: u64,
    pub writes_failed: u64,
    pub writes_dropped: u64,

    /// Brightness values issued by the control loop (last MAX_POINTS)
    pub brightness_history: VecDeque<u8>,
}

impl Metrics {
    pub fn record(&mut self, counter: Counter) {
        match counter {
            Counter::Notification => self.notifications += 1,
            Counter::Reading => self.readings += 1,
            Counter::DecodeError => self.decode_errors += 1,
            Counter::UnknownCharacteristic => self.unknown_characteristics += 1,
            Counter::DroppedEvent => self.dropped_events += 1,
            Counter::PresentationDropped => self.presentation_dropped += 1,
            Counter::CommandIssued => self.commands_issued += 1,
            Counter::CommandCoalesced => self.commands_coalesced += 1,
            Counter::WriteApplied => self.writes_applied += 1,
            Counter::WriteFailed => self.writes_failed += 1,
            Counter::WriteDropped => self.writes_dropped += 1,
        }
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "┌──────────────────────────────┬──────────┐")?;
        for (label, value) in [
            ("notifications", self.notifications),
            ("readings published", self.readings),
            ("decode errors", self.decode_errors),
            ("unknown characteristics", self.unknown_characteristics),
            ("dropped ingest events", self.dropped_events),
            ("dropped presentation events", self.presentation_dropped),
            ("commands issued", self.commands_issued),
            ("commands coalesced", self.commands_coalesced),
            ("writes applied", self.writes_applied),
            ("writes failed", self.writes_failed),
            ("writes dropped", self.writes_dropped),
        ] {
            writeln!(f, "│ {:<28} │ {:>8} │", label, value)?;
        }
        write!(f, "└──────────────────────────────┴──────────┘")
    }
}

pub type SharedMetrics = Arc<Mutex<Metrics>>;

pub const MAX_POINTS: usize = 64;

/// Applies `f` under the metrics lock, recovering from a poisoned lock.
#[inline]
pub fn with_metrics<R>(metrics: &SharedMetrics, f: impl FnOnce(&mut Metrics) -> R) -> R {
    let mut m = match metrics.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    f(&mut m)
}

#[inline]
pub fn record(metrics: &SharedMetrics, counter: Counter) {
    with_metrics(metrics, |m| m.record(counter));
}

/// Appends value to a history buffer; removes oldest if at capacity (FIFO).
#[inline]
pub fn push_capped(buf: &mut VecDeque<u8>, val: u8) {
    if buf.len() >= MAX_POINTS {
        buf.pop_front();
    }
    buf.push_back(val);
}
