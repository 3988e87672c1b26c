//! worker.rs
//! Ingestion worker: owns the session and turns transport traffic into events.
//!
//! One iteration (`step`):
//! 1. Session requests from the collaborator (scan / connect / disconnect).
//!    While not streaming the worker parks on the request queue for one poll
//!    interval instead of spinning.
//! 2. Pending actuator command, if any, written through the session.
//! 3. While streaming: wait up to one poll interval for a notification,
//!    decode, stamp, publish `SensorUpdate`.
//! 4. Session notices published as `Lifecycle` / `Status` events.
//!
//! Publishing never blocks on the consumer. Telemetry is lossy under
//! backpressure, lifecycle is not (see `event_channel`).

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, SystemTime},
};

use crossbeam::channel::{Receiver, RecvTimeoutError};
use log::{debug, info, warn};

use crate::control::command_channel::{ActuatorCommand, CommandReceiver};
use crate::error::SessionError;
use crate::ingest::{
    codec::{self, SensorChannel, SensorReading},
    event_channel::{Event, EventSender, Severity, StatusDetail, StatusReport},
    session::{ConnectionState, Session, SessionNotice},
    transport::{Notification, Transport},
};
use crate::utils::metrics::{self, Counter, SharedMetrics};

/// Collaborator → worker requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionRequest {
    Scan,
    Connect(String),
    Disconnect,
}

/// Stamps readings so that, per channel, time never goes backwards.
#[derive(Debug, Default)]
pub struct ChannelClock {
    last: HashMap<SensorChannel, SystemTime>,
}

impl ChannelClock {
    pub fn stamp(&mut self, channel: SensorChannel) -> SystemTime {
        self.stamp_at(channel, SystemTime::now())
    }

    pub fn stamp_at(&mut self, channel: SensorChannel, now: SystemTime) -> SystemTime {
        let ts = match self.last.get(&channel) {
            Some(prev) if *prev > now => *prev,
            _ => now,
        };
        self.last.insert(channel, ts);
        ts
    }
}

pub struct IngestionWorker<T: Transport> {
    session: Session<T>,
    requests: Receiver<SessionRequest>,
    commands: CommandReceiver,
    events: EventSender,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
    metrics: SharedMetrics,
    clock: ChannelClock,
}

impl<T: Transport + 'static> IngestionWorker<T> {
    pub fn new(
        session: Session<T>,
        requests: Receiver<SessionRequest>,
        commands: CommandReceiver,
        events: EventSender,
        running: Arc<AtomicBool>,
        poll_interval: Duration,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            session,
            requests,
            commands,
            events,
            running,
            poll_interval,
            metrics,
            clock: ChannelClock::default(),
        }
    }

    pub fn state(&self) -> &ConnectionState {
        self.session.state()
    }

    /// Spawns the worker on its own thread. The join handle yields the transport back.
    pub fn spawn(self) -> std::io::Result<JoinHandle<T>> {
        thread::Builder::new()
            .name("ingest-worker".to_string())
            .spawn(move || self.run())
    }

    /// Main loop; exits within one poll interval of `running` going false.
    pub fn run(mut self) -> T {
        info!("[Worker] started poll={}ms", self.poll_interval.as_millis());
        self.publish(Event::Lifecycle(self.session.state().clone()));

        while self.running.load(Ordering::Acquire) {
            self.step();
        }

        self.session.shutdown();
        self.publish_notices();
        info!("[Worker] stopped");
        self.session.into_transport()
    }

    /// One pass over requests, the command slot, and the transport.
    pub fn step(&mut self) {
        self.drain_requests();
        self.publish_notices();

        if let Some(command) = self.commands.take() {
            self.perform_write(command);
            self.publish_notices();
        }

        if self.session.state().is_streaming() {
            if let Some(notification) = self.session.next_notification(self.poll_interval) {
                self.ingest(notification);
            }
            self.publish_notices();
        }
    }

    fn drain_requests(&mut self) {
        if !self.session.state().is_streaming() && !self.commands.is_pending() {
            match self.requests.recv_timeout(self.poll_interval) {
                Ok(req) => self.handle_request(req),
                Err(RecvTimeoutError::Timeout) => return,
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("[Worker] request channel closed; stopping");
                    self.running.store(false, Ordering::Release);
                    return;
                }
            }
        }
        while let Ok(req) = self.requests.try_recv() {
            self.handle_request(req);
        }
    }

    fn handle_request(&mut self, req: SessionRequest) {
        debug!("[Worker] request {:?}", req);
        let result = match &req {
            SessionRequest::Scan => self.session.scan(),
            SessionRequest::Connect(address) => self.session.connect(address).and_then(|_| {
                if matches!(self.session.state(), ConnectionState::Connected(..)) {
                    self.session.subscribe_all()
                } else {
                    Ok(())
                }
            }),
            SessionRequest::Disconnect => self.session.disconnect(),
        };

        if let Err(e) = result {
            warn!("[Worker] {:?} rejected: {}", req, e);
            self.publish(Event::Status(StatusReport::note(Severity::Warn, e.to_string())));
        }
    }

    fn perform_write(&mut self, command: ActuatorCommand) {
        let percent = command.brightness_percent();
        match self.session.write(&command) {
            Ok(()) if self.session.state().is_live() => {
                metrics::record(&self.metrics, Counter::WriteApplied);
            }
            Ok(()) => metrics::record(&self.metrics, Counter::WriteFailed),
            Err(SessionError::NotConnected) => {
                warn!("[Worker] not connected; dropped brightness {}%", percent);
                metrics::record(&self.metrics, Counter::WriteDropped);
                self.publish(Event::Status(StatusReport::new(
                    Severity::Warn,
                    format!("Not connected; dropped brightness {}%", percent),
                    StatusDetail::WriteDropped(percent),
                )));
            }
            Err(e) => {
                warn!("[Worker] write rejected: {}", e);
                metrics::record(&self.metrics, Counter::WriteDropped);
                self.publish(Event::Status(StatusReport::new(
                    Severity::Warn,
                    e.to_string(),
                    StatusDetail::WriteDropped(percent),
                )));
            }
        }
    }

    fn ingest(&mut self, notification: Notification) {
        metrics::record(&self.metrics, Counter::Notification);

        let Some(channel) = SensorChannel::from_characteristic(&notification.characteristic) else {
            debug!("[Worker] ignoring characteristic {}", notification.characteristic);
            metrics::record(&self.metrics, Counter::UnknownCharacteristic);
            return;
        };

        match codec::decode(channel, &notification.payload) {
            Ok(value) => {
                let reading = SensorReading {
                    channel,
                    value,
                    observed_at: self.clock.stamp(channel),
                };
                self.publish(Event::SensorUpdate(reading));
                metrics::record(&self.metrics, Counter::Reading);
            }
            Err(e) => {
                warn!("[Worker] {}", e);
                metrics::record(&self.metrics, Counter::DecodeError);
            }
        }
    }

    fn publish_notices(&mut self) {
        let notices: Vec<SessionNotice> = self.session.drain_notices().collect();
        for notice in notices {
            let event = match notice {
                SessionNotice::Transition(state) => Event::Lifecycle(state),
                SessionNotice::Status(status) => Event::Status(status),
            };
            self.publish(event);
        }
    }

    fn publish(&self, event: Event) {
        let outcome = self.events.push(event);
        if outcome.lost_event() {
            debug!("[Worker] event channel full: {:?}", outcome);
            metrics::record(&self.metrics, Counter::DroppedEvent);
        }
    }
}
