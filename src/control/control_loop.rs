//! control_loop.rs
//! Drives the controller from the inbound event stream.
//!
//! Per event:
//! 1. Drain pending `ControlRequest`s so configuration changes made before the
//!    event are visible to it.
//! 2. Run the control law; publish any command into the coalescing slot.
//! 3. Forward the event, then the control status, to the presentation stream.
//!
//! Runs on its own thread (`run`) or from a host's periodic tick (`poll`).

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam::channel::{Receiver, RecvTimeoutError};
use log::{debug, info};

use crate::control::{
    command_channel::CommandSender,
    controller::{ControlConfig, Controller, Decision},
};
use crate::ingest::event_channel::{Event, EventReceiver, EventSender};
use crate::utils::metrics::{self, Counter, SharedMetrics, push_capped, with_metrics};

/// Collaborator → control loop requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    /// Replace the config snapshot.
    Configure(ControlConfig),
    /// Issue the manual brightness once.
    ApplyManual,
}

pub struct ControlLoop {
    controller: Controller,
    config: ControlConfig,
    inbound: EventReceiver,
    requests: Receiver<ControlRequest>,
    commands: CommandSender,
    outbound: EventSender,
    metrics: SharedMetrics,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl ControlLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ControlConfig,
        inbound: EventReceiver,
        requests: Receiver<ControlRequest>,
        commands: CommandSender,
        outbound: EventSender,
        metrics: SharedMetrics,
        running: Arc<AtomicBool>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            controller: Controller::new(),
            config,
            inbound,
            requests,
            commands,
            outbound,
            metrics,
            running,
            poll_interval,
        }
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("control-loop".to_string())
            .spawn(move || self.run())
    }

    /// Blocking loop; exits within one poll interval of `running` going false,
    /// or once every inbound sender is gone and the queue is drained.
    pub fn run(mut self) {
        info!("[ControlLoop] started mode={}", self.config.mode);
        while self.running.load(Ordering::Acquire) {
            let next = self.inbound.recv_timeout(self.poll_interval);
            self.drain_requests();
            match next {
                Ok(event) => self.process(event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("[ControlLoop] inbound closed");
                    break;
                }
            }
        }
        info!("[ControlLoop] stopped");
    }

    /// Processes everything currently pending without waiting. Returns the number of events handled.
    pub fn poll(&mut self) -> usize {
        self.drain_requests();
        let mut handled = 0;
        while let Ok(event) = self.inbound.try_recv() {
            self.drain_requests();
            self.process(event);
            handled += 1;
        }
        handled
    }

    fn drain_requests(&mut self) {
        while let Ok(req) = self.requests.try_recv() {
            match req {
                ControlRequest::Configure(config) => {
                    debug!("[ControlLoop] config {:?}", config);
                    self.config = config;
                }
                ControlRequest::ApplyManual => {
                    let decision = self.controller.apply_manual(&self.config);
                    self.emit(decision);
                }
            }
        }
    }

    fn process(&mut self, event: Event) {
        let decision = self.controller.handle_event(&event, &self.config);
        self.forward(event);
        if let Some(decision) = decision {
            self.emit(decision);
        }
    }

    fn emit(&mut self, decision: Decision) {
        if let Some(command) = decision.command {
            if let Some(stale) = self.commands.publish(command) {
                debug!("[ControlLoop] coalesced undelivered {}", stale);
                metrics::record(&self.metrics, Counter::CommandCoalesced);
            }
            with_metrics(&self.metrics, |m| {
                m.record(Counter::CommandIssued);
                push_capped(&mut m.brightness_history, command.brightness_percent());
            });
        }
        self.forward(Event::Status(decision.status));
    }

    fn forward(&self, event: Event) {
        if self.outbound.push(event).lost_event() {
            metrics::record(&self.metrics, Counter::PresentationDropped);
        }
    }
}
