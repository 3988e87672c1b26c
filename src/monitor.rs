//! monitor.rs
//! Collaborator-facing facade over the ingestion worker and the control loop.
//!
//! ```text
//!  transport ─▶ [ingest-worker] ─▶ events ─▶ [control-loop] ─▶ presentation stream
//!                    ▲                            │
//!                    └──── command slot ◀─────────┘
//! ```
//!
//! The control loop lives as long as the `Monitor`. The worker can be started
//! and stopped repeatedly; the transport is handed back on every stop.
//! `ControlConfig` is owned here and sent to the loop as snapshots.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
};

use crossbeam::channel::{Receiver, Sender, bounded, unbounded};
use log::{error, info, warn};

use crate::config::{AppConfig, WorkerSettings};
use crate::control::{
    command_channel::{CommandReceiver, command_channel},
    control_loop::{ControlLoop, ControlRequest},
    controller::{ControlConfig, ControlMode},
};
use crate::error::MonitorError;
use crate::ingest::{
    event_channel::{EventReceiver, EventSender, event_channel},
    session::Session,
    transport::Transport,
    worker::{IngestionWorker, SessionRequest},
};
use crate::utils::metrics::{Metrics, SharedMetrics, with_metrics};

struct RunningWorker<T> {
    running: Arc<AtomicBool>,
    handle: JoinHandle<T>,
}

pub struct Monitor<T: Transport + 'static> {
    settings: WorkerSettings,
    config: ControlConfig,
    transport: Option<T>,
    worker: Option<RunningWorker<T>>,
    session_tx: Sender<SessionRequest>,
    session_rx: Receiver<SessionRequest>,
    command_rx: CommandReceiver,
    events_tx: EventSender,
    control_tx: Sender<ControlRequest>,
    control_running: Arc<AtomicBool>,
    control_handle: Option<JoinHandle<()>>,
    presentation: EventReceiver,
    metrics: SharedMetrics,
}

impl<T: Transport + 'static> Monitor<T> {
    /// Wires the channels and starts the control loop. The worker stays stopped.
    pub fn new(transport: T, app: &AppConfig) -> Result<Self, MonitorError> {
        let settings = app.worker.clone();
        let config = app.control.control_config();
        let metrics = SharedMetrics::default();

        let (events_tx, events_rx) = event_channel(settings.event_capacity);
        let (presentation_tx, presentation) = event_channel(settings.event_capacity);
        let (command_tx, command_rx) = command_channel();
        let (session_tx, session_rx) = unbounded();
        let (control_tx, control_rx) = bounded(app.control.request_capacity);

        let control_running = Arc::new(AtomicBool::new(true));
        let control = ControlLoop::new(
            config,
            events_rx,
            control_rx,
            command_tx,
            presentation_tx,
            metrics.clone(),
            control_running.clone(),
            settings.poll_interval(),
        );
        let control_handle = control
            .spawn()
            .map_err(|source| MonitorError::Spawn { name: "control-loop", source })?;

        Ok(Self {
            settings,
            config,
            transport: Some(transport),
            worker: None,
            session_tx,
            session_rx,
            command_rx,
            events_tx,
            control_tx,
            control_running,
            control_handle: Some(control_handle),
            presentation,
            metrics,
        })
    }

    pub fn is_worker_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Starts the ingestion worker. A no-op if it is already running.
    pub fn start_worker(&mut self) -> Result<(), MonitorError> {
        if self.worker.is_some() {
            return Ok(());
        }
        let transport = self.transport.take().ok_or(MonitorError::TransportLost)?;

        let running = Arc::new(AtomicBool::new(true));
        let worker = IngestionWorker::new(
            Session::new(transport, self.settings.max_scan_results, self.settings.scan_timeout()),
            self.session_rx.clone(),
            self.command_rx.clone(),
            self.events_tx.clone(),
            running.clone(),
            self.settings.poll_interval(),
            self.metrics.clone(),
        );
        let handle = worker
            .spawn()
            .map_err(|source| MonitorError::Spawn { name: "ingest-worker", source })?;

        info!("[Monitor] worker started");
        self.worker = Some(RunningWorker { running, handle });
        Ok(())
    }

    /// Stops the worker, closing any open session. A no-op if it is not running.
    pub fn stop_worker(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        worker.running.store(false, Ordering::Release);
        match worker.handle.join() {
            Ok(transport) => self.transport = Some(transport),
            Err(_) => error!("[Monitor] worker thread panicked; transport lost"),
        }

        // Requests nobody served must not replay on the next start.
        let stale = self.session_rx.try_iter().count();
        if stale > 0 {
            warn!("[Monitor] discarded {} pending session request(s)", stale);
        }
        self.command_rx.take();
        info!("[Monitor] worker stopped");
    }

    fn request(&self, req: SessionRequest) -> Result<(), MonitorError> {
        if self.worker.is_none() {
            return Err(MonitorError::WorkerStopped);
        }
        self.session_tx.send(req).map_err(|_| MonitorError::WorkerStopped)
    }

    pub fn scan(&self) -> Result<(), MonitorError> {
        self.request(SessionRequest::Scan)
    }

    pub fn connect(&self, address: &str) -> Result<(), MonitorError> {
        self.request(SessionRequest::Connect(address.to_string()))
    }

    pub fn disconnect(&self) -> Result<(), MonitorError> {
        self.request(SessionRequest::Disconnect)
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    fn send_control(&self, req: ControlRequest) -> Result<(), MonitorError> {
        self.control_tx.send(req).map_err(|_| MonitorError::ControlLoopStopped)
    }

    fn push_config(&self) -> Result<(), MonitorError> {
        self.send_control(ControlRequest::Configure(self.config))
    }

    pub fn set_mode(&mut self, mode: ControlMode) -> Result<(), MonitorError> {
        self.config.mode = mode;
        self.push_config()
    }

    pub fn set_lux_threshold(&mut self, lux: i32) -> Result<(), MonitorError> {
        self.config.lux_threshold = lux;
        self.push_config()
    }

    /// Clamped to 0..=100.
    pub fn set_manual_brightness(&mut self, percent: i32) -> Result<(), MonitorError> {
        self.config.manual_brightness = percent.clamp(0, 100);
        self.push_config()
    }

    /// Issues the manual brightness once. Refusals come back as status events.
    pub fn apply_manual_brightness(&self) -> Result<(), MonitorError> {
        self.send_control(ControlRequest::ApplyManual)
    }

    /// Outbound presentation stream.
    pub fn events(&self) -> EventReceiver {
        self.presentation.clone()
    }

    pub fn metrics(&self) -> Metrics {
        with_metrics(&self.metrics, |m| m.clone())
    }

    /// Stops the worker and the control loop.
    pub fn shutdown(&mut self) {
        self.stop_worker();
        if let Some(handle) = self.control_handle.take() {
            self.control_running.store(false, Ordering::Release);
            if handle.join().is_err() {
                error!("[Monitor] control loop panicked");
            }
        }
    }
}

impl<T: Transport + 'static> Drop for Monitor<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{event_channel::Event, session::ConnectionState, transport::SimulatedTransport};
    use std::time::{Duration, Instant};

    fn monitor() -> Monitor<SimulatedTransport> {
        let mut app = AppConfig::default();
        app.worker.poll_interval_ms = 5;
        app.simulation.sample_period_ms = 5;
        Monitor::new(app.simulation.transport(), &app).unwrap()
    }

    fn wait_for(rx: &EventReceiver, pred: impl Fn(&Event) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if let Ok(e) = rx.recv_timeout(Duration::from_millis(20)) {
                if pred(&e) {
                    return true;
                }
            }
        }
        false
    }

    #[test]
    fn requests_need_a_running_worker() {
        let m = monitor();
        assert!(matches!(m.scan(), Err(MonitorError::WorkerStopped)));
        assert!(matches!(m.connect("AA:BB:CC:11:22:33"), Err(MonitorError::WorkerStopped)));
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let mut m = monitor();
        m.start_worker().unwrap();
        m.start_worker().unwrap();
        assert!(m.is_worker_running());
        m.stop_worker();
        m.stop_worker();
        assert!(!m.is_worker_running());

        // Transport came back, so the worker restarts.
        m.start_worker().unwrap();
        assert!(m.is_worker_running());
    }

    #[test]
    fn connect_streams_to_presentation() {
        let mut m = monitor();
        let events = m.events();
        m.start_worker().unwrap();
        m.connect("AA:BB:CC:11:22:33").unwrap();

        assert!(wait_for(&events, |e| matches!(e, Event::Lifecycle(s) if s.is_streaming())));
        assert!(wait_for(&events, |e| matches!(e, Event::SensorUpdate(_))));

        m.stop_worker();
        assert!(wait_for(&events, |e| *e == Event::Lifecycle(ConnectionState::Idle)));
        assert!(m.metrics().readings > 0);
    }

    #[test]
    fn setters_update_owned_config() {
        let mut m = monitor();
        m.set_mode(ControlMode::Manual).unwrap();
        m.set_lux_threshold(90).unwrap();
        m.set_manual_brightness(250).unwrap();
        assert_eq!(
            *m.config(),
            ControlConfig {
                mode: ControlMode::Manual,
                lux_threshold: 90,
                manual_brightness: 100,
            }
        );
    }
}
