//! controller.rs
//! Light control law with change suppression.
//!
//! Auto mode: `lux < threshold` → bright target, otherwise dim target.
//! A command is issued only while the session is live and the target differs
//! from the last committed one. Manual mode issues only on an explicit apply.
//!
//! The controller is plain single-threaded state; `ControlLoop` owns it.

use std::{collections::HashMap, fmt};

use log::{debug, info, warn};
use serde::Deserialize;

use crate::control::command_channel::ActuatorCommand;
use crate::ingest::{
    codec::{SensorChannel, SensorReading},
    event_channel::{Event, Severity, StatusDetail, StatusReport},
    session::ConnectionState,
};

/// Brightness issued when it is darker than the threshold.
pub const BRIGHT_TARGET: u8 = 80;
/// Brightness issued when it is at or above the threshold.
pub const DIM_TARGET: u8 = 20;

pub const DEFAULT_LUX_THRESHOLD: i32 = 150;
pub const DEFAULT_MANUAL_BRIGHTNESS: i32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    Auto,
    Manual,
}

impl ControlMode {
    pub fn toggled(self) -> Self {
        match self {
            ControlMode::Auto => ControlMode::Manual,
            ControlMode::Manual => ControlMode::Auto,
        }
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ControlMode::Auto => "AUTO",
            ControlMode::Manual => "MANUAL",
        })
    }
}

/// Operator-owned control settings. The loop only ever sees snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlConfig {
    pub mode: ControlMode,
    pub lux_threshold: i32,
    pub manual_brightness: i32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            mode: ControlMode::Auto,
            lux_threshold: DEFAULT_LUX_THRESHOLD,
            manual_brightness: DEFAULT_MANUAL_BRIGHTNESS,
        }
    }
}

/// Auto-mode mapping. NaN compares false and therefore dims.
#[inline]
pub fn target_for(lux: f64, threshold: i32) -> u8 {
    if lux < f64::from(threshold) {
        BRIGHT_TARGET
    } else {
        DIM_TARGET
    }
}

/// What the controller wants done after an event or an apply request.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub command: Option<ActuatorCommand>,
    pub status: StatusReport,
}

impl Decision {
    fn issue(command: ActuatorCommand, text: String) -> Self {
        Self {
            command: Some(command),
            status: StatusReport::new(Severity::Ok, text, StatusDetail::CommandIssued(command)),
        }
    }

    fn refuse(text: &str) -> Self {
        Self {
            command: None,
            status: StatusReport::note(Severity::Warn, text),
        }
    }
}

pub struct Controller {
    latest: HashMap<SensorChannel, SensorReading>,
    state: ConnectionState,
    last_committed: Option<u8>,
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl Controller {
    pub fn new() -> Self {
        Self {
            latest: HashMap::new(),
            state: ConnectionState::Idle,
            last_committed: None,
        }
    }

    pub fn latest(&self, channel: SensorChannel) -> Option<&SensorReading> {
        self.latest.get(&channel)
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn last_committed(&self) -> Option<u8> {
        self.last_committed
    }

    /// Feeds one event through the control law.
    pub fn handle_event(&mut self, event: &Event, config: &ControlConfig) -> Option<Decision> {
        match event {
            Event::Lifecycle(state) => {
                self.observe_state(state);
                None
            }
            Event::SensorUpdate(reading) => self.observe_reading(reading, config),
            Event::Status(_) => None,
        }
    }

    /// One-shot manual command. Bypasses the lux comparison and becomes the committed target.
    pub fn apply_manual(&mut self, config: &ControlConfig) -> Decision {
        if config.mode != ControlMode::Manual {
            warn!("[Controller] manual apply ignored in {} mode", config.mode);
            return Decision::refuse("Switch to MANUAL mode to apply brightness");
        }
        if !self.state.is_live() {
            warn!("[Controller] manual apply ignored while {}", self.state.name());
            return Decision::refuse("Not connected; manual brightness not applied");
        }

        let command = ActuatorCommand::new(config.manual_brightness);
        let percent = command.brightness_percent();
        self.last_committed = Some(percent);
        info!("[Controller] MANUAL -> {}%", percent);
        Decision::issue(command, format!("MANUAL: brightness {}%", percent))
    }

    fn observe_state(&mut self, state: &ConnectionState) {
        // A failed or brand new session has no known actuator value.
        if matches!(state, ConnectionState::Failed(_) | ConnectionState::Connecting(_)) {
            self.last_committed = None;
        }
        self.state = state.clone();
    }

    fn observe_reading(&mut self, reading: &SensorReading, config: &ControlConfig) -> Option<Decision> {
        self.latest.insert(reading.channel, *reading);

        if reading.channel != SensorChannel::Light || config.mode != ControlMode::Auto {
            return None;
        }
        if !self.state.is_live() {
            debug!("[Controller] lux {:.1} ignored while {}", reading.value, self.state.name());
            return None;
        }

        let target = target_for(reading.value, config.lux_threshold);
        if self.last_committed == Some(target) {
            return None;
        }

        self.last_committed = Some(target);
        info!("[Controller] AUTO lux={:.1} -> {}%", reading.value, target);
        Some(Decision::issue(
            ActuatorCommand::new(i32::from(target)),
            format!("AUTO: lux={:.1} -> brightness {}%", reading.value, target),
        ))
    }
}
