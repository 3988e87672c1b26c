//! command_channel.rs
//! Control loop → session conduit for actuator commands.
//!
//! Single slot, coalescing: publishing while a command is still undelivered
//! overwrites it, since only the most recent brightness target matters.
//! The worker drains the slot between transport operations, so at most one
//! write is ever in flight.

use std::{fmt, sync::Arc, time::SystemTime};

use parking_lot::Mutex;

pub const MAX_BRIGHTNESS: u8 = 100;

/// Brightness request for the light actuator. Always within 0..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorCommand {
    brightness_percent: u8,
    issued_at: SystemTime,
}

impl ActuatorCommand {
    /// Builds a command, clamping `percent` into 0..=100.
    pub fn new(percent: i32) -> Self {
        Self {
            brightness_percent: percent.clamp(0, MAX_BRIGHTNESS as i32) as u8,
            issued_at: SystemTime::now(),
        }
    }

    #[inline]
    pub fn brightness_percent(&self) -> u8 {
        self.brightness_percent
    }

    #[inline]
    pub fn issued_at(&self) -> SystemTime {
        self.issued_at
    }
}

impl fmt::Display for ActuatorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "brightness -> {}%", self.brightness_percent)
    }
}

/// Creates the paired ends of a command channel.
pub fn command_channel() -> (CommandSender, CommandReceiver) {
    let slot = Arc::new(Mutex::new(None));
    (
        CommandSender { slot: slot.clone() },
        CommandReceiver { slot },
    )
}

/// Producer end, owned by the control loop.
#[derive(Clone)]
pub struct CommandSender {
    slot: Arc<Mutex<Option<ActuatorCommand>>>,
}

impl CommandSender {
    /// Stores `command`, returning the undelivered command it replaced, if any.
    pub fn publish(&self, command: ActuatorCommand) -> Option<ActuatorCommand> {
        self.slot.lock().replace(command)
    }
}

/// Consumer end, drained by the ingestion worker on behalf of the session.
/// Cloned only so a restarted worker can pick the slot up again.
#[derive(Clone)]
pub struct CommandReceiver {
    slot: Arc<Mutex<Option<ActuatorCommand>>>,
}

impl CommandReceiver {
    /// Takes the pending command (non-blocking).
    pub fn take(&self) -> Option<ActuatorCommand> {
        self.slot.lock().take()
    }

    pub fn is_pending(&self) -> bool {
        self.slot.lock().is_some()
    }
}
