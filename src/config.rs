//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! Schema for `config/agrisense.toml`. Every section and field is optional and
//! falls back to the defaults below.
//!
//! - WorkerSettings: polling cadence, event queue size, scan limits.
//! - ControlSettings: initial control mode, threshold, manual brightness.
//! - SimulationSettings: sample period and advertised peers of the simulated node.
//! - LoggingSettings: default log filter (`RUST_LOG` wins when set).
//!
//! ==============================================================================

use std::{path::Path, time::Duration};

use log::{info, warn};
use serde::Deserialize;

use crate::control::controller::{
    ControlConfig, ControlMode, DEFAULT_LUX_THRESHOLD, DEFAULT_MANUAL_BRIGHTNESS,
};
use crate::error::ConfigError;
use crate::ingest::transport::{PeerDescriptor, SimulatedTransport};

pub const DEFAULT_CONFIG_PATH: &str = "config/agrisense.toml";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub worker: WorkerSettings,
    pub control: ControlSettings,
    pub simulation: SimulationSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WorkerSettings {
    pub poll_interval_ms: u64,
    /// Bound on each event queue. Only lifecycle events may exceed it.
    pub event_capacity: usize,
    pub scan_timeout_ms: u64,
    pub max_scan_results: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            event_capacity: 256,
            scan_timeout_ms: 3_000,
            max_scan_results: 32,
        }
    }
}

impl WorkerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ControlSettings {
    pub mode: ControlMode,
    pub lux_threshold: i32,
    pub manual_brightness: i32,
    pub request_capacity: usize,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            mode: ControlMode::Auto,
            lux_threshold: DEFAULT_LUX_THRESHOLD,
            manual_brightness: DEFAULT_MANUAL_BRIGHTNESS,
            request_capacity: 16,
        }
    }
}

impl ControlSettings {
    pub fn control_config(&self) -> ControlConfig {
        ControlConfig {
            mode: self.mode,
            lux_threshold: self.lux_threshold,
            manual_brightness: self.manual_brightness,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeviceEntry {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub rssi: Option<i16>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimulationSettings {
    pub sample_period_ms: u64,
    pub devices: Vec<DeviceEntry>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            sample_period_ms: 1_000,
            devices: SimulatedTransport::default_devices()
                .into_iter()
                .map(|p| DeviceEntry {
                    name: p.name,
                    address: p.address,
                    rssi: p.signal_strength,
                })
                .collect(),
        }
    }
}

impl SimulationSettings {
    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_period_ms)
    }

    pub fn peers(&self) -> Vec<PeerDescriptor> {
        self.devices
            .iter()
            .map(|d| PeerDescriptor::new(d.name.clone(), d.address.clone(), d.rssi))
            .collect()
    }

    pub fn transport(&self) -> SimulatedTransport {
        SimulatedTransport::new(self.peers(), self.sample_period())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Loads and validates a config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` if it exists, otherwise the defaults. A file that exists but
    /// does not parse or validate is still an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            let config = Self::load(path)?;
            info!("[Config] loaded from {}", path.display());
            Ok(config)
        } else {
            warn!("[Config] {} not found - using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("worker.poll_interval_ms must be > 0".into()));
        }
        if self.worker.event_capacity == 0 {
            return Err(ConfigError::Invalid("worker.event_capacity must be > 0".into()));
        }
        if self.worker.max_scan_results == 0 {
            return Err(ConfigError::Invalid("worker.max_scan_results must be > 0".into()));
        }
        if self.control.request_capacity == 0 {
            return Err(ConfigError::Invalid("control.request_capacity must be > 0".into()));
        }
        if !(0..=100).contains(&self.control.manual_brightness) {
            return Err(ConfigError::Invalid(format!(
                "control.manual_brightness {} is outside 0..=100",
                self.control.manual_brightness
            )));
        }
        if self.simulation.sample_period_ms == 0 {
            return Err(ConfigError::Invalid("simulation.sample_period_ms must be > 0".into()));
        }
        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("┌─────────────────────────────────────────┐");
        println!("│          AGRISENSE CONFIGURATION        │");
        println!("├─────────────────────────────────────────┤");
        println!("│ Poll interval:     {:>8} ms          │", self.worker.poll_interval_ms);
        println!("│ Event capacity:    {:>8}             │", self.worker.event_capacity);
        println!("│ Mode:              {:>8}             │", self.control.mode.to_string());
        println!("│ Lux threshold:     {:>8}             │", self.control.lux_threshold);
        println!("│ Manual brightness: {:>8} %           │", self.control.manual_brightness);
        println!("│ Sample period:     {:>8} ms          │", self.simulation.sample_period_ms);
        println!("│ Log level:         {:>8}             │", self.logging.level);
        println!("└─────────────────────────────────────────┘");
    }
}
