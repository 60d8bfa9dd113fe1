//! Runtime configuration loaded from a TOML file
//!
//! Every section has defaults matching the arm's firmware and wiring, so a
//! missing file or a partial file both work. The file lives next to the other
//! per-user configuration (`~/.config/armcontroller/config.toml` on Linux) and
//! can be redirected with the `ARMCONTROLLER_CONFIG` environment variable.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::axis::Axis;
use crate::controller::StickChannel;
use crate::pid::{PidGains, DEFAULT_OUTPUT_LIMITS};

const CONFIG_DIR: &str = "armcontroller";
const CONFIG_FILE: &str = "config.toml";
const CONFIG_ENV: &str = "ARMCONTROLLER_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("No configuration directory available on this platform")]
    NoConfigDir,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct ArmConfig {
    pub serial: SerialConfig,
    pub control: ControlConfig,
    pub input: InputConfig,
    pub hold: HoldConfig,
    pub pid: PidConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path or COM port name; empty picks the first port the OS reports
    pub port: String,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    /// Wait after opening, the controller board resets when the port opens
    pub settle_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 9600,
            read_timeout_ms: 1000,
            settle_ms: 2000,
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ControlConfig {
    /// Control tick period, 20 ms gives the 50 Hz loop
    pub tick_interval_ms: u64,
    /// Upper bound for joining each flow on disconnect
    pub join_timeout_ms: u64,
    pub notification_capacity: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 20,
            join_timeout_ms: 1000,
            notification_capacity: 1000,
        }
    }
}

impl ControlConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct InputConfig {
    pub deadzones: StickDeadzones,
    pub debounce: DebounceWindows,
}

/// Deadzone per continuous stick channel, as a fraction of full deflection
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
#[serde(default)]
pub struct StickDeadzones {
    pub left_x: f32,
    pub left_y: f32,
    pub right_x: f32,
    pub right_y: f32,
}

impl Default for StickDeadzones {
    fn default() -> Self {
        Self {
            left_x: 0.15,
            left_y: 0.15,
            right_x: 0.15,
            right_y: 0.15,
        }
    }
}

impl StickDeadzones {
    pub fn get(&self, channel: StickChannel) -> f32 {
        match channel {
            StickChannel::LeftX => self.left_x,
            StickChannel::LeftY => self.left_y,
            StickChannel::RightX => self.right_x,
            StickChannel::RightY => self.right_y,
        }
    }
}

/// Minimum interval between accepted presses, per control class
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
#[serde(default)]
pub struct DebounceWindows {
    pub face_button_ms: u64,
    pub stick_click_ms: u64,
    pub dpad_ms: u64,
    pub global_reset_ms: u64,
}

impl Default for DebounceWindows {
    fn default() -> Self {
        Self {
            face_button_ms: 300,
            stick_click_ms: 300,
            dpad_ms: 500,
            global_reset_ms: 500,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct HoldConfig {
    /// Encoder counts around the target treated as "arrived"
    pub deadband: i32,
    /// Axes whose linkage runs reversed: positive output drives backward
    pub inverted: Vec<Axis>,
}

impl Default for HoldConfig {
    fn default() -> Self {
        Self {
            deadband: 5,
            inverted: vec![Axis::S2, Axis::S3],
        }
    }
}

impl HoldConfig {
    pub fn is_inverted(&self, axis: Axis) -> bool {
        self.inverted.contains(&axis)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PidConfig {
    pub output_limits: [f64; 2],
    #[serde(rename = "M1")]
    pub m1: PidGains,
    #[serde(rename = "M2")]
    pub m2: PidGains,
    #[serde(rename = "M3")]
    pub m3: PidGains,
    #[serde(rename = "M4")]
    pub m4: PidGains,
    #[serde(rename = "S2")]
    pub s2: PidGains,
    #[serde(rename = "S3")]
    pub s3: PidGains,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            output_limits: [DEFAULT_OUTPUT_LIMITS.0, DEFAULT_OUTPUT_LIMITS.1],
            m1: PidGains::new(0.60, 0.005, 0.0001),
            m2: PidGains::new(0.8, 0.005, 0.1),
            m3: PidGains::new(0.5, 0.005, 0.1),
            m4: PidGains::new(0.8, 0.005, 0.1),
            s2: PidGains::new(0.80, 0.005, 0.1),
            s3: PidGains::new(0.95, 0.005, 0.01),
        }
    }
}

impl PidConfig {
    /// Gains of a holdable axis, `None` for S1
    pub fn gains(&self, axis: Axis) -> Option<PidGains> {
        match axis {
            Axis::M1 => Some(self.m1),
            Axis::M2 => Some(self.m2),
            Axis::M3 => Some(self.m3),
            Axis::M4 => Some(self.m4),
            Axis::S1 => None,
            Axis::S2 => Some(self.s2),
            Axis::S3 => Some(self.s3),
        }
    }

    pub fn limits(&self) -> (f64, f64) {
        (self.output_limits[0], self.output_limits[1])
    }
}

impl ArmConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ArmConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud_rate must be positive".into()));
        }
        if self.control.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "tick_interval_ms must be positive".into(),
            ));
        }
        if self.control.notification_capacity == 0 {
            return Err(ConfigError::Invalid(
                "notification_capacity must be positive".into(),
            ));
        }
        if self.hold.deadband < 0 {
            return Err(ConfigError::Invalid("hold deadband must not be negative".into()));
        }

        let dz = &self.input.deadzones;
        for (name, value) in [
            ("left_x", dz.left_x),
            ("left_y", dz.left_y),
            ("right_x", dz.right_x),
            ("right_y", dz.right_y),
        ] {
            if !(0.0..1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "deadzone {} = {} is outside [0, 1)",
                    name, value
                )));
            }
        }

        let (min, max) = self.pid.limits();
        if min.is_nan() || max.is_nan() || min >= max {
            return Err(ConfigError::Invalid(format!(
                "pid output_limits [{}, {}] are not ordered",
                min, max
            )));
        }

        if let Some(axis) = self.hold.inverted.iter().find(|a| !a.is_holdable()) {
            return Err(ConfigError::Invalid(format!(
                "{} has no hold mode and cannot be inverted",
                axis
            )));
        }

        Ok(())
    }

    /// Config path from `ARMCONTROLLER_CONFIG`, else the per-user config dir
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }
        let mut path = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        Ok(path)
    }

    /// Loads the config at `path`, writing the defaults there first if missing
    pub async fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        if !exists {
            info!("No config at {}, writing defaults", path.display());
            let config = ArmConfig::default();
            config.save(path).await?;
            return Ok(config);
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        debug!("Read {} bytes of config from {}", content.len(), path.display());
        Self::from_toml_str(&content)
    }

    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ConfigError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let content = self.to_toml_string()?;
        tokio::fs::write(path, content)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
    }
}
