// Timing, transport defaults, drivetrain layout and tuning constants
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::motor::kinematics::{
    ATTAINABLE_MAX_SPEED, KinematicsError, ModulePosition, SwerveDriveKinematics,
};
use crate::motor::vector::RotationSense;

// Teleop loop period (hub-local steering modes)
pub const TELEOP_TICK: Duration = Duration::from_millis(25);

// How often steering motors are polled while waiting for them to settle
pub const SETTLE_POLL: Duration = Duration::from_millis(10);

// Rated motor speed in deg/s, the 100% reference for every percentage command
pub const MOTOR_MAX_SPEED: f64 = 390.0 / 360.0 * 1000.0;

// Zenoh key expressions: <prefix>/<hub>/cmd and <prefix>/<hub>/ack
pub const ZENOH_KEY_PREFIX: &str = "swerve";

// Serial link to the upstream controller
pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUDRATE: u32 = 115_200;
pub const SERIAL_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Kinematics(#[from] KinematicsError),

    #[error("Unknown hub '{0}'")]
    UnknownHub(String),

    #[error("Hub '{hub}' references module {index}, but only {count} modules are configured")]
    ModuleOutOfRange { hub: String, index: usize, count: usize },

    #[error("Registry lists {expected} modules but {got} were wired")]
    RegistryMismatch { expected: usize, got: usize },

    #[error("Invalid tuning: {0}")]
    InvalidTuning(String),
}

/// Gains of one setpoint filter axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub dt: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 0.2,
            ki: 0.01,
            kd: 0.01,
            dt: 1.0,
        }
    }
}

/// Drive motor acceleration applied when a steering mode becomes active (deg/s²)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccelerationProfile {
    pub ackermann: f64,
    pub tank: f64,
    pub crab: f64,
    pub swerve: f64,
}

impl Default for AccelerationProfile {
    fn default() -> Self {
        Self {
            ackermann: 1500.0,
            tank: 1000.0,
            crab: 4000.0,
            swerve: 3000.0,
        }
    }
}

/// Scaling constants of the drive stack
///
/// These have changed between drivetrain revisions, so they are data rather
/// than code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// Ceiling for normalized module speeds (percent)
    pub attainable_max: f64,
    /// Module speeds below this stop the wheel without re-steering (percent)
    pub deadzone: f64,
    /// Odd power applied to the cosine of the largest steering deviation
    pub attenuation_exponent: i32,
    /// Steering motor speed (percent)
    pub turning_speed: f64,
    pub ackermann_turn_factor: f64,
    pub tank_turn_factor: f64,
    pub swerve_turn_factor: f64,
    pub acceleration: AccelerationProfile,
    /// Per-axis smoothing of drive commands, disabled when absent
    pub setpoint_filter: Option<PidGains>,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            attainable_max: ATTAINABLE_MAX_SPEED,
            deadzone: 0.5,
            attenuation_exponent: 3,
            turning_speed: 100.0,
            ackermann_turn_factor: 0.2,
            tank_turn_factor: 1.0,
            swerve_turn_factor: 1.0,
            acceleration: AccelerationProfile::default(),
            setpoint_filter: None,
        }
    }
}

impl Tuning {
    /// Reject constants that would let the drive stack exceed the commanded speed
    pub fn validate(&self) -> Result<(), ConfigError> {
        let exponent = self.attenuation_exponent;
        if exponent < 1 || exponent % 2 == 0 {
            return Err(ConfigError::InvalidTuning(format!(
                "attenuation_exponent must be a positive odd integer, got {}",
                exponent
            )));
        }
        if !(self.attainable_max > 0.0 && self.attainable_max <= 100.0) {
            return Err(ConfigError::InvalidTuning(format!(
                "attainable_max must be in (0, 100], got {}",
                self.attainable_max
            )));
        }
        Ok(())
    }
}

/// Global module indices a hub is responsible for, in the order its motors are wired
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRegistry {
    indices: Vec<usize>,
}

impl ModuleRegistry {
    pub fn new(indices: Vec<usize>) -> Self {
        Self { indices }
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Drivetrain layout: module positions, hub ownership and tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DrivetrainConfig {
    pub modules: Vec<ModulePosition>,
    pub hubs: BTreeMap<String, Vec<usize>>,
    pub rotation_sense: RotationSense,
    pub tuning: Tuning,
}

impl Default for DrivetrainConfig {
    /// Four modules (left front, right front, left rear, right rear) on two hubs
    fn default() -> Self {
        Self {
            modules: vec![
                ModulePosition::new(-1.0, 1.0),
                ModulePosition::new(1.0, 1.0),
                ModulePosition::new(-1.0, -1.0),
                ModulePosition::new(1.0, -1.0),
            ],
            hubs: BTreeMap::from([
                ("front".to_string(), vec![0, 1]),
                ("rear".to_string(), vec![2, 3]),
            ]),
            rotation_sense: RotationSense::default(),
            tuning: Tuning::default(),
        }
    }
}

impl DrivetrainConfig {
    /// Two modules (left, right) driven by a single hub
    pub fn two_module() -> Self {
        Self {
            modules: vec![ModulePosition::new(-1.0, 0.0), ModulePosition::new(1.0, 0.0)],
            hubs: BTreeMap::from([("main".to_string(), vec![0, 1])]),
            ..Self::default()
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.kinematics()?;
        self.tuning.validate()?;
        for (hub, indices) in &self.hubs {
            if let Some(&index) = indices.iter().find(|&&i| i >= self.modules.len()) {
                return Err(ConfigError::ModuleOutOfRange {
                    hub: hub.clone(),
                    index,
                    count: self.modules.len(),
                });
            }
        }
        Ok(())
    }

    pub fn kinematics(&self) -> Result<SwerveDriveKinematics, ConfigError> {
        Ok(SwerveDriveKinematics::with_sense(
            self.modules.clone(),
            self.rotation_sense,
        )?)
    }

    pub fn registry(&self, hub: &str) -> Result<ModuleRegistry, ConfigError> {
        self.hubs
            .get(hub)
            .map(|indices| ModuleRegistry::new(indices.clone()))
            .ok_or_else(|| ConfigError::UnknownHub(hub.to_string()))
    }
}
