// Hub control loops
//
// - drive: the swerve command/ack/telemetry protocol
// - peer: the plain per-motor protocol of drive-only and steer-only hubs
// - teleop: hub-local steering modes driven straight from a controller

mod drive;
mod peer;
mod teleop;

pub use drive::{DriveLoop, LoopState};
pub use peer::{PeerLoop, PeerRole};
pub use teleop::TeleopLoop;

use crate::config::ConfigError;
use crate::controller::ControllerError;
use crate::messages::ParseError;
use crate::motor::driver::{ActuatorError, SimulatedMotor};
use crate::motor::module::SwerveModule;
use crate::transport::TransportError;

/// Everything that can end a control loop
#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("{quantity} out of range: {value}")]
    Range { quantity: &'static str, value: f64 },

    #[error("{0}")]
    Transport(#[from] TransportError),

    #[error("{0}")]
    Actuator(#[from] ActuatorError),

    #[error("{0}")]
    Controller(#[from] ControllerError),

    #[error("{0}")]
    Config(#[from] ConfigError),
}

impl DriveError {
    /// Short tag used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            DriveError::Parse(_) => "parse",
            DriveError::Range { .. } => "range",
            DriveError::Transport(_) => "transport",
            DriveError::Actuator(_) => "actuator",
            DriveError::Controller(_) => "controller",
            DriveError::Config(_) => "config",
        }
    }
}

/// Whether a loop keeps going after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Simulated modules for bench runs: `count` drive/turning motor pairs
pub fn simulated_modules(count: usize, slewing: bool) -> Result<Vec<SwerveModule>, ActuatorError> {
    (0..count)
        .map(|i| {
            let (drive, turning) = if slewing {
                (
                    SimulatedMotor::slewing(format!("drive{}", i)),
                    SimulatedMotor::slewing(format!("turning{}", i)),
                )
            } else {
                (
                    SimulatedMotor::new(format!("drive{}", i)),
                    SimulatedMotor::new(format!("turning{}", i)),
                )
            };
            SwerveModule::new(Box::new(drive), Box::new(turning))
        })
        .collect()
}
