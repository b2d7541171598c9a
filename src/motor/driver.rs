// Actuator and sensor seams for a swerve hub
//
// The hub firmware owns the real motor and IMU drivers. This module defines the
// interface the drive stack talks to, plus simulated devices used by the bench
// runtime and the tests.

use tokio::time::Instant;
use tracing::debug;

use crate::config::MOTOR_MAX_SPEED;

/// Default acceleration limit for steering motors (deg/s²)
pub const TURNING_ACCELERATION: f64 = 4000.0;

/// Default acceleration limit for drive motors (deg/s²)
pub const DRIVE_ACCELERATION: f64 = 1000.0;

/// Errors reported by motors and the IMU
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActuatorError {
    #[error("Motor {name} fault: {reason}")]
    Fault { name: String, reason: String },

    #[error("IMU unavailable: {0}")]
    Imu(String),
}

pub type Result<T> = std::result::Result<T, ActuatorError>;

/// A single motor as exposed by the hub
///
/// Speeds are in deg/s, angles in degrees. Angles are cumulative, so a motor
/// that has turned one and a half revolutions reports 540.
pub trait Motor {
    /// Run continuously at `speed`
    fn run(&mut self, speed: f64) -> Result<()>;

    /// Start turning to `target_angle` at `speed` without waiting for arrival
    fn run_target(&mut self, target_angle: f64, speed: f64) -> Result<()>;

    /// Whether the last `run_target` has arrived
    fn done(&mut self) -> Result<bool>;

    fn angle(&mut self) -> Result<f64>;

    fn speed(&mut self) -> Result<f64>;

    /// Stop and coast
    fn stop(&mut self) -> Result<()>;

    /// Stop and actively hold the current angle
    fn hold(&mut self) -> Result<()>;

    fn set_acceleration(&mut self, acceleration: f64) -> Result<()>;

    /// Acceleration limit currently in effect
    fn acceleration(&mut self) -> Result<f64>;
}

/// Orientation sensor of the hub
pub trait Imu {
    /// Heading in degrees, positive counter-clockwise
    fn heading(&mut self) -> Result<f64>;
}

/// Convert a percentage of the rated speed into deg/s
pub fn percentage_to_speed(percentage: f64) -> f64 {
    percentage / 100.0 * MOTOR_MAX_SPEED
}

/// Motor model for bench runs and tests
///
/// In instant mode targets are reached the moment they are commanded. In
/// slewing mode the motor travels toward its target at the commanded speed,
/// measured against the tokio clock.
#[derive(Debug)]
pub struct SimulatedMotor {
    name: String,
    slewing: bool,
    origin: f64,
    target: Option<f64>,
    target_speed: f64,
    run_speed: f64,
    commanded_at: Instant,
    acceleration: f64,
    fault: Option<String>,
    holding: bool,
}

impl SimulatedMotor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slewing: false,
            origin: 0.0,
            target: None,
            target_speed: 0.0,
            run_speed: 0.0,
            commanded_at: Instant::now(),
            acceleration: 0.0,
            fault: None,
            holding: false,
        }
    }

    pub fn slewing(name: impl Into<String>) -> Self {
        Self {
            slewing: true,
            ..Self::new(name)
        }
    }

    /// Start from a given measured angle
    pub fn with_angle(mut self, angle: f64) -> Self {
        self.origin = angle;
        self
    }

    /// Make every following call fail with `reason`
    pub fn inject_fault(&mut self, reason: impl Into<String>) {
        self.fault = Some(reason.into());
    }

    pub fn is_holding(&self) -> bool {
        self.holding
    }

    fn check_fault(&self) -> Result<()> {
        match &self.fault {
            Some(reason) => Err(ActuatorError::Fault {
                name: self.name.clone(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    fn position(&self) -> f64 {
        let elapsed = self.commanded_at.elapsed().as_secs_f64();
        match self.target {
            Some(target) if !self.slewing => target,
            Some(target) => {
                let remaining = target - self.origin;
                let travelled = self.target_speed * elapsed;
                if travelled >= remaining.abs() {
                    target
                } else {
                    self.origin + remaining.signum() * travelled
                }
            }
            None if self.slewing => self.origin + self.run_speed * elapsed,
            None => self.origin,
        }
    }

    fn arrived(&self) -> bool {
        match self.target {
            Some(target) => (self.position() - target).abs() < f64::EPSILON,
            None => true,
        }
    }

    fn freeze(&mut self) {
        self.origin = self.position();
        self.commanded_at = Instant::now();
    }
}

impl Motor for SimulatedMotor {
    fn run(&mut self, speed: f64) -> Result<()> {
        self.check_fault()?;
        self.freeze();
        self.target = None;
        self.run_speed = speed;
        self.holding = false;
        Ok(())
    }

    fn run_target(&mut self, target_angle: f64, speed: f64) -> Result<()> {
        self.check_fault()?;
        debug!("{}: run_target {:.2} at {:.2}", self.name, target_angle, speed);
        self.freeze();
        self.target = Some(target_angle);
        self.target_speed = speed.abs();
        self.holding = false;
        Ok(())
    }

    fn done(&mut self) -> Result<bool> {
        self.check_fault()?;
        Ok(self.arrived())
    }

    fn angle(&mut self) -> Result<f64> {
        self.check_fault()?;
        Ok(self.position())
    }

    fn speed(&mut self) -> Result<f64> {
        self.check_fault()?;
        Ok(match self.target {
            Some(target) if !self.arrived() => (target - self.origin).signum() * self.target_speed,
            Some(_) => 0.0,
            None => self.run_speed,
        })
    }

    fn stop(&mut self) -> Result<()> {
        self.check_fault()?;
        self.freeze();
        self.target = None;
        self.run_speed = 0.0;
        self.holding = false;
        Ok(())
    }

    fn hold(&mut self) -> Result<()> {
        self.stop()?;
        self.holding = true;
        Ok(())
    }

    fn set_acceleration(&mut self, acceleration: f64) -> Result<()> {
        self.check_fault()?;
        self.acceleration = acceleration;
        Ok(())
    }

    fn acceleration(&mut self) -> Result<f64> {
        self.check_fault()?;
        Ok(self.acceleration)
    }
}

/// IMU with a settable heading
#[derive(Debug, Default)]
pub struct SimulatedImu {
    heading: f64,
    fault: Option<String>,
}

impl SimulatedImu {
    pub fn new(heading: f64) -> Self {
        Self {
            heading,
            fault: None,
        }
    }

    pub fn set_heading(&mut self, heading: f64) {
        self.heading = heading;
    }

    pub fn inject_fault(&mut self, reason: impl Into<String>) {
        self.fault = Some(reason.into());
    }
}

impl Imu for SimulatedImu {
    fn heading(&mut self) -> Result<f64> {
        match &self.fault {
            Some(reason) => Err(ActuatorError::Imu(reason.clone())),
            None => Ok(self.heading),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_percentage_to_speed() {
        assert_eq!(percentage_to_speed(0.0), 0.0);
        assert!((percentage_to_speed(100.0) - 390.0 / 360.0 * 1000.0).abs() < 1e-9);
        assert!((percentage_to_speed(-50.0) + MOTOR_MAX_SPEED / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_instant_motor_reaches_target() {
        let mut motor = SimulatedMotor::new("turning").with_angle(30.0);
        motor.run_target(-45.0, 500.0).unwrap();
        assert_eq!(motor.angle().unwrap(), -45.0);
        assert!(motor.done().unwrap());
        assert_eq!(motor.speed().unwrap(), 0.0);
    }

    #[test]
    fn test_fault_propagates() {
        let mut motor = SimulatedMotor::new("drive");
        motor.inject_fault("stalled");
        let err = motor.run(100.0).unwrap_err();
        assert_eq!(
            err,
            ActuatorError::Fault {
                name: "drive".to_string(),
                reason: "stalled".to_string()
            }
        );
    }

    #[test]
    fn test_hold_stops_motor() {
        let mut motor = SimulatedMotor::new("drive");
        motor.run(300.0).unwrap();
        motor.hold().unwrap();
        assert!(motor.is_holding());
        assert_eq!(motor.speed().unwrap(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slewing_motor_travels_at_speed() {
        let mut motor = SimulatedMotor::slewing("turning");
        motor.run_target(90.0, 100.0).unwrap();
        assert!(!motor.done().unwrap());
        assert_eq!(motor.speed().unwrap(), 100.0);

        tokio::time::advance(Duration::from_millis(500)).await;
        let angle = motor.angle().unwrap();
        assert!((angle - 50.0).abs() < 1e-6, "angle={}", angle);

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(motor.done().unwrap());
        assert_eq!(motor.angle().unwrap(), 90.0);
    }
}
