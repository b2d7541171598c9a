// Swerve module: one drive motor plus one steering motor
//
// Holds the shortest-path optimizer and the synchronized speed attenuation that
// keeps every wheel of a hub arriving at its heading together.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use super::driver::{
    DRIVE_ACCELERATION, Motor, Result, TURNING_ACCELERATION, percentage_to_speed,
};
use super::vector::wrap_180;
use crate::config::{SETTLE_POLL, Tuning};

/// Commanded speed (percent, signed) and steering angle (degrees) of a module
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ModuleState {
    pub speed: f64,
    pub angle: f64,
}

impl ModuleState {
    pub fn new(speed: f64, angle: f64) -> Self {
        Self { speed, angle }
    }

    pub fn is_finite(&self) -> bool {
        self.speed.is_finite() && self.angle.is_finite()
    }

    /// Reconcile `desired` with the measured steering angle
    ///
    /// A wheel reaches any heading either directly or by turning to the
    /// opposite heading and reversing its drive, so the steering never travels
    /// more than 90°. The returned angle is a continuous motor target:
    /// `|optimized.angle - current_angle| <= 90`.
    pub fn optimize(desired: ModuleState, current_angle: f64) -> ModuleState {
        let delta = wrap_180(desired.angle - current_angle);

        let (delta, speed) = if delta > 90.0 {
            (delta - 180.0, -desired.speed)
        } else if delta < -90.0 {
            (delta + 180.0, -desired.speed)
        } else {
            (delta, desired.speed)
        };

        ModuleState::new(speed, current_angle + delta)
    }

    /// Like [`ModuleState::optimize`], but negligible speeds stop the wheel and
    /// hold the current angle instead of re-steering
    pub fn optimize_with_deadzone(
        desired: ModuleState,
        current_angle: f64,
        deadzone: f64,
    ) -> ModuleState {
        if desired.speed.abs() < deadzone {
            return ModuleState::new(0.0, current_angle);
        }
        Self::optimize(desired, current_angle)
    }
}

/// Drive speed factor while the steering still has `max_deviation` degrees to go
///
/// Never leaves `[0, 1]`, so attenuation can only slow a wheel down.
pub fn attenuation(max_deviation: f64, exponent: i32) -> f64 {
    max_deviation.to_radians().cos().powi(exponent).clamp(0.0, 1.0)
}

/// Measured state of a module reported in every acknowledgment
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModuleTelemetry {
    pub angle: f64,
    pub turn_speed: f64,
    pub drive_speed: f64,
}

pub struct SwerveModule {
    drive_motor: Box<dyn Motor>,
    turning_motor: Box<dyn Motor>,
}

impl SwerveModule {
    /// Wrap a motor pair, applying the default acceleration limits
    pub fn new(mut drive_motor: Box<dyn Motor>, mut turning_motor: Box<dyn Motor>) -> Result<Self> {
        drive_motor.set_acceleration(DRIVE_ACCELERATION)?;
        turning_motor.set_acceleration(TURNING_ACCELERATION)?;
        Ok(Self {
            drive_motor,
            turning_motor,
        })
    }

    pub fn drive_motor(&mut self) -> &mut dyn Motor {
        self.drive_motor.as_mut()
    }

    pub fn turning_motor(&mut self) -> &mut dyn Motor {
        self.turning_motor.as_mut()
    }

    pub fn set_drive_acceleration(&mut self, acceleration: f64) -> Result<()> {
        self.drive_motor.set_acceleration(acceleration)
    }

    /// Brake the wheel in place
    pub fn hold_drive(&mut self) -> Result<()> {
        self.drive_motor.hold()
    }

    pub fn telemetry(&mut self) -> Result<ModuleTelemetry> {
        Ok(ModuleTelemetry {
            angle: self.turning_motor.angle()?,
            turn_speed: self.turning_motor.speed()?,
            drive_speed: self.drive_motor.speed()?,
        })
    }

    pub fn is_settled(&mut self) -> Result<bool> {
        self.turning_motor.done()
    }

    /// Apply one state per module, all in the same tick
    ///
    /// Every state is optimized against its module's measured angle first.
    /// The drive speeds are then scaled by the cosine of the largest remaining
    /// steering travel among all modules, raised to `tuning.attenuation_exponent`.
    /// Returns the states actually commanded.
    pub fn set_desired_states(
        modules: &mut [SwerveModule],
        states: &[ModuleState],
        tuning: &Tuning,
    ) -> Result<Vec<ModuleState>> {
        if modules.len() != states.len() {
            warn!(
                "Applying {} states to {} modules, extra entries are ignored",
                states.len(),
                modules.len()
            );
        }

        let mut optimized = Vec::with_capacity(modules.len());
        for (module, desired) in modules.iter_mut().zip(states) {
            let current = module.turning_motor.angle()?;
            let state = ModuleState::optimize_with_deadzone(*desired, current, tuning.deadzone);
            optimized.push((state, current));
        }

        let max_deviation = optimized
            .iter()
            .map(|(state, current)| (state.angle - current).abs())
            .fold(0.0f64, f64::max);
        let factor = attenuation(max_deviation, tuning.attenuation_exponent);
        debug!("Max steering deviation {:.2}°, drive factor {:.3}", max_deviation, factor);

        let turning_speed = percentage_to_speed(tuning.turning_speed);
        let mut applied = Vec::with_capacity(optimized.len());
        for (module, (state, _)) in modules.iter_mut().zip(optimized) {
            let state = ModuleState::new(state.speed * factor, state.angle);
            module.drive_motor.run(percentage_to_speed(state.speed))?;
            module.turning_motor.run_target(state.angle, turning_speed)?;
            applied.push(state);
        }

        Ok(applied)
    }

    /// Command the terminal state: zero speed, zero angle
    pub fn terminate(&mut self) -> Result<()> {
        self.drive_motor.stop()?;
        self.turning_motor.run_target(0.0, percentage_to_speed(100.0))
    }
}

/// Wait until every steering motor reports arrival
pub async fn settle(modules: &mut [SwerveModule]) -> Result<()> {
    loop {
        let mut settled = true;
        for module in modules.iter_mut() {
            settled &= module.is_settled()?;
        }
        if settled {
            return Ok(());
        }
        tokio::time::sleep(SETTLE_POLL).await;
    }
}

/// Drive every module to its terminal state and wait for the steering to arrive
///
/// Failures are logged and do not stop the remaining modules from terminating.
pub async fn terminate_all(modules: &mut [SwerveModule]) {
    for (i, module) in modules.iter_mut().enumerate() {
        if let Err(e) = module.terminate() {
            warn!("Failed to terminate module {}: {}", i, e);
        }
    }
    match tokio::time::timeout(TERMINATE_TIMEOUT, settle(modules)).await {
        Ok(Ok(())) => debug!("All modules terminated"),
        Ok(Err(e)) => warn!("Failed to confirm module termination: {}", e),
        Err(_) => warn!("Modules did not settle within {:?}", TERMINATE_TIMEOUT),
    }
}

const TERMINATE_TIMEOUT: Duration = Duration::from_secs(5);
