// Steering modes for hub-local teleop
//
// Each mode turns raw controller state into a body velocity and carries its own
// acceleration profile, status color and blocking behaviour. Exactly one mode is
// active at a time; switching replaces the value, so Crab's latches never
// survive a mode change.

use std::collections::HashSet;

use serde::Serialize;

use crate::config::{AccelerationProfile, Tuning};
use crate::controller::{self, Button, Controller};
use crate::motor::kinematics::{BodyVelocity, DriveCenter};
use crate::motor::vector::{RotationSense, Vector2, wrap_360};

// Hue of a robot driving straight ahead
const GREEN_HUE: f64 = 120.0;

/// Hub status light color
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Hsv {
    pub h: f64,
    pub s: f64,
    pub v: f64,
}

/// Directional toggles of the Crab mode
///
/// Each d-pad press flips its latch; latching one direction releases the
/// opposite one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrabLatches {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

impl CrabLatches {
    fn press(&mut self, button: Button) {
        match button {
            Button::Up => {
                self.up = !self.up;
                self.down &= !self.up;
            }
            Button::Down => {
                self.down = !self.down;
                self.up &= !self.down;
            }
            Button::Left => {
                self.left = !self.left;
                self.right &= !self.left;
            }
            Button::Right => {
                self.right = !self.right;
                self.left &= !self.right;
            }
            _ => {}
        }
    }

    fn velocity(&self) -> BodyVelocity {
        let full = |latched: bool| if latched { 100.0 } else { 0.0 };
        BodyVelocity::new(
            full(self.right) - full(self.left),
            full(self.up) - full(self.down),
            0.0,
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum SteeringMode {
    /// Car-like: triggers drive, left stick steers, turn rate scales with speed
    #[default]
    Ackermann,
    /// Triggers drive, left stick turns, pivots in place at standstill
    Tank,
    /// Discrete d-pad translation without rotation
    Crab(CrabLatches),
    /// Field-relative translation on the left stick, rotation on the right
    Swerve,
}

impl SteeringMode {
    pub fn crab() -> Self {
        SteeringMode::Crab(CrabLatches::default())
    }

    /// Mode selected by a face button (A/B/X/Y)
    pub fn for_button(button: Button) -> Option<Self> {
        match button {
            Button::A => Some(SteeringMode::Ackermann),
            Button::B => Some(SteeringMode::Tank),
            Button::X => Some(SteeringMode::crab()),
            Button::Y => Some(SteeringMode::Swerve),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SteeringMode::Ackermann => "ackermann",
            SteeringMode::Tank => "tank",
            SteeringMode::Crab(_) => "crab",
            SteeringMode::Swerve => "swerve",
        }
    }

    /// Whether the loop waits for the steering to settle before reading input again
    pub fn should_block(&self) -> bool {
        matches!(self, SteeringMode::Crab(_))
    }

    pub fn drive_base_center(&self) -> DriveCenter {
        DriveCenter::origin()
    }

    /// Drive motor acceleration applied when this mode becomes active
    pub fn acceleration(&self, profile: &AccelerationProfile) -> f64 {
        match self {
            SteeringMode::Ackermann => profile.ackermann,
            SteeringMode::Tank => profile.tank,
            SteeringMode::Crab(_) => profile.crab,
            SteeringMode::Swerve => profile.swerve,
        }
    }

    /// Derive the body velocity for this tick
    ///
    /// `pressed` is the button set already sampled for the tick; only Crab uses it.
    pub fn drive_base_velocity(
        &mut self,
        controller: &mut dyn Controller,
        pressed: &HashSet<Button>,
        heading: f64,
        tuning: &Tuning,
    ) -> controller::Result<BodyVelocity> {
        match self {
            SteeringMode::Ackermann => {
                let (left, right) = controller.triggers()?;
                let (x1, _) = controller.joystick_left()?;
                let vy = right - left;
                let omega = -x1 * tuning.ackermann_turn_factor * (vy.abs() / 100.0);
                Ok(BodyVelocity::new(0.0, vy, omega))
            }
            SteeringMode::Tank => {
                let (left, right) = controller.triggers()?;
                let (x1, _) = controller.joystick_left()?;
                let vy = right - left;
                Ok(BodyVelocity::new(0.0, vy, -x1 * tuning.tank_turn_factor))
            }
            SteeringMode::Crab(latches) => {
                for &button in pressed {
                    latches.press(button);
                }
                Ok(latches.velocity())
            }
            SteeringMode::Swerve => {
                let (x1, y1) = controller.joystick_left()?;
                let (x2, _) = controller.joystick_right()?;
                let translation = Vector2::new(x1, y1).field_relative(heading);
                Ok(BodyVelocity::new(
                    translation.x,
                    translation.y,
                    -x2 * tuning.swerve_turn_factor,
                ))
            }
        }
    }

    /// Status light: hue follows direction and rotation, brightness follows magnitude
    pub fn status_color(velocity: &BodyVelocity) -> Hsv {
        let direction = velocity
            .translation()
            .rotate(GREEN_HUE)
            .angle(RotationSense::Clockwise);
        Hsv {
            h: wrap_360(direction + velocity.omega),
            s: 100.0,
            v: (velocity.translation().length() + velocity.omega.abs()).min(100.0),
        }
    }
}
