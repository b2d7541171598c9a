// 2-D vector helpers shared by the kinematics, the optimizer and the steering modes.
// Angles are in degrees everywhere in this crate.

use serde::{Deserialize, Serialize};

/// Rotational sense in which module angles increase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationSense {
    /// 0° points along +y, 90° along +x (matches the steering motors' positive direction)
    #[default]
    Clockwise,
    /// 0° points along +y, 90° along -x
    CounterClockwise,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector2 {
    pub x: f64,
    pub y: f64,
}

impl Vector2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn length(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Rotate counter-clockwise by `degrees`
    pub fn rotate(&self, degrees: f64) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self {
            x: self.x * cos - self.y * sin,
            y: self.x * sin + self.y * cos,
        }
    }

    /// Re-express a world-frame vector in the body frame of a robot at `heading`
    pub fn field_relative(&self, heading: f64) -> Self {
        self.rotate(-heading)
    }

    /// Direction of the vector in the motor angle convention, in [0, 360)
    ///
    /// 0° is the +y reference heading. A zero vector reports 0°.
    pub fn angle(&self, sense: RotationSense) -> f64 {
        if self.x == 0.0 && self.y == 0.0 {
            return 0.0;
        }
        let math_angle = self.y.atan2(self.x).to_degrees();
        let angle = match sense {
            RotationSense::Clockwise => 90.0 - math_angle,
            RotationSense::CounterClockwise => math_angle - 90.0,
        };
        wrap_360(angle)
    }
}

/// Wrap an angle into [0, 360)
pub fn wrap_360(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// Wrap an angle into [-180, 180]
pub fn wrap_180(degrees: f64) -> f64 {
    let wrapped = wrap_360(degrees);
    if wrapped > 180.0 { wrapped - 360.0 } else { wrapped }
}
