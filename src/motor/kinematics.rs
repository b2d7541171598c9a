// Swerve drive inverse kinematics
// Converts a body velocity (vx, vy, omega) into one (speed, angle) state per module.

use serde::{Deserialize, Serialize};

use super::module::ModuleState;
use super::vector::{RotationSense, Vector2};

/// Normalized ceiling that every module speed must respect (percent)
pub const ATTAINABLE_MAX_SPEED: f64 = 100.0;

#[derive(Debug, thiserror::Error)]
pub enum KinematicsError {
    #[error("A swerve drivetrain needs 2 or 4 modules, got {0}")]
    InvalidModuleCount(usize),
}

/// Intended motion of the drive base, recomputed every tick
///
/// `vx` and `vy` are percentages in [-100, 100], `omega` is unscaled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BodyVelocity {
    pub vx: f64,
    pub vy: f64,
    pub omega: f64,
}

impl BodyVelocity {
    pub fn new(vx: f64, vy: f64, omega: f64) -> Self {
        Self { vx, vy, omega }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn translation(&self) -> Vector2 {
        Vector2::new(self.vx, self.vy)
    }

    pub fn is_finite(&self) -> bool {
        self.vx.is_finite() && self.vy.is_finite() && self.omega.is_finite()
    }
}

/// Offset of the instantaneous center of rotation from the body origin
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DriveCenter {
    pub cx: f64,
    pub cy: f64,
}

impl DriveCenter {
    pub fn new(cx: f64, cy: f64) -> Self {
        Self { cx, cy }
    }

    pub fn origin() -> Self {
        Self::default()
    }
}

/// Mounting offset of a module relative to the body origin
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModulePosition {
    pub x: f64,
    pub y: f64,
}

impl ModulePosition {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<(f64, f64)> for ModulePosition {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// Kinematic basis of the drivetrain: the ordered module positions
///
/// The position list is fixed at construction; nothing can mutate it afterwards.
#[derive(Debug, Clone)]
pub struct SwerveDriveKinematics {
    positions: Vec<ModulePosition>,
    sense: RotationSense,
}

impl SwerveDriveKinematics {
    pub fn new(positions: Vec<ModulePosition>) -> Result<Self, KinematicsError> {
        Self::with_sense(positions, RotationSense::default())
    }

    pub fn with_sense(
        positions: Vec<ModulePosition>,
        sense: RotationSense,
    ) -> Result<Self, KinematicsError> {
        if !matches!(positions.len(), 2 | 4) {
            return Err(KinematicsError::InvalidModuleCount(positions.len()));
        }
        Ok(Self { positions, sense })
    }

    pub fn module_count(&self) -> usize {
        self.positions.len()
    }

    /// Velocity vector of every module, in position order
    ///
    /// Each module sees the body translation plus omega x r, where r is the
    /// module position relative to the drive center.
    pub fn module_vectors(&self, velocity: BodyVelocity, center: DriveCenter) -> Vec<Vector2> {
        self.positions
            .iter()
            .map(|p| {
                let dx = p.x - center.cx;
                let dy = p.y - center.cy;
                Vector2::new(
                    velocity.vx - velocity.omega * dy,
                    velocity.vy + velocity.omega * dx,
                )
            })
            .collect()
    }

    /// Convert a body velocity into one module state per position
    pub fn to_module_states(
        &self,
        velocity: BodyVelocity,
        center: DriveCenter,
    ) -> Vec<ModuleState> {
        self.module_vectors(velocity, center)
            .into_iter()
            .map(|v| ModuleState::new(v.length(), v.angle(self.sense)))
            .collect()
    }

    /// Scale the whole set so no module exceeds `attainable_max`
    ///
    /// All speeds share one ratio, so the shape of the motion is preserved.
    /// Angles are never touched.
    pub fn normalize_module_states(states: &mut [ModuleState], attainable_max: f64) {
        let max_speed = states
            .iter()
            .map(|s| s.speed.abs())
            .fold(0.0f64, f64::max);

        if max_speed > attainable_max {
            let scale = attainable_max / max_speed;
            for state in states.iter_mut() {
                state.speed *= scale;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn four_modules() -> SwerveDriveKinematics {
        SwerveDriveKinematics::new(vec![
            ModulePosition::new(-1.0, 1.0),
            ModulePosition::new(1.0, 1.0),
            ModulePosition::new(-1.0, -1.0),
            ModulePosition::new(1.0, -1.0),
        ])
        .unwrap()
    }

    fn two_modules() -> SwerveDriveKinematics {
        SwerveDriveKinematics::new(vec![
            ModulePosition::new(-1.0, 0.0),
            ModulePosition::new(1.0, 0.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_rejects_odd_module_count() {
        let result = SwerveDriveKinematics::new(vec![ModulePosition::new(0.0, 0.0); 3]);
        assert!(matches!(result, Err(KinematicsError::InvalidModuleCount(3))));
    }

    #[test]
    fn test_zero_velocity() {
        let centers = [DriveCenter::origin(), DriveCenter::new(3.0, -2.0)];
        for center in centers {
            let states = four_modules().to_module_states(BodyVelocity::zero(), center);
            assert_eq!(states.len(), 4);
            assert!(states.iter().all(|s| s.speed == 0.0));
        }
    }

    #[test]
    fn test_pure_translation_identical_states() {
        let states = four_modules().to_module_states(
            BodyVelocity::new(30.0, -40.0, 0.0),
            DriveCenter::new(1.0, 1.0),
        );
        for state in &states {
            assert!((state.speed - 50.0).abs() < EPS);
            assert!((state.angle - states[0].angle).abs() < EPS);
        }
    }

    #[test]
    fn test_forward_two_modules() {
        let velocity = BodyVelocity::new(0.0, 100.0, 0.0);
        let states = two_modules().to_module_states(velocity, DriveCenter::origin());
        for state in &states {
            assert!((state.speed - 100.0).abs() < EPS);
            assert!(state.angle.abs() < EPS);
        }
    }

    #[test]
    fn test_pure_rotation_symmetric_speeds() {
        let velocity = BodyVelocity::new(0.0, 0.0, 25.0);
        let states = four_modules().to_module_states(velocity, DriveCenter::origin());
        let expected = 25.0 * 2.0f64.sqrt();
        for state in &states {
            assert!((state.speed - expected).abs() < EPS);
        }
        // Tangential directions are all different
        assert!((states[0].angle - states[3].angle).abs() > 1.0);
    }

    #[test]
    fn test_rotation_about_offset_center() {
        // Rotating about the right module leaves it stationary
        let velocity = BodyVelocity::new(0.0, 0.0, 10.0);
        let states = two_modules().to_module_states(velocity, DriveCenter::new(1.0, 0.0));
        assert!((states[0].speed - 20.0).abs() < EPS);
        assert!(states[1].speed.abs() < EPS);
    }

    #[test]
    fn test_normalize_scales_uniformly() {
        let mut states = vec![
            ModuleState::new(150.0, 10.0),
            ModuleState::new(-75.0, 200.0),
            ModuleState::new(30.0, 45.0),
        ];
        SwerveDriveKinematics::normalize_module_states(&mut states, ATTAINABLE_MAX_SPEED);

        assert!((states[0].speed - 100.0).abs() < EPS);
        assert!((states[1].speed + 50.0).abs() < EPS);
        assert!((states[2].speed - 20.0).abs() < EPS);
        assert_eq!(states[1].angle, 200.0);
    }

    #[test]
    fn test_normalize_leaves_attainable_set_alone() {
        let mut states = vec![ModuleState::new(100.0, 0.0), ModuleState::new(-20.0, 90.0)];
        SwerveDriveKinematics::normalize_module_states(&mut states, ATTAINABLE_MAX_SPEED);
        assert_eq!(states[0].speed, 100.0);
        assert_eq!(states[1].speed, -20.0);
    }

    #[test]
    fn test_normalize_bound_after_rotation_and_translation() {
        let kinematics = four_modules();
        for omega in [-100.0, -37.5, 0.0, 12.0, 100.0] {
            let velocity = BodyVelocity::new(100.0, -100.0, omega);
            let mut states = kinematics.to_module_states(velocity, DriveCenter::origin());
            SwerveDriveKinematics::normalize_module_states(&mut states, ATTAINABLE_MAX_SPEED);
            let max = states.iter().map(|s| s.speed.abs()).fold(0.0, f64::max);
            assert!(max <= ATTAINABLE_MAX_SPEED + EPS, "omega={} max={}", omega, max);
        }
    }
}
