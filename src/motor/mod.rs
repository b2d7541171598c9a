// Swerve module control
//
// Provides:
// - Swerve kinematics (body velocity -> per-module speed and angle)
// - Module state optimization and synchronized drive attenuation
// - Motor and IMU interfaces with simulated implementations

pub mod driver;
pub mod kinematics;
pub mod module;
pub mod vector;

pub use driver::{ActuatorError, Imu, Motor, SimulatedImu, SimulatedMotor, percentage_to_speed};
pub use kinematics::{BodyVelocity, DriveCenter, ModulePosition, SwerveDriveKinematics};
pub use module::{ModuleState, ModuleTelemetry, SwerveModule};
pub use vector::{RotationSense, Vector2};
