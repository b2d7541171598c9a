// Hub-local teleop loop
//
// Reads a controller every tick and drives all modules through the active
// steering mode. The face buttons switch modes, RB brakes, Guide exits.

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

use super::{DriveError, Flow};
use crate::config::{ConfigError, TELEOP_TICK, Tuning};
use crate::controller::{Button, Controller};
use crate::motor::driver::Imu;
use crate::motor::kinematics::SwerveDriveKinematics;
use crate::motor::module::{SwerveModule, settle, terminate_all};
use crate::steering::{Hsv, SteeringMode};

const MODE_BUTTONS: [Button; 4] = [Button::A, Button::B, Button::X, Button::Y];

pub struct TeleopLoop<C> {
    controller: C,
    kinematics: SwerveDriveKinematics,
    modules: Vec<SwerveModule>,
    imu: Box<dyn Imu>,
    tuning: Tuning,
    mode: SteeringMode,
    color: Option<Hsv>,
}

impl<C: Controller> TeleopLoop<C> {
    /// `modules` must be wired in kinematics order
    pub fn new(
        controller: C,
        kinematics: SwerveDriveKinematics,
        modules: Vec<SwerveModule>,
        imu: Box<dyn Imu>,
        tuning: Tuning,
        mode: SteeringMode,
    ) -> Result<Self, DriveError> {
        tuning.validate()?;
        if modules.len() != kinematics.module_count() {
            return Err(ConfigError::RegistryMismatch {
                expected: kinematics.module_count(),
                got: modules.len(),
            }
            .into());
        }

        let mut teleop = Self {
            controller,
            kinematics,
            modules,
            imu,
            tuning,
            mode: SteeringMode::default(),
            color: None,
        };
        teleop.switch_mode(mode)?;
        Ok(teleop)
    }

    pub fn mode(&self) -> &SteeringMode {
        &self.mode
    }

    /// Status color of the last tick
    pub fn color(&self) -> Option<Hsv> {
        self.color
    }

    pub fn modules_mut(&mut self) -> &mut [SwerveModule] {
        &mut self.modules
    }

    /// Tick until Guide is pressed or an error occurs, then terminate the modules
    pub async fn run(&mut self) -> Result<(), DriveError> {
        info!("Teleop started in {} mode", self.mode.name());

        let mut ticker = interval(TELEOP_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            ticker.tick().await;
            match self.step().await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit) => {
                    info!("Exiting teleop");
                    break Ok(());
                }
                Err(e) => {
                    error!("Teleop failed: {}", e);
                    break Err(e);
                }
            }
        };

        terminate_all(&mut self.modules).await;
        result
    }

    /// One control tick
    pub async fn step(&mut self) -> Result<Flow, DriveError> {
        let pressed = self.controller.pressed_buttons()?;

        if pressed.contains(&Button::Guide) {
            return Ok(Flow::Exit);
        }
        if let Some(mode) = MODE_BUTTONS
            .into_iter()
            .find(|b| pressed.contains(b))
            .and_then(SteeringMode::for_button)
        {
            self.switch_mode(mode)?;
        } else if pressed.contains(&Button::Rb) {
            debug!("Braking");
            for module in self.modules.iter_mut() {
                module.hold_drive()?;
            }
            return Ok(Flow::Continue);
        }

        let heading = self.imu.heading()?;
        let velocity = self.mode.drive_base_velocity(
            &mut self.controller,
            &pressed,
            heading,
            &self.tuning,
        )?;
        let color = SteeringMode::status_color(&velocity);
        self.color = Some(color);

        let mut states = self
            .kinematics
            .to_module_states(velocity, self.mode.drive_base_center());
        SwerveDriveKinematics::normalize_module_states(&mut states, self.tuning.attainable_max);
        SwerveModule::set_desired_states(&mut self.modules, &states, &self.tuning)?;

        if self.mode.should_block() {
            settle(&mut self.modules).await?;
        }
        Ok(Flow::Continue)
    }

    fn switch_mode(&mut self, mode: SteeringMode) -> Result<(), DriveError> {
        let acceleration = mode.acceleration(&self.tuning.acceleration);
        info!("Switching to {} steering mode", mode.name());
        for module in self.modules.iter_mut() {
            module.set_drive_acceleration(acceleration)?;
        }
        self.mode = mode;
        Ok(())
    }
}
