// Swerve hub command loop
//
// One loop per hub. Every hub receives the same commands and runs the
// kinematics for the whole drivetrain, then applies only the states of the
// modules it owns. Hubs are not synchronized with each other.

use tracing::{debug, error, info, warn};

use super::{DriveError, Flow};
use crate::config::{ConfigError, ModuleRegistry, PidGains, Tuning};
use crate::messages::{Ack, Command, HubMessage};
use crate::motor::driver::Imu;
use crate::motor::kinematics::{BodyVelocity, DriveCenter, SwerveDriveKinematics};
use crate::motor::module::{ModuleState, SwerveModule, terminate_all};
use crate::pid::FilteredAxis;
use crate::transport::LineTransport;

/// Mutable state owned by one drive loop
#[derive(Debug, Clone)]
pub struct LoopState {
    pub drive_center: DriveCenter,
    pub field_centric: bool,
    filters: Option<[FilteredAxis; 3]>,
}

impl LoopState {
    pub fn new(filter_gains: Option<PidGains>) -> Self {
        Self {
            drive_center: DriveCenter::origin(),
            field_centric: false,
            filters: filter_gains.map(|gains| {
                [
                    FilteredAxis::new(gains),
                    FilteredAxis::new(gains),
                    FilteredAxis::new(gains),
                ]
            }),
        }
    }

    pub fn is_filtered(&self) -> bool {
        self.filters.is_some()
    }

    /// Move each axis one step toward the commanded setpoint
    fn smooth(&mut self, setpoint: BodyVelocity) -> BodyVelocity {
        match &mut self.filters {
            Some([vx, vy, omega]) => BodyVelocity::new(
                vx.step(setpoint.vx),
                vy.step(setpoint.vy),
                omega.step(setpoint.omega),
            ),
            None => setpoint,
        }
    }
}

pub struct DriveLoop<T> {
    transport: T,
    kinematics: SwerveDriveKinematics,
    registry: ModuleRegistry,
    modules: Vec<SwerveModule>,
    imu: Box<dyn Imu>,
    tuning: Tuning,
    state: LoopState,
}

impl<T: LineTransport> DriveLoop<T> {
    /// `modules` must be wired in registry order
    pub fn new(
        transport: T,
        kinematics: SwerveDriveKinematics,
        registry: ModuleRegistry,
        modules: Vec<SwerveModule>,
        imu: Box<dyn Imu>,
        tuning: Tuning,
    ) -> Result<Self, ConfigError> {
        tuning.validate()?;
        if registry.len() != modules.len() {
            return Err(ConfigError::RegistryMismatch {
                expected: registry.len(),
                got: modules.len(),
            });
        }
        if let Some(&index) = registry
            .indices()
            .iter()
            .find(|&&i| i >= kinematics.module_count())
        {
            return Err(ConfigError::ModuleOutOfRange {
                hub: format!("{:?}", registry.indices()),
                index,
                count: kinematics.module_count(),
            });
        }

        let state = LoopState::new(tuning.setpoint_filter);
        Ok(Self {
            transport,
            kinematics,
            registry,
            modules,
            imu,
            tuning,
            state,
        })
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn modules_mut(&mut self) -> &mut [SwerveModule] {
        &mut self.modules
    }

    /// Serve commands until `exit`, end of stream or an error
    ///
    /// Parse, range and actuator errors are reported on the transport as a
    /// diagnostic line and returned. A failing transport ends the loop like a
    /// closed stream. Every path leaves the owned modules stopped at angle 0.
    pub async fn run(&mut self) -> Result<(), DriveError> {
        info!(
            "Drive loop started: modules {:?} of {}, filtered={}",
            self.registry.indices(),
            self.kinematics.module_count(),
            self.state.is_filtered()
        );

        let result = self.serve().await;

        if let Err(e) = &result {
            if !matches!(e, DriveError::Transport(_)) {
                error!("Drive loop failed: {}", e);
                let diagnostic = HubMessage::error(e.kind(), e);
                let frame = format!("{}\n", diagnostic);
                if let Err(write_err) = self.transport.write_frame(&frame).await {
                    warn!("Failed to report error: {}", write_err);
                }
            }
        }

        info!("Terminating {} modules", self.modules.len());
        terminate_all(&mut self.modules).await;

        match result {
            Err(DriveError::Transport(e)) => {
                info!("Transport ended: {}", e);
                Ok(())
            }
            other => other,
        }
    }

    async fn serve(&mut self) -> Result<(), DriveError> {
        loop {
            let Some(line) = self.transport.read_line().await? else {
                info!("Command stream closed");
                return Ok(());
            };
            debug!("Received command: {}", line);

            let command: Command = line.parse()?;
            if self.on_command(command)? == Flow::Exit {
                info!("Exit requested");
                return Ok(());
            }

            let ack = self.telemetry()?;
            self.transport.write_frame(&format!("{}\n", ack)).await?;
        }
    }

    /// Apply one parsed command
    pub fn on_command(&mut self, command: Command) -> Result<Flow, DriveError> {
        match command {
            Command::Exit => return Ok(Flow::Exit),
            Command::SetDriveBaseCenter(center) => {
                info!("Drive base center set to ({}, {})", center.cx, center.cy);
                self.state.drive_center = center;
            }
            Command::ToggleFieldCentric => {
                self.state.field_centric = !self.state.field_centric;
                info!("Field centric: {}", self.state.field_centric);
            }
            Command::Drive(velocity) => {
                let applied = self.drive(velocity)?;
                debug!("Applied module states: {:?}", applied);
            }
        }
        Ok(Flow::Continue)
    }

    fn drive(&mut self, velocity: BodyVelocity) -> Result<Vec<ModuleState>, DriveError> {
        check_command_range(&velocity)?;

        let mut velocity = self.state.smooth(velocity);
        if self.state.field_centric {
            let heading = self.imu.heading()?;
            let translation = velocity.translation().rotate(heading);
            velocity = BodyVelocity::new(translation.x, translation.y, velocity.omega);
        }

        let mut states = self
            .kinematics
            .to_module_states(velocity, self.state.drive_center);
        if let Some(bad) = states.iter().find(|s| !s.is_finite()) {
            return Err(DriveError::Range {
                quantity: "module speed",
                value: bad.speed,
            });
        }
        SwerveDriveKinematics::normalize_module_states(&mut states, self.tuning.attainable_max);

        let owned: Vec<ModuleState> = self.registry.indices().iter().map(|&i| states[i]).collect();
        Ok(SwerveModule::set_desired_states(&mut self.modules, &owned, &self.tuning)?)
    }

    /// Heading plus angle, turn speed and drive speed of every owned module
    pub fn telemetry(&mut self) -> Result<Ack, DriveError> {
        let heading = self.imu.heading()?;
        let modules = self
            .modules
            .iter_mut()
            .map(|m| m.telemetry())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Ack { heading, modules })
    }
}

fn check_command_range(velocity: &BodyVelocity) -> Result<(), DriveError> {
    for (quantity, value) in [("vx", velocity.vx), ("vy", velocity.vy)] {
        if !value.is_finite() || value.abs() > 100.0 {
            return Err(DriveError::Range { quantity, value });
        }
    }
    if !velocity.omega.is_finite() {
        return Err(DriveError::Range {
            quantity: "omega",
            value: velocity.omega,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DrivetrainConfig;
    use crate::motor::driver::{SimulatedImu, percentage_to_speed};
    use crate::runtime::simulated_modules;
    use crate::transport::ScriptedTransport;
    use std::io::ErrorKind;

    const EPS: f64 = 1e-6;

    fn two_module_loop(
        lines: &[&str],
        tuning: Tuning,
        heading: f64,
    ) -> DriveLoop<ScriptedTransport> {
        scripted_loop(ScriptedTransport::new(lines.iter().copied()), tuning, heading)
    }

    fn scripted_loop(
        transport: ScriptedTransport,
        tuning: Tuning,
        heading: f64,
    ) -> DriveLoop<ScriptedTransport> {
        let config = DrivetrainConfig::two_module();
        DriveLoop::new(
            transport,
            config.kinematics().unwrap(),
            config.registry("main").unwrap(),
            simulated_modules(2, false).unwrap(),
            Box::new(SimulatedImu::new(heading)),
            tuning,
        )
        .unwrap()
    }

    fn drive_speeds(drive_loop: &mut DriveLoop<ScriptedTransport>) -> Vec<f64> {
        drive_loop
            .modules_mut()
            .iter_mut()
            .map(|m| m.drive_motor().speed().unwrap())
            .collect()
    }

    fn turning_angles(drive_loop: &mut DriveLoop<ScriptedTransport>) -> Vec<f64> {
        drive_loop
            .modules_mut()
            .iter_mut()
            .map(|m| m.turning_motor().angle().unwrap())
            .collect()
    }

    #[test]
    fn test_registry_must_match_modules() {
        let config = DrivetrainConfig::two_module();
        let result = DriveLoop::new(
            ScriptedTransport::default(),
            config.kinematics().unwrap(),
            ModuleRegistry::new(vec![0]),
            simulated_modules(2, false).unwrap(),
            Box::new(SimulatedImu::default()),
            Tuning::default(),
        );
        assert!(matches!(result, Err(ConfigError::RegistryMismatch { expected: 1, got: 2 })));
    }

    #[test]
    fn test_forward_drive() {
        let mut drive_loop = two_module_loop(&[], Tuning::default(), 0.0);
        drive_loop.on_command("drive,0,100,0".parse().unwrap()).unwrap();

        for speed in drive_speeds(&mut drive_loop) {
            assert!((speed - percentage_to_speed(100.0)).abs() < EPS);
        }
        for angle in turning_angles(&mut drive_loop) {
            assert!(angle.abs() < EPS);
        }
    }

    #[test]
    fn test_zero_command_holds_angle() {
        let mut drive_loop = two_module_loop(&[], Tuning::default(), 0.0);
        drive_loop.on_command("drive,60,0,0".parse().unwrap()).unwrap();
        let angles = turning_angles(&mut drive_loop);
        assert!((angles[0] - 90.0).abs() < EPS);

        drive_loop.on_command("drive,0,0,0".parse().unwrap()).unwrap();
        assert_eq!(drive_speeds(&mut drive_loop), vec![0.0, 0.0]);
        assert_eq!(turning_angles(&mut drive_loop), angles);
    }

    #[test]
    fn test_drive_center_shifts_rotation() {
        let mut symmetric = two_module_loop(&[], Tuning::default(), 0.0);
        symmetric.on_command("drive,0,0,50".parse().unwrap()).unwrap();
        let speeds = drive_speeds(&mut symmetric);
        assert!((speeds[0].abs() - speeds[1].abs()).abs() < EPS);

        let mut shifted = two_module_loop(&[], Tuning::default(), 0.0);
        shifted.on_command("set_drive_base_center,0,1".parse().unwrap()).unwrap();
        assert_eq!(shifted.state().drive_center, DriveCenter::new(1.0, 0.0));
        shifted.on_command("drive,0,0,50".parse().unwrap()).unwrap();
        let speeds = drive_speeds(&mut shifted);
        assert!((speeds[0].abs() - percentage_to_speed(100.0)).abs() < EPS);
        assert!(speeds[1].abs() < EPS);
    }

    #[test]
    fn test_field_centric_rotates_and_attenuates() {
        let mut drive_loop = two_module_loop(&[], Tuning::default(), 90.0);
        drive_loop.on_command("toggle_field_centric".parse().unwrap()).unwrap();
        assert!(drive_loop.state().field_centric);

        drive_loop.on_command("drive,0,100,0".parse().unwrap()).unwrap();
        // (0, 100) turned by +90° points along -x, reached by steering to -90°.
        // The wheels swing a full 90°, so the drive is held back until they arrive.
        for angle in turning_angles(&mut drive_loop) {
            assert!((angle - -90.0).abs() < EPS, "angle={}", angle);
        }
        for speed in drive_speeds(&mut drive_loop) {
            assert!(speed.abs() < EPS);
        }
    }

    #[test]
    fn test_field_centric_turns_by_heading() {
        let mut drive_loop = two_module_loop(&[], Tuning::default(), 30.0);
        drive_loop.on_command(Command::ToggleFieldCentric).unwrap();
        drive_loop.on_command("drive,0,100,0".parse().unwrap()).unwrap();

        let factor = 30.0f64.to_radians().cos().powi(3);
        for angle in turning_angles(&mut drive_loop) {
            assert!((angle - -30.0).abs() < EPS, "angle={}", angle);
        }
        for speed in drive_speeds(&mut drive_loop) {
            assert!((speed - percentage_to_speed(100.0 * factor)).abs() < EPS);
        }
    }

    #[test]
    fn test_setpoint_filter_ramps() {
        let tuning = Tuning {
            setpoint_filter: Some(PidGains::default()),
            ..Tuning::default()
        };
        let mut drive_loop = two_module_loop(&[], tuning, 0.0);
        drive_loop.on_command("drive,0,100,0".parse().unwrap()).unwrap();
        let first = drive_speeds(&mut drive_loop)[0];
        assert!((first - percentage_to_speed(22.0)).abs() < EPS);

        drive_loop.on_command("drive,0,100,0".parse().unwrap()).unwrap();
        let second = drive_speeds(&mut drive_loop)[0];
        assert!(second > first);
        assert!(second < percentage_to_speed(100.0));
    }

    #[test]
    fn test_rejects_out_of_range_translation() {
        let mut drive_loop = two_module_loop(&[], Tuning::default(), 0.0);
        let err = drive_loop.on_command("drive,150,0,0".parse().unwrap()).unwrap_err();
        assert!(matches!(err, DriveError::Range { quantity: "vx", .. }));

        let err = drive_loop.on_command("drive,0,0,inf".parse().unwrap()).unwrap_err();
        assert!(matches!(err, DriveError::Range { quantity: "omega", .. }));
    }

    #[tokio::test]
    async fn test_run_acks_each_command() {
        let mut drive_loop = two_module_loop(
            &["drive,0,100,0\n", "toggle_field_centric\n", "drive,0,0,0\n"],
            Tuning::default(),
            0.0,
        );
        drive_loop.run().await.unwrap();

        let written = drive_loop.transport().written();
        assert_eq!(written.len(), 3);
        assert_eq!(written[0], "ack,0.00,0.00,0.00,1083.33,0.00,0.00,1083.33\n");
        assert_eq!(written[2], "ack,0.00,0.00,0.00,0.00,0.00,0.00,0.00\n");
    }

    #[tokio::test]
    async fn test_exit_stops_reading_and_terminates() {
        let mut drive_loop = two_module_loop(
            &["drive,100,0,0", "exit", "bogus"],
            Tuning::default(),
            0.0,
        );
        drive_loop.run().await.unwrap();

        assert_eq!(drive_loop.transport().written().len(), 1);
        assert_eq!(drive_speeds(&mut drive_loop), vec![0.0, 0.0]);
        assert_eq!(turning_angles(&mut drive_loop), vec![0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_parse_error_fails_fast() {
        let mut drive_loop = two_module_loop(
            &["drive,0,100,0", "fly,1", "drive,0,100,0"],
            Tuning::default(),
            0.0,
        );
        let err = drive_loop.run().await.unwrap_err();
        assert!(matches!(err, DriveError::Parse(_)));

        let written = drive_loop.transport().written();
        assert_eq!(written.len(), 2);
        let diagnostic = HubMessage::parse(written[1].trim_end()).unwrap();
        assert_eq!(diagnostic.kind, "error");
        assert_eq!(diagnostic.payload["kind"], "parse");

        // Nothing left spinning
        assert_eq!(drive_speeds(&mut drive_loop), vec![0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_range_error_is_reported() {
        let mut drive_loop = two_module_loop(
            &["drive,150,0,0", "drive,0,100,0"],
            Tuning::default(),
            0.0,
        );
        let err = drive_loop.run().await.unwrap_err();
        assert!(matches!(err, DriveError::Range { quantity: "vx", .. }));

        let written = drive_loop.transport().written();
        assert_eq!(written.len(), 1);
        let diagnostic = HubMessage::parse(written[0].trim_end()).unwrap();
        assert_eq!(diagnostic.payload["kind"], "range");
        assert_eq!(drive_speeds(&mut drive_loop), vec![0.0, 0.0]);
        assert_eq!(turning_angles(&mut drive_loop), vec![0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_dropped_link_ends_quietly_and_terminates() {
        let transport =
            ScriptedTransport::new(["drive,60,60,0"]).failing_with(ErrorKind::ConnectionReset);
        let mut drive_loop = scripted_loop(transport, Tuning::default(), 0.0);
        drive_loop.run().await.unwrap();

        // Only the ack, no diagnostic for a transport failure
        let written = drive_loop.transport().written();
        assert_eq!(written.len(), 1);
        assert!(written[0].starts_with("ack,"));
        assert_eq!(drive_speeds(&mut drive_loop), vec![0.0, 0.0]);
        assert_eq!(turning_angles(&mut drive_loop), vec![0.0, 0.0]);
    }

    #[test]
    fn test_rejects_speed_raising_tuning() {
        let config = DrivetrainConfig::two_module();
        let result = DriveLoop::new(
            ScriptedTransport::default(),
            config.kinematics().unwrap(),
            config.registry("main").unwrap(),
            simulated_modules(2, false).unwrap(),
            Box::new(SimulatedImu::default()),
            Tuning {
                attenuation_exponent: -3,
                ..Tuning::default()
            },
        );
        assert!(matches!(result, Err(ConfigError::InvalidTuning(_))));
    }

    #[tokio::test]
    async fn test_actuator_error_is_reported() {
        let config = DrivetrainConfig::two_module();
        let mut imu = SimulatedImu::new(0.0);
        imu.inject_fault("gyro offline");
        let mut drive_loop = DriveLoop::new(
            ScriptedTransport::new(["set_drive_base_center,0,0"]),
            config.kinematics().unwrap(),
            config.registry("main").unwrap(),
            simulated_modules(2, false).unwrap(),
            Box::new(imu),
            Tuning::default(),
        )
        .unwrap();

        let err = drive_loop.run().await.unwrap_err();
        assert!(matches!(err, DriveError::Actuator(_)));
        let diagnostic = HubMessage::parse(drive_loop.transport().output().trim_end()).unwrap();
        assert_eq!(diagnostic.payload["kind"], "actuator");
    }

    #[test]
    fn test_rear_hub_applies_its_own_modules() {
        let config = DrivetrainConfig::default();
        let mut drive_loop = DriveLoop::new(
            ScriptedTransport::default(),
            config.kinematics().unwrap(),
            config.registry("rear").unwrap(),
            simulated_modules(2, false).unwrap(),
            Box::new(SimulatedImu::default()),
            Tuning::default(),
        )
        .unwrap();

        drive_loop.on_command("drive,0,0,50".parse().unwrap()).unwrap();
        // Rear modules at (-1,-1) and (1,-1) point along 135° and 45°
        let angles = turning_angles(&mut drive_loop);
        assert!((angles[0] - -45.0).abs() < EPS, "{:?}", angles);
        assert!((angles[1] - 45.0).abs() < EPS, "{:?}", angles);
    }
}
