// Peer hub loop: one plain value per motor, no kinematics
//
// Drive peers run each motor at a percentage speed. Steer peers turn each motor
// to an absolute angle along the shortest path.

use tracing::{debug, error, info, warn};

use super::DriveError;
use crate::messages::{PEER_ACK, parse_peer_values};
use crate::motor::driver::{
    DRIVE_ACCELERATION, Motor, Result as ActuatorResult, TURNING_ACCELERATION, percentage_to_speed,
};
use crate::motor::vector::wrap_180;
use crate::transport::LineTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PeerRole {
    /// Values are percentage speeds
    Drive,
    /// Values are steering angles in degrees
    Steer,
}

impl PeerRole {
    fn acceleration(&self) -> f64 {
        match self {
            PeerRole::Drive => DRIVE_ACCELERATION,
            PeerRole::Steer => TURNING_ACCELERATION,
        }
    }
}

pub struct PeerLoop<T> {
    transport: T,
    role: PeerRole,
    motors: Vec<Box<dyn Motor>>,
}

impl<T: LineTransport> PeerLoop<T> {
    pub fn new(
        transport: T,
        role: PeerRole,
        mut motors: Vec<Box<dyn Motor>>,
    ) -> Result<Self, DriveError> {
        for motor in motors.iter_mut() {
            motor.set_acceleration(role.acceleration())?;
        }
        Ok(Self {
            transport,
            role,
            motors,
        })
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn motors_mut(&mut self) -> &mut [Box<dyn Motor>] {
        &mut self.motors
    }

    /// Serve lines until the stream closes or a line fails
    ///
    /// A failure is written back as its message and returned after teardown.
    pub async fn run(&mut self) -> Result<(), DriveError> {
        info!("{:?} peer started with {} motors", self.role, self.motors.len());

        let result = self.serve().await;
        if let Err(e) = &result {
            if !matches!(e, DriveError::Transport(_)) {
                error!("Peer loop failed: {}", e);
                if let Err(write_err) = self.transport.write_frame(&e.to_string()).await {
                    warn!("Failed to report error: {}", write_err);
                }
            }
        }

        self.teardown();

        match result {
            Err(DriveError::Transport(e)) => {
                info!("Transport ended: {}", e);
                Ok(())
            }
            other => other,
        }
    }

    async fn serve(&mut self) -> Result<(), DriveError> {
        while let Some(line) = self.transport.read_line().await? {
            self.on_line(&line)?;
            self.transport.write_frame(PEER_ACK).await?;
        }
        info!("Peer stream closed");
        Ok(())
    }

    /// Apply one line of per-motor values
    pub fn on_line(&mut self, line: &str) -> Result<(), DriveError> {
        let values = parse_peer_values(line, self.motors.len())?;
        debug!("Peer values: {:?}", values);

        for (motor, value) in self.motors.iter_mut().zip(values) {
            match self.role {
                PeerRole::Drive => motor.run(percentage_to_speed(value as f64))?,
                PeerRole::Steer => steer_shortest(motor.as_mut(), value as f64)?,
            }
        }
        Ok(())
    }

    fn teardown(&mut self) {
        for (i, motor) in self.motors.iter_mut().enumerate() {
            let result = match self.role {
                PeerRole::Drive => motor.stop(),
                PeerRole::Steer => steer_shortest(motor.as_mut(), 0.0),
            };
            if let Err(e) = result {
                warn!("Failed to tear down motor {}: {}", i, e);
            }
        }
    }
}

/// Turn to `target` (mod 360) by at most half a revolution
fn steer_shortest(motor: &mut dyn Motor, target: f64) -> ActuatorResult<()> {
    let current = motor.angle()?;
    let target = current + wrap_180(target - current);
    motor.run_target(target, percentage_to_speed(100.0))
}
