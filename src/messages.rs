// Wire formats of the inter-hub link
//
// Commands arrive one per line, comma-separated with no whitespace. Every
// accepted command is answered with one `ack` line carrying telemetry.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::motor::kinematics::{BodyVelocity, DriveCenter};
use crate::motor::module::ModuleTelemetry;

/// Malformed command line
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command '{0}'")]
    UnknownVerb(String),

    #[error("'{verb}' expects {expected} arguments, got {got}")]
    ArgumentCount {
        verb: String,
        expected: usize,
        got: usize,
    },

    #[error("'{verb}': invalid number '{token}'")]
    InvalidNumber { verb: String, token: String },
}

/// Command from the upstream controller -> hub
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Drive(BodyVelocity),
    SetDriveBaseCenter(DriveCenter),
    ToggleFieldCentric,
    Exit,
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ParseError::Empty);
        }

        let mut tokens = line.split(',');
        let verb = tokens.next().unwrap_or_default();
        let args: Vec<&str> = tokens.collect();

        match verb {
            "drive" => {
                let [vx, vy, omega] = numbers::<f64, 3>(verb, &args)?;
                Ok(Command::Drive(BodyVelocity::new(vx, vy, omega)))
            }
            // Note the argument order: y first
            "set_drive_base_center" => {
                let [cy, cx] = numbers::<i32, 2>(verb, &args)?;
                Ok(Command::SetDriveBaseCenter(DriveCenter::new(cx as f64, cy as f64)))
            }
            "toggle_field_centric" => {
                numbers::<f64, 0>(verb, &args)?;
                Ok(Command::ToggleFieldCentric)
            }
            "exit" => {
                numbers::<f64, 0>(verb, &args)?;
                Ok(Command::Exit)
            }
            other => Err(ParseError::UnknownVerb(other.to_string())),
        }
    }
}

fn numbers<T: FromStr, const N: usize>(verb: &str, args: &[&str]) -> Result<[T; N], ParseError> {
    if args.len() != N {
        return Err(ParseError::ArgumentCount {
            verb: verb.to_string(),
            expected: N,
            got: args.len(),
        });
    }

    let mut parsed = Vec::with_capacity(N);
    for token in args {
        let value = token.parse::<T>().map_err(|_| ParseError::InvalidNumber {
            verb: verb.to_string(),
            token: token.to_string(),
        })?;
        parsed.push(value);
    }

    parsed.try_into().map_err(|_| ParseError::ArgumentCount {
        verb: verb.to_string(),
        expected: N,
        got: args.len(),
    })
}

/// Acknowledgment with telemetry: heading, then angle, turn speed and drive
/// speed of every module owned by the hub
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ack {
    pub heading: f64,
    pub modules: Vec<ModuleTelemetry>,
}

impl fmt::Display for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Adding 0.0 turns -0.0 into 0.0 so idle telemetry never prints "-0.00"
        write!(f, "ack,{:.2}", self.heading + 0.0)?;
        for module in &self.modules {
            write!(
                f,
                ",{:.2},{:.2},{:.2}",
                module.angle + 0.0,
                module.turn_speed + 0.0,
                module.drive_speed + 0.0
            )?;
        }
        Ok(())
    }
}

/// Literal acknowledgment of the peer protocol, sent without a newline
pub const PEER_ACK: &str = "ack";

/// Parse a peer line: one integer per motor, in wiring order
pub fn parse_peer_values(line: &str, motor_count: usize) -> Result<Vec<i32>, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ParseError::Empty);
    }

    let tokens: Vec<&str> = line.split(',').collect();
    if tokens.len() != motor_count {
        return Err(ParseError::ArgumentCount {
            verb: "peer".to_string(),
            expected: motor_count,
            got: tokens.len(),
        });
    }

    tokens
        .iter()
        .map(|token| {
            token.parse::<i32>().map_err(|_| ParseError::InvalidNumber {
                verb: "peer".to_string(),
                token: token.to_string(),
            })
        })
        .collect()
}

/// JSON message emitted by a hub outside the ack stream (diagnostics, debug)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: serde_json::Value,
}

impl HubMessage {
    pub fn error(kind: &str, message: impl fmt::Display) -> Self {
        Self {
            kind: "error".to_string(),
            payload: serde_json::json!({ "kind": kind, "message": message.to_string() }),
        }
    }

    pub fn parse(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }
}

impl fmt::Display for HubMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}
