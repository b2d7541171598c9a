use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use swerve_hub_runtime::config::{
    DEFAULT_BAUDRATE, DEFAULT_SERIAL_PORT, DrivetrainConfig, PidGains, ZENOH_KEY_PREFIX,
};
use swerve_hub_runtime::controller::{ControllerError, KeyboardController, ScriptedController};
use swerve_hub_runtime::motor::{Motor, SimulatedImu, SimulatedMotor};
use swerve_hub_runtime::runtime::{
    DriveError, DriveLoop, PeerLoop, PeerRole, TeleopLoop, simulated_modules,
};
use swerve_hub_runtime::steering::SteeringMode;
use swerve_hub_runtime::transport::{
    LineTransport, SerialTransport, StdioTransport, ZenohTransport,
};

#[derive(Parser)]
#[command(name = "swerve-hub", about = "Swerve drive hub runtime")]
struct Cli {
    /// Drivetrain layout as JSON (built-in four-module layout when absent)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Simulate motors that travel at their commanded speed instead of arriving instantly
    #[arg(long, global = true)]
    slewing: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve swerve drive commands for one hub
    Drive {
        /// Hub name from the drivetrain config
        #[arg(long)]
        hub: String,

        /// Smooth drive commands with the setpoint filter
        #[arg(long)]
        smooth: bool,

        #[command(flatten)]
        link: LinkArgs,
    },
    /// Serve plain per-motor values
    Peer {
        #[arg(long, value_enum)]
        role: PeerRole,

        #[arg(long, default_value_t = 4)]
        motors: usize,

        #[command(flatten)]
        link: LinkArgs,
    },
    /// Drive from the keyboard with the hub-local steering modes
    Teleop {
        #[arg(long, value_enum, default_value_t = ModeArg::Ackermann)]
        mode: ModeArg,

        /// Replay a scripted left-stick demo instead of reading the keyboard
        #[arg(long, value_enum)]
        demo: Option<Demo>,
    },
}

#[derive(Args)]
struct LinkArgs {
    #[arg(long, value_enum, default_value_t = TransportKind::Stdio)]
    transport: TransportKind,

    #[arg(long, default_value = DEFAULT_SERIAL_PORT)]
    port: String,

    #[arg(long, default_value_t = DEFAULT_BAUDRATE)]
    baud: u32,

    #[arg(long, default_value = ZENOH_KEY_PREFIX)]
    key_prefix: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TransportKind {
    Stdio,
    Serial,
    Zenoh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Ackermann,
    Tank,
    Crab,
    Swerve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Demo {
    StraightLine,
    ZigZag,
}

impl From<ModeArg> for SteeringMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Ackermann => SteeringMode::Ackermann,
            ModeArg::Tank => SteeringMode::Tank,
            ModeArg::Crab => SteeringMode::crab(),
            ModeArg::Swerve => SteeringMode::Swerve,
        }
    }
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug); stdout is left to the protocol
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), DriveError> {
    let mut config = match &cli.config {
        Some(path) => DrivetrainConfig::load(path)?,
        None => DrivetrainConfig::default(),
    };

    match cli.command {
        Command::Drive { hub, smooth, link } => {
            if smooth && config.tuning.setpoint_filter.is_none() {
                config.tuning.setpoint_filter = Some(PidGains::default());
            }
            match link.transport {
                TransportKind::Stdio => {
                    serve_drive(StdioTransport::new(), &config, &hub, cli.slewing).await
                }
                TransportKind::Serial => {
                    let transport = SerialTransport::open(&link.port, link.baud)?;
                    serve_drive(transport, &config, &hub, cli.slewing).await
                }
                TransportKind::Zenoh => {
                    let transport = ZenohTransport::open(&link.key_prefix, &hub).await?;
                    serve_drive(transport, &config, &hub, cli.slewing).await
                }
            }
        }
        Command::Peer { role, motors, link } => {
            let name = match role {
                PeerRole::Drive => "drive",
                PeerRole::Steer => "steer",
            };
            match link.transport {
                TransportKind::Stdio => {
                    serve_peer(StdioTransport::new(), role, motors, cli.slewing).await
                }
                TransportKind::Serial => {
                    let transport = SerialTransport::open(&link.port, link.baud)?;
                    serve_peer(transport, role, motors, cli.slewing).await
                }
                TransportKind::Zenoh => {
                    let transport = ZenohTransport::open(&link.key_prefix, name).await?;
                    serve_peer(transport, role, motors, cli.slewing).await
                }
            }
        }
        Command::Teleop { mode, demo } => {
            let kinematics = config.kinematics()?;
            let modules = simulated_modules(config.modules.len(), cli.slewing)?;
            let imu = Box::new(SimulatedImu::default());

            if let Some(demo) = demo {
                let controller = match demo {
                    Demo::StraightLine => ScriptedController::straight_line(),
                    Demo::ZigZag => ScriptedController::zig_zag(),
                };
                info!("Playing {:?} demo", demo);
                let mut teleop = TeleopLoop::new(
                    controller,
                    kinematics,
                    modules,
                    imu,
                    config.tuning,
                    mode.into(),
                )?;
                return teleop.run().await;
            }

            let mut teleop = TeleopLoop::new(
                KeyboardController::new(),
                kinematics,
                modules,
                imu,
                config.tuning,
                mode.into(),
            )?;

            info!(
                "Controls: WASD=left stick, IJKL=right stick, Q/E=triggers, \
                 1-4=modes, space=brake, Esc=quit"
            );
            enable_raw_mode().map_err(ControllerError::from)?;
            let result = teleop.run().await;
            if let Err(e) = disable_raw_mode() {
                warn!("Failed to restore terminal: {}", e);
            }
            result
        }
    }
}

async fn serve_drive<T: LineTransport>(
    transport: T,
    config: &DrivetrainConfig,
    hub: &str,
    slewing: bool,
) -> Result<(), DriveError> {
    let registry = config.registry(hub)?;
    let modules = simulated_modules(registry.len(), slewing)?;
    let mut drive_loop = DriveLoop::new(
        transport,
        config.kinematics()?,
        registry,
        modules,
        Box::new(SimulatedImu::default()),
        config.tuning.clone(),
    )?;
    drive_loop.run().await
}

async fn serve_peer<T: LineTransport>(
    transport: T,
    role: PeerRole,
    count: usize,
    slewing: bool,
) -> Result<(), DriveError> {
    let motors = (0..count)
        .map(|i| {
            let name = format!("{:?}{}", role, i).to_lowercase();
            let motor = if slewing {
                SimulatedMotor::slewing(name)
            } else {
                SimulatedMotor::new(name)
            };
            Box::new(motor) as Box<dyn Motor>
        })
        .collect();
    let mut peer = PeerLoop::new(transport, role, motors)?;
    peer.run().await
}
