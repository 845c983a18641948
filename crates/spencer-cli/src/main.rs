//! Spencer operator console.
//!
//! Usage:
//!   # Drive the robot: type commands on stdin, one per line
//!   cargo run -p spencer-cli -- drive
//!   cargo run -p spencer-cli -- drive --host 127.0.0.1 --port 1050 --retries 5
//!
//!   # Stand-in robot for local testing
//!   cargo run -p spencer-cli -- mock-robot --bind 127.0.0.1:1050 --telemetry-interval-ms 500

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod drive;
mod mock;

/// Remote control for the Spencer stair-climbing robot.
#[derive(Parser, Debug)]
#[command(name = "spencer")]
#[command(about = "Remote control for the Spencer robot")]
struct Args {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Connect to the robot and send commands read from stdin
    Drive(DriveArgs),
    /// Run a stand-in robot that speaks the control protocol
    MockRobot(MockArgs),
}

#[derive(clap::Args, Debug)]
pub struct DriveArgs {
    /// Config file (RON). Defaults to ~/.config/spencer/client.ron if present
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Robot host (overrides config)
    #[arg(long)]
    pub host: Option<String>,

    /// Robot port (overrides config)
    #[arg(long)]
    pub port: Option<u16>,

    /// Number of sensor readings to keep on screen (overrides config)
    #[arg(long)]
    pub history: Option<usize>,

    /// Consecutive failed connects tolerated before giving up (overrides config)
    #[arg(long)]
    pub retries: Option<u32>,
}

#[derive(clap::Args, Debug)]
pub struct MockArgs {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:1050")]
    pub bind: SocketAddr,

    /// Stream sample sensor lines at this interval (0 = off)
    #[arg(long, default_value_t = 0)]
    pub telemetry_interval_ms: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let result = match args.command {
        Cmd::Drive(args) => drive::run(args).await,
        Cmd::MockRobot(args) => mock::run(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
