//! Command-line control of the four-axis alignment stage.
//!
//! Subcommands:
//! - `info`: Identify the controller
//! - `query`: Read positions and status
//! - `move`: Absolute move of one axis
//! - `wait`: Wait until all axes stop moving
//! - `home`: Home one axis
//! - `stop`: Stop one or all axes

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use stage_hardware::apt::{AxisId, LinkTransport, MotionController, StageArgs, StopMode};
use strum::IntoEnumIterator;
use tracing::info;

/// Four-axis stage control tool
#[derive(Parser, Debug)]
#[command(name = "stage_tool")]
#[command(about = "Control tool for the four-axis alignment stage")]
#[command(version)]
struct Args {
    #[command(flatten)]
    stage: StageArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Query controller identification
    Info,

    /// Query current positions and status
    Query {
        /// Specific axis to query (queries all if not specified)
        #[arg(short, long)]
        axis: Option<AxisId>,
    },

    /// Move one axis to an absolute position
    Move {
        /// Axis to move (rotary, x, y or z)
        #[arg(short, long)]
        axis: AxisId,

        /// Target position (degrees for rotary, µm otherwise)
        #[arg(short, long, allow_hyphen_values = true)]
        position: f64,

        /// Timeout in seconds for motion to complete
        #[arg(short, long, default_value = "30")]
        timeout: u64,

        /// Don't wait for motion to complete
        #[arg(long)]
        no_wait: bool,
    },

    /// Wait for all axes to stop moving
    Wait {
        /// Timeout in seconds
        #[arg(short, long, default_value = "30")]
        timeout: u64,
    },

    /// Home one axis
    Home {
        #[arg(short, long)]
        axis: AxisId,
    },

    /// Stop motion
    Stop {
        /// Specific axis to stop (stops all if not specified)
        #[arg(short, long)]
        axis: Option<AxisId>,

        /// Stop abruptly instead of decelerating
        #[arg(long)]
        immediate: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    info!("Connecting to stage on {}...", args.stage.port);
    let mut stage = args.stage.connect()?;

    match args.command {
        Command::Info => cmd_info(&mut stage),
        Command::Query { axis } => cmd_query(&mut stage, axis),
        Command::Move {
            axis,
            position,
            timeout,
            no_wait,
        } => cmd_move(&mut stage, axis, position, timeout, no_wait),
        Command::Wait { timeout } => {
            stage.wait_for_settled(Duration::from_secs(timeout))?;
            println!("All axes settled");
            Ok(())
        }
        Command::Home { axis } => {
            stage.home(axis)?;
            println!("Homing {axis}");
            Ok(())
        }
        Command::Stop { axis, immediate } => {
            let mode = if immediate {
                StopMode::Immediate
            } else {
                StopMode::Profiled
            };
            let axes: Vec<AxisId> = axis.into_iter().collect();
            stage.stop(&axes, mode)?;
            println!("Stop sent ({mode:?})");
            Ok(())
        }
    }
}

fn cmd_info<L: LinkTransport>(stage: &mut MotionController<L>) -> Result<()> {
    let info = stage.hardware_info()?;

    println!("\n=== Controller ===");
    println!("  Model:            {}", info.model);
    println!("  Serial number:    {}", info.serial_number);
    println!("  Firmware:         {}", info.firmware);
    println!("  Hardware version: {}", info.hardware_version);
    println!("  Channels:         {}", info.num_channels);
    if !info.notes.is_empty() {
        println!("  Notes:            {}", info.notes);
    }

    if info.num_channels as usize != AxisId::ALL.len() {
        bail!(
            "Controller reports {} channels, expected {}",
            info.num_channels,
            AxisId::ALL.len()
        );
    }
    Ok(())
}

fn cmd_query<L: LinkTransport>(stage: &mut MotionController<L>, axis: Option<AxisId>) -> Result<()> {
    let axes: Vec<AxisId> = match axis {
        Some(axis) => vec![axis],
        None => AxisId::iter().collect(),
    };

    println!("\n=== Axis Status ===");
    println!(
        "{:<8} {:>14} {:>8} {:>7} {:>6}",
        "Axis", "Position", "Moving", "Limit", "Homed"
    );
    for axis in axes {
        let position = stage.get_position(&[axis])?[&axis];
        let status = stage.query_status(axis)?;
        println!(
            "{:<8} {:>10.4} {:<3} {:>8} {:>7} {:>6}",
            axis.to_string(),
            position,
            axis.unit(),
            status.moving,
            status.status.at_limit(),
            status.status.is_homed()
        );
    }
    Ok(())
}

fn cmd_move<L: LinkTransport>(
    stage: &mut MotionController<L>,
    axis: AxisId,
    position: f64,
    timeout: u64,
    no_wait: bool,
) -> Result<()> {
    if !position.is_finite() {
        bail!("Target position must be finite, got {position}");
    }

    stage.goto_position(&BTreeMap::from([(axis, position)]))?;
    println!("Moving {axis} to {position:.4} {}", axis.unit());

    if no_wait {
        return Ok(());
    }

    stage.wait_for_settled(Duration::from_secs(timeout))?;
    let actual = stage.get_position(&[axis])?[&axis];
    println!(
        "Settled at {actual:.4} {} (error {:+.4})",
        axis.unit(),
        actual - position
    );
    Ok(())
}
