//! Run one alignment scan and print the result as JSON.
//!
//! Measurements are read from stdin, one line per stop, as four
//! whitespace-separated numbers. The prompt for each stop goes to stderr so
//! stdout carries only the result.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use alignment_bench::scan::{MeasurementSource, ScanConfig, ScanOrchestrator, CHANNELS};
use anyhow::{Context, Result};
use clap::Parser;
use stage_hardware::apt::{AxisId, StageArgs};
use tracing::info;

/// Four-axis stage alignment scan
#[derive(Parser, Debug)]
#[command(name = "alignment_scan")]
#[command(about = "Sweep one stage axis and fit measurement slopes against position")]
#[command(version)]
struct Args {
    #[command(flatten)]
    stage: StageArgs,

    /// JSON scan configuration; flags below override its fields
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Axis to scan (rotary, x, y or z)
    #[arg(short, long)]
    axis: Option<AxisId>,

    /// First stop in physical units
    #[arg(long, allow_hyphen_values = true)]
    start: Option<f64>,

    /// Last stop in physical units
    #[arg(long, allow_hyphen_values = true)]
    end: Option<f64>,

    /// Number of stops including both ends
    #[arg(short = 'n', long)]
    stops: Option<usize>,

    /// Append a return sweep
    #[arg(long)]
    scan_back: bool,

    /// Start from the end nearest the current position
    #[arg(long)]
    start_nearest: bool,

    /// Settle timeout per stop in milliseconds
    #[arg(long)]
    settle_timeout_ms: Option<u64>,
}

impl Args {
    fn scan_config(&self) -> Result<ScanConfig> {
        let mut config = match &self.config {
            Some(path) => ScanConfig::load(path)
                .with_context(|| format!("loading scan config {}", path.display()))?,
            None => ScanConfig::default(),
        };

        if let Some(axis) = self.axis {
            config.axis = axis;
        }
        if let Some(start) = self.start {
            config.start = start;
        }
        if let Some(end) = self.end {
            config.end = end;
        }
        if let Some(stops) = self.stops {
            config.stop_count = stops;
        }
        if let Some(timeout) = self.settle_timeout_ms {
            config.settle_timeout_ms = timeout;
        }
        config.scan_back |= self.scan_back;
        config.start_nearest |= self.start_nearest;

        config.request().validate()?;
        Ok(config)
    }
}

/// Reads one measurement per line from stdin.
struct StdinMeasurements {
    lines: io::Lines<io::StdinLock<'static>>,
    taken: usize,
}

impl StdinMeasurements {
    fn new() -> Self {
        Self {
            lines: io::stdin().lock().lines(),
            taken: 0,
        }
    }
}

fn parse_measurement(line: &str) -> Result<[f64; CHANNELS], String> {
    let values = line
        .split_whitespace()
        .map(|field| {
            field
                .parse::<f64>()
                .map_err(|e| format!("invalid value {field:?}: {e}"))
        })
        .collect::<Result<Vec<f64>, String>>()?;

    <[f64; CHANNELS]>::try_from(values.as_slice())
        .map_err(|_| format!("expected {CHANNELS} values, got {}", values.len()))
}

impl MeasurementSource for StdinMeasurements {
    fn measure(&mut self) -> Result<[f64; CHANNELS], String> {
        self.taken += 1;
        eprint!("measurement {} (4 values): ", self.taken);
        let _ = io::stderr().flush();

        let line = self
            .lines
            .next()
            .ok_or_else(|| "stdin closed before scan finished".to_string())?
            .map_err(|e| e.to_string())?;
        parse_measurement(&line)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(io::stderr).init();

    let args = Args::parse();
    let config = args.scan_config()?;

    info!("Connecting to stage on {}...", args.stage.port);
    let stage = args.stage.connect()?;

    let mut scanner = ScanOrchestrator::new(stage, StdinMeasurements::new(), config.settle_timeout());
    let result = scanner.scan(&config.request())?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
