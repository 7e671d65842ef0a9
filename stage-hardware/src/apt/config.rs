//! Link and controller configuration.

use std::time::Duration;

use clap::Args;
use serde::{Deserialize, Serialize};

use super::controller::MotionController;
use super::error::StageResult;
use super::link::LinkTransport;
use super::sim::SimulatedController;

/// Default serial baud rate of the controller.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default pause after each command for controller turnaround.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(50);

/// Default time to wait for a response frame.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Default quiet time that ends a received burst on the serial line.
pub const DEFAULT_BURST_GAP: Duration = Duration::from_millis(5);

/// Default number of retransmissions allowed per command.
pub const DEFAULT_MAX_RETRANSMITS: u32 = 3;

/// Serde helpers storing a [`Duration`] as integer milliseconds.
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Timing and retry behaviour of [`MotionController`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Pause after every command and between successive axis commands
    #[serde(rename = "settle_delay_ms", with = "duration_ms")]
    pub settle_delay: Duration,
    /// Maximum wait for a response frame
    #[serde(rename = "response_timeout_ms", with = "duration_ms")]
    pub response_timeout: Duration,
    /// Pause between status polling rounds while waiting for motion to settle
    #[serde(rename = "poll_interval_ms", with = "duration_ms")]
    pub poll_interval: Duration,
    /// Retransmissions allowed per command after truncated responses
    pub max_retransmits: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            poll_interval: Duration::ZERO,
            max_retransmits: DEFAULT_MAX_RETRANSMITS,
        }
    }
}

impl ControllerConfig {
    /// No pauses; used with the in-process simulator.
    pub fn immediate() -> Self {
        Self {
            settle_delay: Duration::ZERO,
            poll_interval: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Serial link parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Serial port name (e.g. `/dev/ttyUSB0`)
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Quiet time that ends a received burst
    #[serde(rename = "burst_gap_ms", with = "duration_ms", default = "default_burst_gap")]
    pub burst_gap: Duration,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_burst_gap() -> Duration {
    DEFAULT_BURST_GAP
}

impl LinkConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            burst_gap: DEFAULT_BURST_GAP,
        }
    }
}

/// Command-line arguments for the stage connection.
///
/// Use with `#[command(flatten)]` in your CLI args struct.
#[derive(Args, Debug, Clone)]
pub struct StageArgs {
    /// Serial port of the stage controller.
    #[arg(
        long,
        default_value = "/dev/ttyUSB0",
        help = "Serial port of the stage controller",
        long_help = "Serial port name of the four-axis stage controller. The link runs at \
            115200 baud, 8N1, no flow control unless --baud is given."
    )]
    pub port: String,

    /// Serial baud rate.
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,

    /// Pause after each command in milliseconds.
    #[arg(long, default_value_t = 50)]
    pub settle_ms: u64,

    /// Response timeout in milliseconds.
    #[arg(long, default_value_t = 1000)]
    pub response_timeout_ms: u64,

    /// Retransmissions allowed per command after truncated responses.
    #[arg(long, default_value_t = DEFAULT_MAX_RETRANSMITS)]
    pub max_retransmits: u32,

    /// Drive an in-process simulated controller instead of the serial port.
    #[arg(long)]
    pub simulate: bool,
}

impl StageArgs {
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            baud_rate: self.baud,
            ..LinkConfig::new(&self.port)
        }
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            settle_delay: Duration::from_millis(self.settle_ms),
            response_timeout: Duration::from_millis(self.response_timeout_ms),
            max_retransmits: self.max_retransmits,
            ..ControllerConfig::default()
        }
    }

    /// Open the configured link and build a controller on it.
    pub fn connect(&self) -> StageResult<MotionController<Box<dyn LinkTransport>>> {
        let link: Box<dyn LinkTransport> = if self.simulate {
            Box::new(SimulatedController::new())
        } else {
            self.open_serial()?
        };
        Ok(MotionController::new(link, self.controller_config()))
    }

    #[cfg(feature = "serial")]
    fn open_serial(&self) -> StageResult<Box<dyn LinkTransport>> {
        Ok(Box::new(super::link::SerialLink::open(&self.link_config())?))
    }

    #[cfg(not(feature = "serial"))]
    fn open_serial(&self) -> StageResult<Box<dyn LinkTransport>> {
        Err(super::error::StageError::Unsupported(format!(
            "serial support not compiled in, cannot open {}",
            self.port
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        stage: StageArgs,
    }

    #[test]
    fn test_default_controller_config() {
        let config = ControllerConfig::default();
        assert_eq!(config.settle_delay, Duration::from_millis(50));
        assert_eq!(config.response_timeout, Duration::from_secs(1));
        assert_eq!(config.max_retransmits, 3);
    }

    #[test]
    fn test_controller_config_json_uses_milliseconds() {
        let config: ControllerConfig =
            serde_json::from_str(r#"{"settle_delay_ms": 20, "max_retransmits": 1}"#).unwrap();
        assert_eq!(config.settle_delay, Duration::from_millis(20));
        assert_eq!(config.max_retransmits, 1);
        assert_eq!(config.response_timeout, DEFAULT_RESPONSE_TIMEOUT);

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["settle_delay_ms"], 20);
        assert_eq!(json["response_timeout_ms"], 1000);
    }

    #[test]
    fn test_link_config_defaults() {
        let link: LinkConfig = serde_json::from_str(r#"{"port": "/dev/ttyS3"}"#).unwrap();
        assert_eq!(link, LinkConfig::new("/dev/ttyS3"));
        assert_eq!(link.baud_rate, 115_200);
    }

    #[test]
    fn test_stage_args() {
        let cli = TestCli::parse_from(["test", "--port", "/dev/ttyUSB3", "--settle-ms", "10"]);
        assert_eq!(cli.stage.link_config().port, "/dev/ttyUSB3");
        assert_eq!(cli.stage.link_config().baud_rate, 115_200);
        assert_eq!(
            cli.stage.controller_config().settle_delay,
            Duration::from_millis(10)
        );
        assert!(!cli.stage.simulate);
    }

    #[test]
    fn test_simulated_connect() {
        let cli = TestCli::parse_from(["test", "--simulate"]);
        let mut stage = cli.stage.connect().unwrap();
        assert_eq!(stage.get_position(&[]).unwrap().len(), 4);
    }

    #[cfg(not(feature = "serial"))]
    #[test]
    fn test_serial_connect_unsupported_without_feature() {
        let cli = TestCli::parse_from(["test", "--port", "/dev/ttyUSB0"]);
        match cli.stage.connect() {
            Err(crate::apt::StageError::Unsupported(msg)) => assert!(msg.contains("/dev/ttyUSB0")),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("serial link opened without serial support"),
        }
    }
}
