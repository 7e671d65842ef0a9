use std::time::Duration;

use thiserror::Error;

/// Errors produced while decoding frames from the controller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Fewer bytes than the header declares.
    ///
    /// Not fatal: the controller retransmits the last command and reads again.
    #[error("Truncated frame: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    /// Channel ident outside the four stage axes.
    #[error("Invalid channel ident: {0}")]
    InvalidAxis(u16),

    /// Encoder counter frames omit the axis; one arrived with no query outstanding.
    #[error("Encoder counter received with no outstanding axis query")]
    UnattributedCounter,
}

/// Errors that can occur while driving the stage.
#[derive(Error, Debug)]
pub enum StageError {
    /// Low-level I/O error on the link.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to open or configure the serial port.
    #[cfg(feature = "serial")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Frame could not be decoded.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// No response (or no settled state) within the allowed time.
    #[error("Timeout after {waited:?} waiting for {operation}")]
    Timeout { operation: String, waited: Duration },

    /// Repeated truncated responses exhausted the retransmit budget.
    #[error("Gave up on opcode 0x{opcode:04X} after {attempts} retransmissions")]
    RetryExhausted { opcode: u16, attempts: u32 },

    /// Retransmission requested before any command was sent.
    #[error("No command has been sent yet")]
    NoCommand,

    /// A response event arrived but its content was not in the store.
    #[error("Response to {0} carried no data")]
    MissingResponse(String),

    /// The operation needs a feature this build does not include.
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

/// Result type for stage operations.
pub type StageResult<T> = Result<T, StageError>;
