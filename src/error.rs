use std::time::Duration;

use derive_more::From;
use thiserror::Error;

use crate::dfu::DfuError;
use crate::handlers::{FrameCodecError, OpcodeTableError, ValidationError};
use crate::hw::PeripheralId;
use crate::protocol::CharacteristicRole;

/// Failure reported by a BLE adapter for one operation.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
#[error("{reason}")]
pub struct AdapterFault {
    reason: String,
}

impl AdapterFault {
    /// Creates a fault from the adapter's reason text.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Returns the adapter's reason text.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl From<btleplug::Error> for AdapterFault {
    fn from(error: btleplug::Error) -> Self {
        Self::new(error.to_string())
    }
}

/// Errors surfaced by device sessions.
///
/// None of these are fatal to the host process: the affected operation is
/// abandoned and the session keeps running unless it was torn down.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum SessionError {
    /// The characteristic needed by the operation has not been bound yet.
    #[error("session is not ready: no `{role}` characteristic is bound")]
    NotReady { role: CharacteristicRole },
    /// No usable session or command characteristic exists for the peripheral.
    #[error("peripheral `{peripheral}` has no bound command characteristic")]
    NotBound { peripheral: PeripheralId },
    /// Service, characteristic or descriptor discovery failed.
    #[error("discovery failed: {reason}")]
    DiscoveryFailed { reason: String },
    /// A write or notification toggle was rejected.
    #[error("write to `{characteristic}` failed: {reason}")]
    WriteFailed {
        characteristic: String,
        reason: AdapterFault,
    },
    /// A characteristic read was rejected.
    #[error("read from `{characteristic}` failed: {reason}")]
    ReadFailed {
        characteristic: String,
        reason: AdapterFault,
    },
    /// The peripheral disconnected and the session was invalidated.
    #[error("peripheral disconnected")]
    Disconnected,
    /// Firmware updates run on a Tokio task and no runtime is active.
    #[error("firmware update requires a running Tokio runtime")]
    NoRuntime,
    #[error(transparent)]
    Codec(#[from] FrameCodecError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The adapter rejected a command before executing it.
    #[error("BLE adapter rejected the command: {0}")]
    Adapter(#[from] AdapterFault),
}

/// Errors returned by BLE interaction and session driving.
#[derive(Debug, Error)]
pub enum InteractionError {
    #[error("BLE operation failed")]
    Ble(#[from] btleplug::Error),
    #[error("no BLE adapters were found")]
    NoAdapters,
    #[error("no peripheral matching `{prefix}*` was discovered")]
    NoMatchingDevice { prefix: String },
    #[error("timed out after {} while waiting to {operation}", humantime::format_duration(*after))]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
    #[error("adapter event stream closed")]
    EventStreamClosed,
    #[error("operation was cancelled")]
    Cancelled,
    #[error("failed while waiting for Ctrl+C")]
    CtrlC { source: std::io::Error },
    #[error("the peripheral did not enable microphone notifications")]
    MicrophoneUnavailable,
    #[error("failed to write audio capture `{path}`")]
    CaptureWrite {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Fixture(#[from] FixtureError),
}

/// Errors returned when parsing fake backend fixtures.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("the fake discovery fixture is empty")]
    EmptyFixture,
    #[error("fixture records must contain four pipe-delimited fields")]
    InvalidRecordFieldCount,
    #[error("fixture records cannot contain an empty peripheral id")]
    EmptyRecordField,
    #[error("failed to parse RSSI value")]
    InvalidRssi(#[from] std::num::ParseIntError),
    #[error("fixture payload is not valid hexadecimal")]
    InvalidHex(#[from] hex::FromHexError),
}

/// Errors returned when validating runtime backend options.
#[derive(Debug, Error)]
pub(crate) enum CliConfigError {
    #[error("missing fake scan fixture while fake mode is enabled")]
    MissingFakeScanFixture,
    #[error("failed to read opcode table `{path}`")]
    OpcodeTableIo {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    OpcodeTable(#[from] OpcodeTableError),
}

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Top-level protocol errors wrapping module-specific error types.
#[derive(Debug, Error, From)]
pub enum ProtocolError {
    #[error(transparent)]
    #[from(FrameCodecError, Box<FrameCodecError>)]
    FrameCodec(Box<FrameCodecError>),
    #[error(transparent)]
    #[from(ValidationError, Box<ValidationError>)]
    Validation(Box<ValidationError>),
    #[error(transparent)]
    #[from(OpcodeTableError, Box<OpcodeTableError>)]
    OpcodeTable(Box<OpcodeTableError>),
    #[error(transparent)]
    #[from(SessionError, Box<SessionError>)]
    Session(Box<SessionError>),
    #[error(transparent)]
    #[from(DfuError, Box<DfuError>)]
    Dfu(Box<DfuError>),
    #[error(transparent)]
    #[from(InteractionError, Box<InteractionError>)]
    Interaction(Box<InteractionError>),
}
