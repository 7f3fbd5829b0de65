use crate::common::model::ThresholdTableKind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Unsupported protocol version {0}")]
    UnsupportedProtocolVersion(u16),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Device not found ({0})")]
    DeviceNotFound(String),

    #[error("Device names do not match in config ({config}) and runtime ({runtime}) databases")]
    DeviceIdentityMismatch { config: String, runtime: String },

    #[error("Cannot set threshold for digital device {0}")]
    NotAnalogDevice(String),

    #[error(
        "Invalid thresholds for device {device}, table {table}, integrator {integrator}, threshold {slot}\n{detail}"
    )]
    ThresholdOrderingViolation {
        device: String,
        table: ThresholdTableKind,
        integrator: u8,
        slot: u8,
        low: f64,
        high: f64,
        detail: String,
    },

    #[error("Control point cannot be reached: {0}")]
    ControlPointUnreachable(String),

    #[error("Tried to write to a read-only control point: {0}")]
    ControlPointReadOnly(String),

    #[error("Control point {point} reads back {actual}, expected {expected}")]
    VerificationMismatch {
        point: String,
        expected: f64,
        actual: f64,
    },

    #[error("Cannot find application with id {0}")]
    ApplicationNotFound(i32),

    #[error("Found no devices for application {0}, there are no analog channels defined")]
    ApplicationHasNoChannels(i32),

    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Worker task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Persistence(err.to_string())
    }
}

impl From<r2d2::Error> for Error {
    fn from(err: r2d2::Error) -> Self {
        Error::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Persistence(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Task(err.to_string())
    }
}
