use crate::network::filter::FilterError;
use crate::network::types::{Layer, Param};
use thiserror::Error;

/// Raw OS error codes reported by the driver that map onto typed variants.
pub mod codes {
    /// `ERROR_ACCESS_DENIED`, returned when the caller lacks administrator rights.
    pub const ERROR_ACCESS_DENIED: u32 = 5;
    /// `ERROR_INVALID_HANDLE`
    pub const ERROR_INVALID_HANDLE: u32 = 6;
    /// `ERROR_INVALID_PARAMETER`
    pub const ERROR_INVALID_PARAMETER: u32 = 87;
    /// `ERROR_INSUFFICIENT_BUFFER`
    pub const ERROR_INSUFFICIENT_BUFFER: u32 = 122;
    /// `ERROR_NO_DATA`, returned once a handle has been shut down and drained.
    pub const ERROR_NO_DATA: u32 = 232;
    /// `ERROR_OPERATION_ABORTED`
    pub const ERROR_OPERATION_ABORTED: u32 = 995;
    /// `ERROR_IO_PENDING`
    pub const ERROR_IO_PENDING: u32 = 997;
    /// `ERROR_HOST_UNREACHABLE`, returned when an injected packet cannot be delivered.
    pub const ERROR_HOST_UNREACHABLE: u32 = 1232;
    /// `WSAEWOULDBLOCK`
    pub const WSAEWOULDBLOCK: u32 = 10035;
}

#[derive(Debug, Error)]
pub enum DivertError {
    /// Buffer too short or inconsistent for the header being decoded
    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    /// A batch operation was given a zero-capacity buffer
    #[error("Empty packet or address buffer")]
    EmptyBuffer,

    /// Packet and address slices passed to a batch send disagree in length
    #[error("Batch size mismatch: {packets} packets but {addresses} addresses")]
    CountMismatch { packets: usize, addresses: usize },

    /// A batch exceeded the driver's per-call maximum
    #[error("Batch of {0} events exceeds the driver maximum of 255")]
    BatchTooLarge(usize),

    /// No data is currently available on a non-blocking handle
    #[error("No data available")]
    WouldBlock,

    /// The handle was shut down or closed
    #[error("Handle is shut down")]
    Disconnected,

    /// The driver could not deliver a sent packet
    #[error("Host unreachable")]
    HostUnreachable,

    /// Any other driver failure, with the OS code preserved
    #[error("WinDivert error code {0}")]
    Driver(u32),

    /// An overlay or record was used with a layer it does not belong to
    #[error("Layer mismatch: expected {expected}, found {actual}")]
    LayerMismatch { expected: Layer, actual: Layer },

    /// The driver returned a record that failed validation
    #[error("Invalid address record at index {index}: {reason}")]
    InvalidRecord { index: usize, reason: String },

    /// A parameter value is outside its documented bounds or read-only
    #[error("Invalid value {value} for parameter {param}")]
    InvalidParam { param: Param, value: u64 },

    /// A handle configuration was rejected before reaching the driver
    #[error("Invalid handle configuration: {0}")]
    InvalidConfig(String),

    /// A filter expression failed validation
    #[error(transparent)]
    InvalidFilter(#[from] FilterError),

    /// The installed driver version is not supported
    #[error("Unsupported WinDivert version {major}.{minor}")]
    UnsupportedVersion { major: u64, minor: u64 },

    /// The operation is not available on this platform or backend
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    /// Error when a mutex/rwlock is poisoned
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    /// I/O errors from file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A settings file could not be parsed
    #[error("Failed to parse settings: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Settings could not be serialized
    #[error("Failed to serialize settings: {0}")]
    ConfigWrite(#[from] toml::ser::Error),
}

/// A convenient Result type alias using `DivertError`.
pub type Result<T> = std::result::Result<T, DivertError>;

impl DivertError {
    /// Creates a new lock poisoned error with a descriptive message.
    pub fn lock_poisoned(resource: &str) -> Self {
        Self::LockPoisoned(format!("Failed to acquire lock on {}", resource))
    }

    /// Creates a malformed packet error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedPacket(reason.into())
    }

    /// Maps a raw OS error code reported by the driver onto the error taxonomy.
    pub fn from_os_code(code: u32) -> Self {
        match code {
            codes::ERROR_NO_DATA
            | codes::ERROR_INVALID_HANDLE
            | codes::ERROR_OPERATION_ABORTED => Self::Disconnected,
            codes::ERROR_HOST_UNREACHABLE => Self::HostUnreachable,
            codes::WSAEWOULDBLOCK | codes::ERROR_IO_PENDING => Self::WouldBlock,
            other => Self::Driver(other),
        }
    }

    /// Returns true if the handle that produced this error can no longer be used.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

/// Convert `DivertError` to a String for command-line reporting.
impl From<DivertError> for String {
    fn from(error: DivertError) -> Self {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_codes_map_to_typed_errors() {
        assert!(matches!(
            DivertError::from_os_code(codes::ERROR_NO_DATA),
            DivertError::Disconnected
        ));
        assert!(matches!(
            DivertError::from_os_code(codes::ERROR_HOST_UNREACHABLE),
            DivertError::HostUnreachable
        ));
        assert!(matches!(
            DivertError::from_os_code(codes::WSAEWOULDBLOCK),
            DivertError::WouldBlock
        ));
    }

    #[test]
    fn test_unknown_code_is_preserved() {
        match DivertError::from_os_code(5) {
            DivertError::Driver(code) => assert_eq!(code, 5),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_terminal_errors() {
        assert!(DivertError::Disconnected.is_terminal());
        assert!(!DivertError::WouldBlock.is_terminal());
        assert!(!DivertError::HostUnreachable.is_terminal());
    }
}
