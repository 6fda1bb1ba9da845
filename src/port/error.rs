//! Port-specific error types.
//!
//! Defines the error taxonomy for serial port operations, separate from the
//! CLI-level errors in `crate::error`.

use super::settings::Parity;
use std::io;
use thiserror::Error;

/// Errors that can occur during serial port operations.
///
/// A transfer that times out is not an error: `read` and `write` return the
/// number of bytes moved before the deadline.
#[derive(Debug, Error)]
pub enum PortError {
    /// A configuration value or the port path is malformed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Attempted to use a port that's not open.
    #[error("Port is not open")]
    PortNotOpen,

    /// Attempted to open a port that's already open.
    #[error("Port is already open")]
    AlreadyOpen,

    /// The process or the system ran out of file descriptors.
    #[error("Too many file handles open")]
    TooManyHandles,

    /// An OS-level call failed.
    #[error("{context} failed: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    /// The descriptor reported readiness but the transfer moved no data.
    #[error("Device reports readiness but transferred no data (device disconnected?)")]
    DeviceDisconnected,

    /// The baud rate is neither a standard rate nor settable through a custom speed.
    #[error("Baud rate {0} is not supported on this platform")]
    UnsupportedBaudRate(u32),

    /// Mark and space parity need a platform extension flag.
    #[error("{0} parity is not supported on this platform")]
    UnsupportedParity(Parity),

    /// An internal invariant was violated (over-read or over-write).
    #[error("Logic error: {0}")]
    LogicError(String),
}

/// Result type for serial port operations.
pub type PortResult<T> = Result<T, PortError>;

impl PortError {
    /// Create an InvalidArgument error from a message.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Wrap an OS error with the name of the call that produced it.
    pub fn io(context: &'static str, source: io::Error) -> Self {
        Self::Io { context, source }
    }

    /// Wrap the calling thread's current `errno`.
    pub fn last_os_error(context: &'static str) -> Self {
        Self::io(context, io::Error::last_os_error())
    }

    /// The raw OS error code, if this error carries one.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            Self::Io { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}
