//! Application-level error type for the `serial-line` tool.

use crate::config::ConfigError;
use crate::port::PortError;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Unified application error type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Port(#[from] PortError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Device enumeration failed.
    #[error("Failed to enumerate serial ports: {0}")]
    Enumerate(#[from] serialport::Error),

    /// Command-line input that is not a port setting, e.g. malformed hex.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Loopback echo returned different bytes than were sent.
    #[error("Echo test failed: {matched} of {sent} bytes echoed back intact")]
    EchoMismatch { sent: usize, matched: usize },

    #[error("An I/O error occurred: {0}")]
    Io(#[from] std::io::Error),

    #[error("A serialization error occurred: {0}")]
    Serde(#[from] serde_json::Error),
}

impl AppError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidInput(_) | Self::Config(_) => 2,
            Self::Port(PortError::InvalidArgument(_)) => 2,
            Self::Port(PortError::DeviceDisconnected) => 3,
            Self::EchoMismatch { .. } => 4,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_error_passes_through() {
        let err: AppError = PortError::PortNotOpen.into();
        assert_eq!(err.to_string(), "Port is not open");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(AppError::InvalidInput("zz".into()).exit_code(), 2);
        assert_eq!(AppError::from(PortError::DeviceDisconnected).exit_code(), 3);
        let config = ConfigError::validation("serial.byte_size", "9 is not in 5..=8");
        assert_eq!(AppError::from(config).exit_code(), 2);
    }
}
