//! Serial Line Library
//!
//! A synchronous serial-port transport for POSIX systems: open a terminal
//! device, configure it in raw mode, and move bytes under a
//! `constant + multiplier * n` timeout policy.
//!
//! # Modules
//!
//! - `port`: the port handle, line settings, timeouts and the loopback transport
//! - `config`: TOML configuration for the `serial-line` tool
//! - `error`: application-level error type

#[cfg(not(unix))]
compile_error!("serial-line only supports POSIX platforms");

pub mod config;
pub mod error;
pub mod port;

pub use error::{AppError, AppResult};
pub use port::{
    ByteSize, FlowControl, LineSettings, LoopbackPort, ModemStatus, Parity, PortError, PortResult,
    SerialPort, SerialTransport, StopBits, Timeout,
};

pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
