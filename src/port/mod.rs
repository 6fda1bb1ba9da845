//! Serial port layer.
//!
//! `SerialPort` drives a POSIX terminal device through termios; `LoopbackPort`
//! is an in-memory stand-in. Both implement [`SerialTransport`].

pub mod engine;
pub mod error;
pub mod mock;
pub mod settings;
mod sys;
pub mod sync_port;
pub mod termios;
pub mod timeout;
pub mod traits;

pub use error::{PortError, PortResult};
pub use mock::LoopbackPort;
pub use settings::{ByteSize, FlowControl, LineSettings, Parity, StopBits};
pub use sync_port::{ModemStatus, SerialPort, DEFAULT_MODEM_POLL_INTERVAL};
pub use termios::{Capabilities, CustomBaud};
pub use timeout::{total_timeout_ms, Deadline, Timeout};
pub use traits::SerialTransport;
