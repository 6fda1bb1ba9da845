//! Configuration for the `serial-line` tool.
//!
//! TOML file with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! 1. `SERIAL_LINE_CONFIG` environment variable (explicit path)
//! 2. `./serial-line.toml` (current directory)
//! 3. `serial-line.toml` in the platform config directory
//!    (`~/.config/serial-line/` on Linux)
//! 4. Built-in defaults
//!
//! # Environment Overrides
//!
//! - `SERIAL_LINE_SERIAL_PORT`
//! - `SERIAL_LINE_SERIAL_BAUD_RATE`
//! - `SERIAL_LINE_TIMEOUTS_READ_CONSTANT_MS`
//! - `SERIAL_LINE_TIMEOUTS_WRITE_CONSTANT_MS`
//! - `SERIAL_LINE_LOGGING_LEVEL`
//!
//! # Example
//!
//! ```rust,no_run
//! use serial_line::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! let settings = loader.config().serial.line_settings()?;
//! println!("{settings}");
//! # Ok::<(), serial_line::config::ConfigError>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{Config, LogFormat, LoggingConfig, SerialConfig, TimeoutConfig};
