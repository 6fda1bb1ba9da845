//! Core trait for serial transports.
//!
//! `SerialTransport` lets code that only moves bytes run against either a real
//! `SerialPort` or the in-memory `LoopbackPort`.

use super::error::PortResult;
use super::timeout::Timeout;

/// Byte transfer over a serial link.
///
/// All methods take `&self`: implementations serialize readers against readers
/// and writers against writers internally, so one reader and one writer may
/// share a transport across threads.
pub trait SerialTransport: Send + Sync + std::fmt::Debug {
    /// Get the name/path of this transport.
    fn name(&self) -> String;

    fn is_open(&self) -> bool;

    /// Read up to `buf.len()` bytes, bounded by the read timeout.
    ///
    /// Returns the number of bytes read; fewer than requested means the
    /// timeout elapsed.
    fn read(&self, buf: &mut [u8]) -> PortResult<usize>;

    /// Write up to `data.len()` bytes, bounded by the write timeout.
    ///
    /// Returns the number of bytes written.
    fn write(&self, data: &[u8]) -> PortResult<usize>;

    /// Bytes that can be read without waiting.
    fn available(&self) -> PortResult<usize>;

    /// Block until all written data has left the transport.
    fn flush(&self) -> PortResult<()>;

    fn timeout(&self) -> Timeout;

    fn set_timeout(&self, timeout: Timeout);
}
