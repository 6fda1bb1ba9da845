//! In-memory loopback transport.
//!
//! Provides a `LoopbackPort` that behaves like a serial port with a loopback
//! plug fitted: every byte written becomes readable. Reads honor the same
//! `Timeout` policy as a real port, so code written against
//! `SerialTransport` can be exercised without hardware.

use super::error::{PortError, PortResult};
use super::timeout::{Deadline, Timeout};
use super::traits::SerialTransport;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Default)]
struct LoopbackState {
    /// Bytes waiting to be read.
    queue: VecDeque<u8>,
    /// Log of all writes, in order.
    write_log: Vec<Vec<u8>>,
    open: bool,
    timeout: Timeout,
}

/// Loopback serial transport.
///
/// # Example
/// ```
/// use serial_line::port::{LoopbackPort, SerialTransport, Timeout};
///
/// let port = LoopbackPort::new("LOOP0");
/// port.set_timeout(Timeout::simple(10));
///
/// port.write(b"ping").unwrap();
/// let mut buf = [0u8; 4];
/// assert_eq!(port.read(&mut buf).unwrap(), 4);
/// assert_eq!(&buf, b"ping");
/// ```
#[derive(Debug)]
pub struct LoopbackPort {
    name: String,
    state: Mutex<LoopbackState>,
    data_ready: Condvar,
}

impl LoopbackPort {
    /// Create an open loopback port with a non-blocking timeout.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(LoopbackState {
                open: true,
                ..Default::default()
            }),
            data_ready: Condvar::new(),
        }
    }

    /// Make bytes readable as if they arrived from the far end.
    pub fn inject(&self, data: &[u8]) {
        let mut state = self.state.lock();
        state.queue.extend(data);
        self.data_ready.notify_all();
    }

    /// Get a copy of all data written to the port.
    pub fn write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_log.clone()
    }

    pub fn open(&self) -> PortResult<()> {
        let mut state = self.state.lock();
        if state.open {
            return Err(PortError::AlreadyOpen);
        }
        state.open = true;
        Ok(())
    }

    /// Close the port and discard unread data. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.open = false;
        state.queue.clear();
        self.data_ready.notify_all();
    }
}

fn drain(queue: &mut VecDeque<u8>, buf: &mut [u8]) -> usize {
    let n = queue.len().min(buf.len());
    for (slot, byte) in buf.iter_mut().zip(queue.drain(..n)) {
        *slot = byte;
    }
    n
}

impl SerialTransport for LoopbackPort {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }

    fn read(&self, buf: &mut [u8]) -> PortResult<usize> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(PortError::PortNotOpen);
        }
        let timeout = state.timeout;
        let deadline = Deadline::after_ms(timeout.read_budget_ms(buf.len()));

        let mut bytes_read = drain(&mut state.queue, buf);
        while bytes_read < buf.len() {
            let remaining_ms = deadline.remaining_ms();
            if remaining_ms == 0 {
                break;
            }
            let budget = Duration::from_millis(u64::from(remaining_ms.min(timeout.inter_byte_timeout)));
            let waited = self.data_ready.wait_for(&mut state, budget);
            if !state.open {
                return Err(PortError::PortNotOpen);
            }
            if waited.timed_out() && state.queue.is_empty() {
                break;
            }
            bytes_read += drain(&mut state.queue, &mut buf[bytes_read..]);
        }
        Ok(bytes_read)
    }

    fn write(&self, data: &[u8]) -> PortResult<usize> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(PortError::PortNotOpen);
        }
        state.write_log.push(data.to_vec());
        state.queue.extend(data);
        self.data_ready.notify_all();
        Ok(data.len())
    }

    fn available(&self) -> PortResult<usize> {
        let state = self.state.lock();
        if !state.open {
            return Err(PortError::PortNotOpen);
        }
        Ok(state.queue.len())
    }

    fn flush(&self) -> PortResult<()> {
        if !self.is_open() {
            return Err(PortError::PortNotOpen);
        }
        Ok(())
    }

    fn timeout(&self) -> Timeout {
        self.state.lock().timeout
    }

    fn set_timeout(&self, timeout: Timeout) {
        self.state.lock().timeout = timeout;
    }
}
