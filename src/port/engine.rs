//! Timeout-bounded transfers over a non-blocking descriptor.
//!
//! Both directions wait with `poll` before every transfer and give up when
//! the total budget from the [`Timeout`] policy runs out. Running out of time
//! is not an error: the caller gets the count moved so far.

use super::error::{PortError, PortResult};
use super::sys::{self, Direction};
use super::timeout::{Deadline, Timeout};
use std::os::fd::RawFd;
use std::time::Duration;
use tracing::{trace, warn};

/// Read up to `buf.len()` bytes.
///
/// `byte_time` is the nominal time to receive one character; with an
/// unbounded inter-byte timeout it is used to wait for the rest of a
/// multi-byte request so it arrives in a single `read`.
pub fn read(fd: RawFd, buf: &mut [u8], timeout: &Timeout, byte_time: Duration) -> PortResult<usize> {
    let size = buf.len();
    let deadline = Deadline::after_ms(timeout.read_budget_ms(size));

    // Drain whatever is already buffered.
    let mut bytes_read = sys::read(fd, buf).unwrap_or(0);

    while bytes_read < size {
        let remaining_ms = deadline.remaining_ms();
        if remaining_ms == 0 {
            break;
        }
        let budget = remaining_ms.min(timeout.inter_byte_timeout);

        match sys::wait_ready(fd, Direction::Readable, budget) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) if sys::is_interrupted(&e) => continue,
            Err(e) => return Err(PortError::io("poll", e)),
        }

        let missing = size - bytes_read;
        if missing > 1 && timeout.inter_byte_unbounded() {
            // A failed FIONREAD skips the wait; the read below reports the fault.
            let available = sys::bytes_available(fd).unwrap_or(missing);
            if available < missing {
                let wait = byte_time.saturating_mul(u32::try_from(missing - available).unwrap_or(u32::MAX));
                sys::sleep(wait.min(deadline.remaining()));
            }
        }

        let n = match sys::read(fd, &mut buf[bytes_read..]) {
            Ok(0) => {
                warn!(fd, bytes_read, "readable descriptor returned no data");
                return Err(PortError::DeviceDisconnected);
            }
            Ok(n) => n,
            Err(e) if sys::is_interrupted(&e) || sys::is_would_block(&e) => continue,
            Err(e) => {
                warn!(fd, bytes_read, error = %e, "read failed after readiness");
                return Err(PortError::DeviceDisconnected);
            }
        };
        if n > missing {
            return Err(PortError::LogicError(format!(
                "read returned {n} bytes with only {missing} requested"
            )));
        }
        bytes_read += n;
    }

    trace!(fd, requested = size, bytes_read, "read finished");
    Ok(bytes_read)
}

/// Write up to `data.len()` bytes.
pub fn write(fd: RawFd, data: &[u8], timeout: &Timeout) -> PortResult<usize> {
    let length = data.len();
    let deadline = Deadline::after_ms(timeout.write_budget_ms(length));
    let mut bytes_written = 0;

    while bytes_written < length {
        let remaining_ms = deadline.remaining_ms();
        if remaining_ms == 0 {
            break;
        }

        match sys::wait_ready(fd, Direction::Writable, remaining_ms) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) if sys::is_interrupted(&e) => continue,
            Err(e) => return Err(PortError::io("poll", e)),
        }

        let pending = length - bytes_written;
        let n = match sys::write(fd, &data[bytes_written..]) {
            Ok(0) => {
                warn!(fd, bytes_written, "writable descriptor accepted no data");
                return Err(PortError::DeviceDisconnected);
            }
            Ok(n) => n,
            Err(e) if sys::is_interrupted(&e) || sys::is_would_block(&e) => continue,
            Err(e) => {
                warn!(fd, bytes_written, error = %e, "write failed after readiness");
                return Err(PortError::DeviceDisconnected);
            }
        };
        if n > pending {
            return Err(PortError::LogicError(format!(
                "write accepted {n} bytes with only {pending} pending"
            )));
        }
        bytes_written += n;
    }

    trace!(fd, requested = length, bytes_written, "write finished");
    Ok(bytes_written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
    use std::time::Instant;

    fn nonblocking_pipe() -> (OwnedFd, OwnedFd) {
        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        for fd in fds {
            let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
            assert_eq!(unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) }, 0);
        }
        // SAFETY: pipe just created both descriptors.
        unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) }
    }

    const PIPE_BYTE_TIME: Duration = Duration::from_micros(100);

    #[test]
    fn test_read_returns_buffered_bytes() {
        let (rx, tx) = nonblocking_pipe();
        sys::write(tx.as_raw_fd(), b"hello").unwrap();

        let mut buf = [0u8; 5];
        let n = read(rx.as_raw_fd(), &mut buf, &Timeout::simple(100), PIPE_BYTE_TIME).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn test_read_times_out_with_partial_data() {
        let (rx, tx) = nonblocking_pipe();
        sys::write(tx.as_raw_fd(), b"ab").unwrap();

        let mut buf = [0u8; 8];
        let start = Instant::now();
        let n = read(rx.as_raw_fd(), &mut buf, &Timeout::simple(80), PIPE_BYTE_TIME).unwrap();
        assert_eq!(n, 2);
        assert_eq!(&buf[..2], b"ab");
        assert!(start.elapsed() >= Duration::from_millis(70));
    }

    #[test]
    fn test_inter_byte_timeout_stops_early() {
        let (rx, _tx) = nonblocking_pipe();
        let timeout = Timeout::new(20, 2000, 0, 0, 0);

        let mut buf = [0u8; 4];
        let start = Instant::now();
        let n = read(rx.as_raw_fd(), &mut buf, &timeout, PIPE_BYTE_TIME).unwrap();
        assert_eq!(n, 0);
        assert!(start.elapsed() < Duration::from_millis(1000));
    }

    #[test]
    fn test_non_blocking_read_returns_immediately() {
        let (rx, _tx) = nonblocking_pipe();
        let mut buf = [0u8; 16];
        let start = Instant::now();
        let n = read(rx.as_raw_fd(), &mut buf, &Timeout::non_blocking(), PIPE_BYTE_TIME).unwrap();
        assert_eq!(n, 0);
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_read_waits_for_late_bytes() {
        let (rx, tx) = nonblocking_pipe();
        let writer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            sys::write(tx.as_raw_fd(), b"late").unwrap();
            tx
        });

        let mut buf = [0u8; 4];
        let n = read(rx.as_raw_fd(), &mut buf, &Timeout::simple(1000), PIPE_BYTE_TIME).unwrap();
        assert_eq!(n, 4);
        assert_eq!(&buf, b"late");
        drop(writer.join().unwrap());
    }

    #[test]
    fn test_closed_writer_is_disconnect() {
        let (rx, tx) = nonblocking_pipe();
        drop(tx);

        let mut buf = [0u8; 4];
        let err = read(rx.as_raw_fd(), &mut buf, &Timeout::simple(100), PIPE_BYTE_TIME).unwrap_err();
        assert!(matches!(err, PortError::DeviceDisconnected));
    }

    #[test]
    fn test_write_all() {
        let (rx, tx) = nonblocking_pipe();
        let n = write(tx.as_raw_fd(), b"payload", &Timeout::simple(100)).unwrap();
        assert_eq!(n, 7);

        let mut buf = [0u8; 7];
        assert_eq!(sys::read(rx.as_raw_fd(), &mut buf).unwrap(), 7);
        assert_eq!(&buf, b"payload");
    }

    #[test]
    fn test_write_times_out_on_full_pipe() {
        let (_rx, tx) = nonblocking_pipe();
        let chunk = vec![0x55u8; 1 << 20];
        let start = Instant::now();
        let n = write(tx.as_raw_fd(), &chunk, &Timeout::simple(50)).unwrap();
        assert!(n < chunk.len());
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_empty_transfers() {
        let (rx, tx) = nonblocking_pipe();
        assert_eq!(write(tx.as_raw_fd(), &[], &Timeout::simple(10)).unwrap(), 0);
        assert_eq!(read(rx.as_raw_fd(), &mut [], &Timeout::simple(10), PIPE_BYTE_TIME).unwrap(), 0);
    }
}
