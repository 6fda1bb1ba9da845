//! Thin wrappers around the libc calls the port needs.
//!
//! Every wrapper returns `io::Result` and leaves policy (retries, error
//! mapping) to the caller, except where noted.

use std::ffi::CString;
use std::io;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

/// Map a `-1` return to the current `errno`.
fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

fn cvt_size(ret: libc::ssize_t) -> io::Result<usize> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret as usize)
    }
}

pub fn is_interrupted(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EINTR)
}

pub fn is_would_block(err: &io::Error) -> bool {
    let code = err.raw_os_error();
    code == Some(libc::EAGAIN) || code == Some(libc::EWOULDBLOCK)
}

/// Open a device read/write, non-blocking, without making it the controlling
/// terminal. Interrupted calls are retried.
pub fn open_device(path: &CString) -> io::Result<OwnedFd> {
    let flags = libc::O_RDWR | libc::O_NOCTTY | libc::O_NONBLOCK | libc::O_CLOEXEC;
    loop {
        match cvt(unsafe { libc::open(path.as_ptr(), flags) }) {
            // SAFETY: open just returned this descriptor and nothing else owns it.
            Ok(fd) => return Ok(unsafe { OwnedFd::from_raw_fd(fd) }),
            Err(e) if is_interrupted(&e) => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Release a raw descriptor, reporting failures that `OwnedFd` would swallow.
pub fn close(fd: RawFd) -> io::Result<()> {
    cvt(unsafe { libc::close(fd) }).map(drop)
}

/// One non-blocking read.
pub fn read(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    cvt_size(unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) })
}

/// One non-blocking write.
pub fn write(fd: RawFd, data: &[u8]) -> io::Result<usize> {
    cvt_size(unsafe { libc::write(fd, data.as_ptr().cast(), data.len()) })
}

/// Readiness direction for [`wait_ready`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Readable,
    Writable,
}

/// Block until `fd` is ready in `direction` or `timeout_ms` elapses.
///
/// Returns `Ok(false)` on timeout. Hang-up and error conditions count as
/// ready so that the following transfer observes them. `EINTR` is returned
/// to the caller, which decides whether to re-check its deadline.
pub fn wait_ready(fd: RawFd, direction: Direction, timeout_ms: u32) -> io::Result<bool> {
    let events = match direction {
        Direction::Readable => libc::POLLIN,
        Direction::Writable => libc::POLLOUT,
    };
    let mut pfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };
    let timeout = libc::c_int::try_from(timeout_ms).unwrap_or(libc::c_int::MAX);
    let ready = cvt(unsafe { libc::poll(&mut pfd, 1, timeout) })?;
    if ready == 0 {
        return Ok(false);
    }
    if pfd.revents & libc::POLLNVAL != 0 {
        return Err(io::Error::from_raw_os_error(libc::EBADF));
    }
    Ok(pfd.revents & (events | libc::POLLHUP | libc::POLLERR) != 0)
}

/// Sleep without touching any descriptor.
pub fn sleep(duration: Duration) {
    if !duration.is_zero() {
        std::thread::sleep(duration);
    }
}

pub fn tcgetattr(fd: RawFd) -> io::Result<libc::termios> {
    let mut termios = std::mem::MaybeUninit::<libc::termios>::uninit();
    cvt(unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) })?;
    // SAFETY: tcgetattr succeeded and filled the struct.
    Ok(unsafe { termios.assume_init() })
}

pub fn tcsetattr(fd: RawFd, termios: &libc::termios) -> io::Result<()> {
    cvt(unsafe { libc::tcsetattr(fd, libc::TCSANOW, termios) }).map(drop)
}

/// Wait until all output has been transmitted.
pub fn tcdrain(fd: RawFd) -> io::Result<()> {
    loop {
        match cvt(unsafe { libc::tcdrain(fd) }) {
            Err(e) if is_interrupted(&e) => continue,
            other => return other.map(drop),
        }
    }
}

pub fn tcflush(fd: RawFd, queue: libc::c_int) -> io::Result<()> {
    cvt(unsafe { libc::tcflush(fd, queue) }).map(drop)
}

/// Bytes waiting in the input queue.
pub fn bytes_available(fd: RawFd) -> io::Result<usize> {
    let mut count: libc::c_int = 0;
    cvt(unsafe { libc::ioctl(fd, libc::FIONREAD, &mut count) })?;
    Ok(usize::try_from(count).unwrap_or(0))
}

/// Read the modem-control bitmask (`TIOCM_*`).
pub fn modem_bits(fd: RawFd) -> io::Result<libc::c_int> {
    let mut bits: libc::c_int = 0;
    cvt(unsafe { libc::ioctl(fd, libc::TIOCMGET, &mut bits) })?;
    Ok(bits)
}

pub fn set_modem_bits(fd: RawFd, bits: libc::c_int) -> io::Result<()> {
    cvt(unsafe { libc::ioctl(fd, libc::TIOCMSET, &bits) }).map(drop)
}

/// Assert (`true`) or clear the break condition.
pub fn set_break(fd: RawFd, on: bool) -> io::Result<()> {
    let request = if on { libc::TIOCSBRK } else { libc::TIOCCBRK };
    cvt(unsafe { libc::ioctl(fd, request) }).map(drop)
}

/// Block until one of the modem lines in `mask` changes.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn wait_modem_change(fd: RawFd, mask: libc::c_int) -> io::Result<()> {
    #[cfg(target_os = "linux")]
    use libc::TIOCMIWAIT;
    // Android's libc bindings lack it; every Android ABI uses the generic value.
    #[cfg(target_os = "android")]
    const TIOCMIWAIT: libc::c_int = 0x545C;
    loop {
        // TIOCMIWAIT takes the mask by value.
        match cvt(unsafe { libc::ioctl(fd, TIOCMIWAIT, mask as libc::c_ulong) }) {
            Err(e) if is_interrupted(&e) => continue,
            other => return other.map(drop),
        }
    }
}

/// Mirror of `struct serial_struct` from `<linux/serial.h>`.
#[cfg(any(target_os = "linux", target_os = "android"))]
#[repr(C)]
#[derive(Debug)]
pub struct SerialStruct {
    pub kind: libc::c_int,
    pub line: libc::c_int,
    pub port: libc::c_uint,
    pub irq: libc::c_int,
    pub flags: libc::c_int,
    pub xmit_fifo_size: libc::c_int,
    pub custom_divisor: libc::c_int,
    pub baud_base: libc::c_int,
    pub close_delay: libc::c_ushort,
    pub io_type: libc::c_char,
    pub reserved_char: [libc::c_char; 1],
    pub hub6: libc::c_int,
    pub closing_wait: libc::c_ushort,
    pub closing_wait2: libc::c_ushort,
    pub iomem_base: *mut libc::c_uchar,
    pub iomem_reg_shift: libc::c_ushort,
    pub port_high: libc::c_uint,
    pub iomap_base: libc::c_ulong,
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub const ASYNC_SPD_CUST: libc::c_int = 0x0030;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub const ASYNC_SPD_MASK: libc::c_int = 0x1030;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn get_serial(fd: RawFd) -> io::Result<SerialStruct> {
    let mut ser = std::mem::MaybeUninit::<SerialStruct>::zeroed();
    cvt(unsafe { libc::ioctl(fd, libc::TIOCGSERIAL, ser.as_mut_ptr()) })?;
    // SAFETY: zero-initialised and then filled by the kernel.
    Ok(unsafe { ser.assume_init() })
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn set_serial(fd: RawFd, ser: &SerialStruct) -> io::Result<()> {
    cvt(unsafe { libc::ioctl(fd, libc::TIOCSSERIAL, ser as *const SerialStruct) }).map(drop)
}

/// Set input and output speed to an arbitrary rate (IOSSIOSPEED).
#[cfg(any(target_os = "macos", target_os = "ios"))]
pub fn set_arbitrary_speed(fd: RawFd, baud: u32) -> io::Result<()> {
    const IOSSIOSPEED: libc::c_ulong = 0x8008_5402;
    let speed = libc::speed_t::from(baud);
    cvt(unsafe { libc::ioctl(fd, IOSSIOSPEED, &speed) }).map(drop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::AsRawFd;

    #[test]
    fn test_open_missing_device() {
        let path = CString::new("/dev/definitely_not_a_tty_12345").unwrap();
        let err = open_device(&path).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
    }

    #[test]
    fn test_wait_ready_on_pipe() {
        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        // SAFETY: pipe just created both descriptors.
        let (rx, tx) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

        assert!(!wait_ready(rx.as_raw_fd(), Direction::Readable, 10).unwrap());
        assert!(wait_ready(tx.as_raw_fd(), Direction::Writable, 10).unwrap());

        assert_eq!(write(tx.as_raw_fd(), b"abc").unwrap(), 3);
        assert!(wait_ready(rx.as_raw_fd(), Direction::Readable, 10).unwrap());
        assert_eq!(bytes_available(rx.as_raw_fd()).unwrap(), 3);

        let mut buf = [0u8; 8];
        assert_eq!(read(rx.as_raw_fd(), &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"abc");
    }

    #[test]
    fn test_tcgetattr_rejects_non_tty() {
        let file = tempfile::tempfile().unwrap();
        let err = tcgetattr(file.as_raw_fd()).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOTTY));
    }
}
