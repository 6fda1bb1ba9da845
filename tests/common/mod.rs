//! Shared test utilities for serial-line integration tests.
//!
//! Provides a pseudo-terminal pair so `SerialPort` can be driven against a real
//! tty driver without hardware: the port opens the slave side, the test plays
//! the remote device through the master side.

#![allow(dead_code)]

use serial_line::port::{LineSettings, SerialPort, Timeout};
use std::ffi::CStr;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::time::{Duration, Instant};

/// Descriptors of this process that refer to `path`.
#[cfg(target_os = "linux")]
pub fn descriptors_open_on(path: &str) -> usize {
    std::fs::read_dir("/proc/self/fd")
        .expect("list /proc/self/fd")
        .filter_map(Result::ok)
        .filter_map(|entry| std::fs::read_link(entry.path()).ok())
        .filter(|target| target.as_os_str() == path)
        .count()
}

/// Master side of a pty plus the path of its slave device.
pub struct PtyPair {
    pub master: OwnedFd,
    pub slave_path: String,
}

impl PtyPair {
    pub fn open() -> Self {
        // SAFETY: plain libc calls on a descriptor this function owns.
        unsafe {
            let fd = libc::posix_openpt(libc::O_RDWR | libc::O_NOCTTY);
            assert!(fd >= 0, "posix_openpt failed: {}", std::io::Error::last_os_error());
            let master = OwnedFd::from_raw_fd(fd);
            assert_eq!(libc::grantpt(fd), 0, "grantpt failed");
            assert_eq!(libc::unlockpt(fd), 0, "unlockpt failed");

            let flags = libc::fcntl(fd, libc::F_GETFL);
            assert_eq!(libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK), 0);

            let slave_path = slave_name(fd);
            PtyPair { master, slave_path }
        }
    }

    /// Open a `SerialPort` on the slave side.
    pub fn open_port(&self, settings: LineSettings, timeout: Timeout) -> SerialPort {
        SerialPort::new(self.slave_path.clone(), settings, timeout).expect("open pty slave")
    }

    /// Play the remote device: send bytes towards the port.
    pub fn send(&self, data: &[u8]) {
        let mut sent = 0;
        let deadline = Instant::now() + Duration::from_secs(5);
        while sent < data.len() {
            assert!(Instant::now() < deadline, "timed out writing to pty master");
            // SAFETY: the slice outlives the call.
            let n = unsafe {
                libc::write(
                    self.master.as_raw_fd(),
                    data[sent..].as_ptr().cast(),
                    data.len() - sent,
                )
            };
            if n > 0 {
                sent += n as usize;
            } else {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }

    /// Collect up to `len` bytes the port wrote, waiting at most `timeout`.
    pub fn receive(&self, len: usize, timeout: Duration) -> Vec<u8> {
        let mut out = Vec::with_capacity(len);
        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; 512];
        while out.len() < len && Instant::now() < deadline {
            let want = (len - out.len()).min(buf.len());
            // SAFETY: `buf` is valid for `want` bytes.
            let n = unsafe { libc::read(self.master.as_raw_fd(), buf.as_mut_ptr().cast(), want) };
            if n > 0 {
                out.extend_from_slice(&buf[..n as usize]);
            } else {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        out
    }

    /// Close the master side, which hangs up the slave.
    pub fn hang_up(self) {
        drop(self.master);
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
unsafe fn slave_name(fd: libc::c_int) -> String {
    let mut buf = [0 as libc::c_char; 128];
    assert_eq!(libc::ptsname_r(fd, buf.as_mut_ptr(), buf.len()), 0, "ptsname_r failed");
    CStr::from_ptr(buf.as_ptr()).to_string_lossy().into_owned()
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
unsafe fn slave_name(fd: libc::c_int) -> String {
    let name = libc::ptsname(fd);
    assert!(!name.is_null(), "ptsname failed");
    CStr::from_ptr(name).to_string_lossy().into_owned()
}

/// Assert that `elapsed` is within `[expected - slack_below, expected + slack_above]`.
pub fn assert_elapsed_near(elapsed: Duration, expected: Duration, slack_below: Duration, slack_above: Duration) {
    assert!(
        elapsed + slack_below >= expected && elapsed <= expected + slack_above,
        "elapsed {elapsed:?}, expected about {expected:?}"
    );
}
