//! Synchronous POSIX serial port.
//!
//! `SerialPort` owns the device descriptor and its line settings. Settings
//! and lifecycle changes go through one state mutex; reads and writes each
//! take their own lock, so one reader and one writer can run at the same time
//! on the full-duplex link.
//!
//! `close` takes both transfer locks before releasing the descriptor, so it
//! waits for in-flight transfers instead of pulling the descriptor out from
//! under them. `wait_for_change` is not covered by either lock; do not close
//! a port another thread is waiting on.

use super::engine;
use super::error::{PortError, PortResult};
use super::settings::{ByteSize, FlowControl, LineSettings, Parity, StopBits};
use super::sys;
use super::termios;
use super::timeout::Timeout;
use super::traits::SerialTransport;
use parking_lot::Mutex;
use serde::Serialize;
use std::ffi::CString;
use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd, RawFd};
use std::time::Duration;
use tracing::{debug, warn};

/// Default interval for polling the modem lines when the driver cannot block
/// on a change.
pub const DEFAULT_MODEM_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Modem input lines watched by `wait_for_change`.
const MODEM_INPUT_MASK: libc::c_int = libc::TIOCM_CTS | libc::TIOCM_DSR | libc::TIOCM_RNG | libc::TIOCM_CAR;

#[derive(Debug)]
struct PortState {
    path: String,
    /// `Some` exactly while the port is open.
    fd: Option<OwnedFd>,
    settings: LineSettings,
    /// Transmission time of one character at `settings`.
    byte_time: Duration,
    timeout: Timeout,
    modem_poll_interval: Duration,
}

impl PortState {
    fn raw_fd(&self) -> PortResult<RawFd> {
        self.fd.as_ref().map(AsRawFd::as_raw_fd).ok_or(PortError::PortNotOpen)
    }
}

/// Snapshot of all modem control lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModemStatus {
    pub rts: bool,
    pub dtr: bool,
    pub cts: bool,
    pub dsr: bool,
    pub ri: bool,
    pub cd: bool,
}

impl ModemStatus {
    fn from_bits(bits: libc::c_int) -> Self {
        Self {
            rts: bits & libc::TIOCM_RTS != 0,
            dtr: bits & libc::TIOCM_DTR != 0,
            cts: bits & libc::TIOCM_CTS != 0,
            dsr: bits & libc::TIOCM_DSR != 0,
            ri: bits & libc::TIOCM_RNG != 0,
            cd: bits & libc::TIOCM_CAR != 0,
        }
    }
}

/// A serial port on a POSIX character device.
///
/// # Example
/// ```no_run
/// use serial_line::port::{LineSettings, SerialPort, Timeout};
///
/// let port = SerialPort::new("/dev/ttyUSB0", LineSettings::new(115_200), Timeout::simple(500))?;
/// port.write(b"AT\r")?;
/// let mut reply = [0u8; 16];
/// let n = port.read(&mut reply)?;
/// println!("{:?}", &reply[..n]);
/// # Ok::<(), serial_line::port::PortError>(())
/// ```
pub struct SerialPort {
    state: Mutex<PortState>,
    read_lock: Mutex<()>,
    write_lock: Mutex<()>,
}

impl SerialPort {
    /// Create a port for `path`, opening it right away unless `path` is empty.
    pub fn new(path: impl Into<String>, settings: LineSettings, timeout: Timeout) -> PortResult<Self> {
        let port = Self {
            state: Mutex::new(PortState {
                path: path.into(),
                fd: None,
                settings,
                byte_time: settings.byte_time().unwrap_or_default(),
                timeout,
                modem_poll_interval: DEFAULT_MODEM_POLL_INTERVAL,
            }),
            read_lock: Mutex::new(()),
            write_lock: Mutex::new(()),
        };
        if !port.path().is_empty() {
            port.open()?;
        }
        Ok(port)
    }

    /// Open the device and apply the current settings.
    pub fn open(&self) -> PortResult<()> {
        let mut state = self.state.lock();
        if state.path.is_empty() {
            return Err(PortError::invalid("empty port path"));
        }
        if state.fd.is_some() {
            return Err(PortError::AlreadyOpen);
        }
        let c_path = CString::new(state.path.as_str())
            .map_err(|_| PortError::invalid("port path contains a NUL byte"))?;

        let fd = sys::open_device(&c_path).map_err(|e| match e.raw_os_error() {
            Some(libc::ENFILE) | Some(libc::EMFILE) => PortError::TooManyHandles,
            _ => PortError::io("open", e),
        })?;

        // On failure `fd` is dropped here, releasing the descriptor.
        let byte_time = termios::reconfigure(fd.as_raw_fd(), &state.settings)?;

        debug!(path = %state.path, fd = fd.as_raw_fd(), settings = %state.settings, "port opened");
        state.byte_time = byte_time;
        state.fd = Some(fd);
        Ok(())
    }

    /// Release the descriptor. Closing a closed port does nothing.
    ///
    /// Waits for any in-flight read and write to finish first.
    pub fn close(&self) -> PortResult<()> {
        let _read = self.read_lock.lock();
        let _write = self.write_lock.lock();
        let mut state = self.state.lock();

        let Some(fd) = state.fd.take() else {
            return Ok(());
        };
        let raw = fd.into_raw_fd();
        debug!(path = %state.path, fd = raw, "closing port");
        // The descriptor is gone even if close reports an error.
        sys::close(raw).map_err(|e| PortError::io("close", e))
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().fd.is_some()
    }

    /// Re-apply the current settings to the open device.
    ///
    /// Fails with an `Io` error ("invalid descriptor") when the port is closed.
    pub fn reconfigure(&self) -> PortResult<()> {
        let mut state = self.state.lock();
        if state.fd.is_none() {
            return Err(PortError::io(
                "invalid descriptor",
                std::io::Error::from_raw_os_error(libc::EBADF),
            ));
        }
        let settings = state.settings;
        Self::apply(&mut state, settings)
    }

    /// Store `settings`, applying them first if the port is open. If applying
    /// fails the previous settings stay in effect.
    fn apply(state: &mut PortState, settings: LineSettings) -> PortResult<()> {
        let byte_time = match state.fd.as_ref() {
            Some(fd) => termios::reconfigure(fd.as_raw_fd(), &settings)?,
            None => settings.byte_time().unwrap_or_default(),
        };
        state.settings = settings;
        state.byte_time = byte_time;
        Ok(())
    }

    fn update(&self, change: impl FnOnce(&mut LineSettings)) -> PortResult<()> {
        let mut state = self.state.lock();
        let mut settings = state.settings;
        change(&mut settings);
        Self::apply(&mut state, settings)
    }

    pub fn set_settings(&self, settings: LineSettings) -> PortResult<()> {
        self.update(|s| *s = settings)
    }

    pub fn set_baud_rate(&self, baud_rate: u32) -> PortResult<()> {
        self.update(|s| s.baud_rate = baud_rate)
    }

    pub fn set_byte_size(&self, byte_size: ByteSize) -> PortResult<()> {
        self.update(|s| s.byte_size = byte_size)
    }

    pub fn set_parity(&self, parity: Parity) -> PortResult<()> {
        self.update(|s| s.parity = parity)
    }

    pub fn set_stop_bits(&self, stop_bits: StopBits) -> PortResult<()> {
        self.update(|s| s.stop_bits = stop_bits)
    }

    pub fn set_flow_control(&self, flow_control: FlowControl) -> PortResult<()> {
        self.update(|s| s.flow_control = flow_control)
    }

    pub fn settings(&self) -> LineSettings {
        self.state.lock().settings
    }

    pub fn baud_rate(&self) -> u32 {
        self.settings().baud_rate
    }

    pub fn byte_size(&self) -> ByteSize {
        self.settings().byte_size
    }

    pub fn parity(&self) -> Parity {
        self.settings().parity
    }

    pub fn stop_bits(&self) -> StopBits {
        self.settings().stop_bits
    }

    pub fn flow_control(&self) -> FlowControl {
        self.settings().flow_control
    }

    /// Transmission time of one character at the applied settings.
    pub fn byte_time(&self) -> Duration {
        self.state.lock().byte_time
    }

    /// Change the device path. Takes effect on the next `open`.
    pub fn set_path(&self, path: impl Into<String>) {
        self.state.lock().path = path.into();
    }

    pub fn path(&self) -> String {
        self.state.lock().path.clone()
    }

    pub fn set_modem_poll_interval(&self, interval: Duration) {
        self.state.lock().modem_poll_interval = interval;
    }

    pub fn modem_poll_interval(&self) -> Duration {
        self.state.lock().modem_poll_interval
    }

    /// Everything a transfer needs, copied out so the state lock is not held
    /// while waiting.
    fn transfer_params(&self) -> PortResult<(RawFd, Timeout, Duration)> {
        let state = self.state.lock();
        Ok((state.raw_fd()?, state.timeout, state.byte_time))
    }

    /// Run a short descriptor operation under the state lock.
    fn with_fd<T>(&self, op: impl FnOnce(RawFd) -> PortResult<T>) -> PortResult<T> {
        let state = self.state.lock();
        op(state.raw_fd()?)
    }

    /// Read up to `buf.len()` bytes within the read timeout.
    pub fn read(&self, buf: &mut [u8]) -> PortResult<usize> {
        let _guard = self.read_lock.lock();
        let (fd, timeout, byte_time) = self.transfer_params()?;
        engine::read(fd, buf, &timeout, byte_time)
    }

    /// Write up to `data.len()` bytes within the write timeout.
    pub fn write(&self, data: &[u8]) -> PortResult<usize> {
        let _guard = self.write_lock.lock();
        let (fd, timeout, _) = self.transfer_params()?;
        engine::write(fd, data, &timeout)
    }

    /// Bytes waiting in the input queue.
    pub fn available(&self) -> PortResult<usize> {
        self.with_fd(|fd| sys::bytes_available(fd).map_err(|e| PortError::io("ioctl(FIONREAD)", e)))
    }

    /// Wait until all written output has been transmitted.
    pub fn flush(&self) -> PortResult<()> {
        let _guard = self.write_lock.lock();
        let (fd, _, _) = self.transfer_params()?;
        sys::tcdrain(fd).map_err(|e| PortError::io("tcdrain", e))
    }

    /// Discard received but unread data.
    pub fn flush_input(&self) -> PortResult<()> {
        self.with_fd(|fd| sys::tcflush(fd, libc::TCIFLUSH).map_err(|e| PortError::io("tcflush", e)))
    }

    /// Discard written but untransmitted data.
    pub fn flush_output(&self) -> PortResult<()> {
        self.with_fd(|fd| sys::tcflush(fd, libc::TCOFLUSH).map_err(|e| PortError::io("tcflush", e)))
    }

    /// Hold the line in the break condition for `duration_ms`.
    pub fn send_break(&self, duration_ms: u32) -> PortResult<()> {
        let _guard = self.write_lock.lock();
        let (fd, _, _) = self.transfer_params()?;
        sys::set_break(fd, true).map_err(|e| PortError::io("ioctl(TIOCSBRK)", e))?;
        sys::sleep(Duration::from_millis(u64::from(duration_ms)));
        sys::set_break(fd, false).map_err(|e| PortError::io("ioctl(TIOCCBRK)", e))
    }

    /// Assert (`true`) or release the break condition.
    pub fn set_break(&self, level: bool) -> PortResult<()> {
        self.with_fd(|fd| {
            let context = if level { "ioctl(TIOCSBRK)" } else { "ioctl(TIOCCBRK)" };
            sys::set_break(fd, level).map_err(|e| PortError::io(context, e))
        })
    }

    fn modem_bits_locked(fd: RawFd) -> PortResult<libc::c_int> {
        sys::modem_bits(fd).map_err(|e| PortError::io("ioctl(TIOCMGET)", e))
    }

    fn set_output_line(&self, line: libc::c_int, level: bool) -> PortResult<()> {
        self.with_fd(|fd| {
            let mut bits = Self::modem_bits_locked(fd)?;
            if level {
                bits |= line;
            } else {
                bits &= !line;
            }
            sys::set_modem_bits(fd, bits).map_err(|e| PortError::io("ioctl(TIOCMSET)", e))
        })
    }

    fn line(&self, line: libc::c_int) -> PortResult<bool> {
        self.with_fd(|fd| Ok(Self::modem_bits_locked(fd)? & line != 0))
    }

    pub fn set_rts(&self, level: bool) -> PortResult<()> {
        self.set_output_line(libc::TIOCM_RTS, level)
    }

    pub fn set_dtr(&self, level: bool) -> PortResult<()> {
        self.set_output_line(libc::TIOCM_DTR, level)
    }

    pub fn rts(&self) -> PortResult<bool> {
        self.line(libc::TIOCM_RTS)
    }

    pub fn dtr(&self) -> PortResult<bool> {
        self.line(libc::TIOCM_DTR)
    }

    /// Clear To Send.
    pub fn cts(&self) -> PortResult<bool> {
        self.line(libc::TIOCM_CTS)
    }

    /// Data Set Ready.
    pub fn dsr(&self) -> PortResult<bool> {
        self.line(libc::TIOCM_DSR)
    }

    /// Ring Indicator.
    pub fn ri(&self) -> PortResult<bool> {
        self.line(libc::TIOCM_RNG)
    }

    /// Carrier Detect.
    pub fn cd(&self) -> PortResult<bool> {
        self.line(libc::TIOCM_CAR)
    }

    pub fn modem_status(&self) -> PortResult<ModemStatus> {
        self.with_fd(|fd| Self::modem_bits_locked(fd).map(ModemStatus::from_bits))
    }

    /// Block until CTS, DSR, RI or CD changes.
    ///
    /// Returns `Ok(false)` if the port was closed while waiting. Drivers that
    /// cannot block on line changes make this fail with an `Io` error; use
    /// [`SerialPort::poll_for_change`] for those.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    pub fn wait_for_change(&self) -> PortResult<bool> {
        let fd = self.state.lock().raw_fd()?;
        match sys::wait_modem_change(fd, MODEM_INPUT_MASK) {
            Ok(()) => Ok(true),
            Err(_) if !self.is_open() => Ok(false),
            Err(e) => Err(PortError::io("ioctl(TIOCMIWAIT)", e)),
        }
    }

    /// Block until CTS, DSR, RI or CD is asserted.
    ///
    /// Returns `Ok(false)` if the port was closed while waiting.
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    pub fn wait_for_change(&self) -> PortResult<bool> {
        self.poll_for_change()
    }

    /// Poll the modem lines every `modem_poll_interval` until one of CTS,
    /// DSR, RI or CD is asserted.
    ///
    /// Returns `Ok(false)` if the port is closed while polling.
    pub fn poll_for_change(&self) -> PortResult<bool> {
        if !self.is_open() {
            return Err(PortError::PortNotOpen);
        }
        poll_lines(|| {
            let state = self.state.lock();
            let Ok(fd) = state.raw_fd() else {
                return Ok(None);
            };
            Ok(Some((Self::modem_bits_locked(fd)?, state.modem_poll_interval)))
        })
    }
}

/// Drive `sample` until it reports an asserted input line (`true`) or a
/// closed port (`None`, giving `false`). Each sample also yields the delay
/// before the next one.
fn poll_lines(mut sample: impl FnMut() -> PortResult<Option<(libc::c_int, Duration)>>) -> PortResult<bool> {
    loop {
        let Some((bits, interval)) = sample()? else {
            return Ok(false);
        };
        if bits & MODEM_INPUT_MASK != 0 {
            return Ok(true);
        }
        sys::sleep(interval);
    }
}

impl SerialTransport for SerialPort {
    fn name(&self) -> String {
        self.path()
    }

    fn is_open(&self) -> bool {
        SerialPort::is_open(self)
    }

    fn read(&self, buf: &mut [u8]) -> PortResult<usize> {
        SerialPort::read(self, buf)
    }

    fn write(&self, data: &[u8]) -> PortResult<usize> {
        SerialPort::write(self, data)
    }

    fn available(&self) -> PortResult<usize> {
        SerialPort::available(self)
    }

    fn flush(&self) -> PortResult<()> {
        SerialPort::flush(self)
    }

    fn timeout(&self) -> Timeout {
        self.state.lock().timeout
    }

    fn set_timeout(&self, timeout: Timeout) {
        self.state.lock().timeout = timeout;
    }
}

impl Drop for SerialPort {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(path = %self.path(), error = %e, "failed to close port on drop");
        }
    }
}

impl std::fmt::Debug for SerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SerialPort")
            .field("path", &state.path)
            .field("open", &state.fd.is_some())
            .field("settings", &state.settings)
            .finish()
    }
}
