//! Translating `LineSettings` into the terminal line discipline.
//!
//! Platform differences (extra standard rates, custom speed mechanism, stick
//! parity) are captured once in [`Capabilities::PLATFORM`] instead of being
//! scattered through the flag mapping.

use super::error::{PortError, PortResult};
use super::settings::{ByteSize, FlowControl, LineSettings, Parity, StopBits};
use super::sys;
use std::os::fd::RawFd;
use std::time::Duration;
use tracing::debug;

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd"
)))]
compile_error!("this platform exposes no RTS/CTS flow control flag (CRTSCTS)");

/// How rates outside the standard table are programmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomBaud {
    /// An ioctl that takes the raw integer rate.
    ArbitrarySpeed,
    /// `baud_base / rate` written through the serial-line struct ioctls.
    Divisor,
    Unsupported,
}

/// Optional line-discipline features of the running platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub custom_baud: CustomBaud,
    /// Mark and space parity (CMSPAR).
    pub mark_space_parity: bool,
}

impl Capabilities {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    pub const PLATFORM: Self = Self {
        custom_baud: CustomBaud::Divisor,
        mark_space_parity: true,
    };

    #[cfg(any(target_os = "macos", target_os = "ios"))]
    pub const PLATFORM: Self = Self {
        custom_baud: CustomBaud::ArbitrarySpeed,
        mark_space_parity: false,
    };

    #[cfg(not(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios"
    )))]
    pub const PLATFORM: Self = Self {
        custom_baud: CustomBaud::Unsupported,
        mark_space_parity: false,
    };
}

#[cfg(any(target_os = "linux", target_os = "android"))]
const CMSPAR: libc::tcflag_t = libc::CMSPAR;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const CMSPAR: libc::tcflag_t = 0;

const COMMON_BAUDS: &[(u32, libc::speed_t)] = &[
    (50, libc::B50),
    (75, libc::B75),
    (110, libc::B110),
    (134, libc::B134),
    (150, libc::B150),
    (200, libc::B200),
    (300, libc::B300),
    (600, libc::B600),
    (1200, libc::B1200),
    (1800, libc::B1800),
    (2400, libc::B2400),
    (4800, libc::B4800),
    (9600, libc::B9600),
    (19200, libc::B19200),
    (38400, libc::B38400),
    (57600, libc::B57600),
    (115200, libc::B115200),
    (230400, libc::B230400),
];

#[cfg(any(target_os = "linux", target_os = "android"))]
const PLATFORM_BAUDS: &[(u32, libc::speed_t)] = &[
    (460800, libc::B460800),
    (500000, libc::B500000),
    (576000, libc::B576000),
    (921600, libc::B921600),
    (1000000, libc::B1000000),
    (1152000, libc::B1152000),
    (1500000, libc::B1500000),
    (2000000, libc::B2000000),
    (2500000, libc::B2500000),
    (3000000, libc::B3000000),
    (3500000, libc::B3500000),
    (4000000, libc::B4000000),
];

#[cfg(any(target_os = "macos", target_os = "ios"))]
const PLATFORM_BAUDS: &[(u32, libc::speed_t)] = &[
    (7200, libc::B7200),
    (14400, libc::B14400),
    (28800, libc::B28800),
    (76800, libc::B76800),
];

#[cfg(any(target_os = "freebsd", target_os = "dragonfly"))]
const PLATFORM_BAUDS: &[(u32, libc::speed_t)] = &[
    (7200, libc::B7200),
    (14400, libc::B14400),
    (28800, libc::B28800),
    (76800, libc::B76800),
    (460800, libc::B460800),
    (921600, libc::B921600),
];

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "dragonfly"
)))]
const PLATFORM_BAUDS: &[(u32, libc::speed_t)] = &[];

/// The speed constant for `baud`, if the platform defines one.
pub fn standard_speed(baud: u32) -> Option<libc::speed_t> {
    COMMON_BAUDS
        .iter()
        .chain(PLATFORM_BAUDS)
        .find(|(rate, _)| *rate == baud)
        .map(|(_, speed)| *speed)
}

/// Outcome of mapping a requested rate onto the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaudResolution {
    Standard(libc::speed_t),
    /// Needs the platform's custom speed mechanism after the flags are set.
    Custom(u32),
}

pub fn resolve_baud(baud: u32, caps: &Capabilities) -> PortResult<BaudResolution> {
    if baud == 0 {
        return Err(PortError::invalid("baud rate must be positive"));
    }
    if let Some(speed) = standard_speed(baud) {
        return Ok(BaudResolution::Standard(speed));
    }
    match caps.custom_baud {
        CustomBaud::Unsupported => Err(PortError::UnsupportedBaudRate(baud)),
        CustomBaud::ArbitrarySpeed | CustomBaud::Divisor => Ok(BaudResolution::Custom(baud)),
    }
}

/// Rewrite `termios` for `settings`: raw mode, speed, framing, parity, flow
/// control and a polling read mode (VMIN = VTIME = 0).
///
/// Nothing is applied to a device here; on error `termios` may be partially
/// modified and must be discarded.
pub fn apply_line_settings(
    termios: &mut libc::termios,
    settings: &LineSettings,
    caps: &Capabilities,
) -> PortResult<BaudResolution> {
    // Raw mode, no echo, binary.
    termios.c_cflag |= libc::CLOCAL | libc::CREAD;
    termios.c_lflag &= !(libc::ICANON
        | libc::ECHO
        | libc::ECHOE
        | libc::ECHOK
        | libc::ECHONL
        | libc::ISIG
        | libc::IEXTEN);
    termios.c_oflag &= !libc::OPOST;
    termios.c_iflag &= !(libc::INLCR | libc::IGNCR | libc::ICRNL | libc::IGNBRK | libc::PARMRK);
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        termios.c_iflag &= !libc::IUCLC;
    }

    let resolution = resolve_baud(settings.baud_rate, caps)?;
    let speed = match resolution {
        BaudResolution::Standard(speed) => Some(speed),
        // ASYNC_SPD_CUST only takes effect while the line runs at 38400.
        BaudResolution::Custom(_) if caps.custom_baud == CustomBaud::Divisor => Some(libc::B38400),
        BaudResolution::Custom(_) => None,
    };
    if let Some(speed) = speed {
        if unsafe { libc::cfsetispeed(termios, speed) } == -1 {
            return Err(PortError::last_os_error("cfsetispeed"));
        }
        if unsafe { libc::cfsetospeed(termios, speed) } == -1 {
            return Err(PortError::last_os_error("cfsetospeed"));
        }
    }

    termios.c_cflag &= !libc::CSIZE;
    termios.c_cflag |= match settings.byte_size {
        ByteSize::Eight => libc::CS8,
        ByteSize::Seven => libc::CS7,
        ByteSize::Six => libc::CS6,
        ByteSize::Five => libc::CS5,
    };

    // No POSIX distinction for 1.5; it shares the two-stop-bit flag.
    match settings.stop_bits {
        StopBits::One => termios.c_cflag &= !libc::CSTOPB,
        StopBits::OnePointFive | StopBits::Two => termios.c_cflag |= libc::CSTOPB,
    }

    termios.c_iflag &= !(libc::INPCK | libc::ISTRIP);
    termios.c_cflag &= !(libc::PARENB | libc::PARODD | CMSPAR);
    match settings.parity {
        Parity::None => {}
        Parity::Even => termios.c_cflag |= libc::PARENB,
        Parity::Odd => termios.c_cflag |= libc::PARENB | libc::PARODD,
        Parity::Mark | Parity::Space if !caps.mark_space_parity => {
            return Err(PortError::UnsupportedParity(settings.parity));
        }
        Parity::Mark => termios.c_cflag |= libc::PARENB | CMSPAR | libc::PARODD,
        Parity::Space => termios.c_cflag |= libc::PARENB | CMSPAR,
    }

    let (xonxoff, rtscts) = match settings.flow_control {
        FlowControl::None => (false, false),
        FlowControl::Software => (true, false),
        FlowControl::Hardware => (false, true),
    };
    if xonxoff {
        termios.c_iflag |= libc::IXON | libc::IXOFF;
    } else {
        termios.c_iflag &= !(libc::IXON | libc::IXOFF | libc::IXANY);
    }
    if rtscts {
        termios.c_cflag |= libc::CRTSCTS;
    } else {
        termios.c_cflag &= !libc::CRTSCTS;
    }

    // select()-style polling owns all waiting; read() never blocks in the kernel.
    termios.c_cc[libc::VMIN] = 0;
    termios.c_cc[libc::VTIME] = 0;

    Ok(resolution)
}

/// Apply `settings` to the open device `fd` and return the resulting byte
/// transmission time.
pub fn reconfigure(fd: RawFd, settings: &LineSettings) -> PortResult<Duration> {
    let caps = Capabilities::PLATFORM;
    let byte_time = settings.byte_time()?;

    let mut termios = sys::tcgetattr(fd).map_err(|e| PortError::io("tcgetattr", e))?;
    let resolution = apply_line_settings(&mut termios, settings, &caps)?;

    if caps.custom_baud == CustomBaud::Divisor {
        match resolution {
            BaudResolution::Custom(rate) => set_custom_divisor(fd, rate)?,
            BaudResolution::Standard(_) => clear_custom_divisor(fd)?,
        }
    }

    sys::tcsetattr(fd, &termios).map_err(|e| PortError::io("tcsetattr", e))?;

    if let BaudResolution::Custom(rate) = resolution {
        if caps.custom_baud == CustomBaud::ArbitrarySpeed {
            set_arbitrary_speed(fd, rate)?;
        }
    }

    debug!(
        fd,
        %settings,
        custom_baud = matches!(resolution, BaudResolution::Custom(_)),
        byte_time_ns = byte_time.as_nanos() as u64,
        "line reconfigured"
    );
    Ok(byte_time)
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn set_custom_divisor(fd: RawFd, baud: u32) -> PortResult<()> {
    let mut ser = sys::get_serial(fd).map_err(|e| PortError::io("ioctl(TIOCGSERIAL)", e))?;
    let divisor = use_custom_divisor(&mut ser, baud)?;
    sys::set_serial(fd, &ser).map_err(|e| PortError::io("ioctl(TIOCSSERIAL)", e))?;
    debug!(fd, baud, divisor, baud_base = ser.baud_base, "custom divisor set");
    Ok(())
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn use_custom_divisor(ser: &mut sys::SerialStruct, baud: u32) -> PortResult<libc::c_int> {
    let rate = libc::c_int::try_from(baud).map_err(|_| PortError::UnsupportedBaudRate(baud))?;
    if ser.baud_base <= 0 {
        return Err(PortError::UnsupportedBaudRate(baud));
    }
    let divisor = ser.baud_base / rate;
    if divisor == 0 {
        return Err(PortError::UnsupportedBaudRate(baud));
    }
    ser.custom_divisor = divisor;
    ser.flags &= !sys::ASYNC_SPD_MASK;
    ser.flags |= sys::ASYNC_SPD_CUST;
    Ok(divisor)
}

/// Drop a custom divisor left by an earlier rate so B38400 means 38400 again.
///
/// Devices without a `serial_struct` (ptys, most USB adapters) have nothing
/// to clear.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn clear_custom_divisor(fd: RawFd) -> PortResult<()> {
    let Ok(mut ser) = sys::get_serial(fd) else {
        return Ok(());
    };
    if !use_standard_speed(&mut ser) {
        return Ok(());
    }
    sys::set_serial(fd, &ser).map_err(|e| PortError::io("ioctl(TIOCSSERIAL)", e))?;
    debug!(fd, "custom divisor cleared");
    Ok(())
}

/// Clear the speed flags; `false` when none were set.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn use_standard_speed(ser: &mut sys::SerialStruct) -> bool {
    if ser.flags & sys::ASYNC_SPD_MASK == 0 {
        return false;
    }
    ser.flags &= !sys::ASYNC_SPD_MASK;
    ser.custom_divisor = 0;
    true
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn set_custom_divisor(_fd: RawFd, baud: u32) -> PortResult<()> {
    Err(PortError::UnsupportedBaudRate(baud))
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn clear_custom_divisor(_fd: RawFd) -> PortResult<()> {
    Ok(())
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
fn set_arbitrary_speed(fd: RawFd, baud: u32) -> PortResult<()> {
    sys::set_arbitrary_speed(fd, baud).map_err(|e| PortError::io("ioctl(IOSSIOSPEED)", e))
}

#[cfg(not(any(target_os = "macos", target_os = "ios")))]
fn set_arbitrary_speed(_fd: RawFd, baud: u32) -> PortResult<()> {
    Err(PortError::UnsupportedBaudRate(baud))
}
