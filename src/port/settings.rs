//! Line settings for a serial port.
//!
//! These are plain values; nothing here touches the OS. Conversions from raw
//! numbers and strings are fallible so that out-of-range values coming from a
//! config file or the command line surface as `InvalidArgument`.

use super::error::{PortError, PortResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ByteSize {
    Five,
    Six,
    Seven,
    Eight,
}

impl ByteSize {
    pub const ALL: [ByteSize; 4] = [Self::Five, Self::Six, Self::Seven, Self::Eight];

    pub fn bits(self) -> u8 {
        match self {
            Self::Five => 5,
            Self::Six => 6,
            Self::Seven => 7,
            Self::Eight => 8,
        }
    }
}

impl TryFrom<u8> for ByteSize {
    type Error = PortError;

    fn try_from(bits: u8) -> PortResult<Self> {
        match bits {
            5 => Ok(Self::Five),
            6 => Ok(Self::Six),
            7 => Ok(Self::Seven),
            8 => Ok(Self::Eight),
            other => Err(PortError::invalid(format!("invalid byte size {other}"))),
        }
    }
}

impl From<ByteSize> for u8 {
    fn from(size: ByteSize) -> Self {
        size.bits()
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

/// Parity checking modes.
///
/// Mark and space parity are only available where the platform exposes a
/// stick-parity flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
    Mark,
    Space,
}

impl Parity {
    pub const ALL: [Parity; 5] = [Self::None, Self::Odd, Self::Even, Self::Mark, Self::Space];

    /// Bits the parity adds to each frame.
    pub fn bit_count(self) -> u8 {
        match self {
            Self::None => 0,
            _ => 1,
        }
    }
}

impl FromStr for Parity {
    type Err = PortError;

    fn from_str(s: &str) -> PortResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "n" => Ok(Self::None),
            "odd" | "o" => Ok(Self::Odd),
            "even" | "e" => Ok(Self::Even),
            "mark" | "m" => Ok(Self::Mark),
            "space" | "s" => Ok(Self::Space),
            _ => Err(PortError::invalid(format!("invalid parity '{s}'"))),
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Odd => "odd",
            Self::Even => "even",
            Self::Mark => "mark",
            Self::Space => "space",
        };
        f.write_str(name)
    }
}

/// Number of stop bits.
///
/// The discriminants are the wire codes used in the byte-time formula; 1.5
/// has no integer code so it is encoded as 3 and corrected afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StopBits {
    One = 1,
    Two = 2,
    OnePointFive = 3,
}

impl StopBits {
    pub const ALL: [StopBits; 3] = [Self::One, Self::OnePointFive, Self::Two];

    pub fn code(self) -> u8 {
        self as u8
    }

    /// The real number of stop bits.
    pub fn count(self) -> f64 {
        match self {
            Self::One => 1.0,
            Self::OnePointFive => 1.5,
            Self::Two => 2.0,
        }
    }
}

impl FromStr for StopBits {
    type Err = PortError;

    fn from_str(s: &str) -> PortResult<Self> {
        match s.trim() {
            "1" => Ok(Self::One),
            "1.5" => Ok(Self::OnePointFive),
            "2" => Ok(Self::Two),
            other => Err(PortError::invalid(format!("invalid stop bits '{other}'"))),
        }
    }
}

impl TryFrom<String> for StopBits {
    type Error = PortError;

    fn try_from(s: String) -> PortResult<Self> {
        s.parse()
    }
}

impl From<StopBits> for String {
    fn from(bits: StopBits) -> Self {
        bits.to_string()
    }
}

impl fmt::Display for StopBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::One => "1",
            Self::OnePointFive => "1.5",
            Self::Two => "2",
        };
        f.write_str(text)
    }
}

/// Flow control modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    None,
    /// XON/XOFF.
    Software,
    /// RTS/CTS.
    Hardware,
}

impl FlowControl {
    pub const ALL: [FlowControl; 3] = [Self::None, Self::Software, Self::Hardware];
}

impl FromStr for FlowControl {
    type Err = PortError;

    fn from_str(s: &str) -> PortResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "software" | "xonxoff" => Ok(Self::Software),
            "hardware" | "rtscts" => Ok(Self::Hardware),
            _ => Err(PortError::invalid(format!("invalid flow control '{s}'"))),
        }
    }
}

impl fmt::Display for FlowControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Software => "software",
            Self::Hardware => "hardware",
        };
        f.write_str(name)
    }
}

/// Everything that determines the line discipline of an open port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSettings {
    /// Baud rate (bits per second).
    pub baud_rate: u32,
    pub byte_size: ByteSize,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
}

impl Default for LineSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            byte_size: ByteSize::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
        }
    }
}

impl LineSettings {
    pub fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            ..Self::default()
        }
    }

    /// Nominal time to transmit one character: start bit, data bits, parity
    /// bit and stop bits.
    pub fn byte_time(&self) -> PortResult<Duration> {
        if self.baud_rate == 0 {
            return Err(PortError::invalid("baud rate must be positive"));
        }
        let bit_time_ns = 1e9 / f64::from(self.baud_rate);
        let frame_bits = 1
            + u32::from(self.byte_size.bits())
            + u32::from(self.parity.bit_count())
            + u32::from(self.stop_bits.code());
        let mut byte_time_ns = bit_time_ns * f64::from(frame_bits);

        // OnePointFive is coded as 3.
        if self.stop_bits == StopBits::OnePointFive {
            byte_time_ns += (1.5 - f64::from(StopBits::OnePointFive.code())) * bit_time_ns;
        }

        Ok(Duration::from_nanos(byte_time_ns.round() as u64))
    }
}

impl fmt::Display for LineSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
            Parity::Mark => 'M',
            Parity::Space => 'S',
        };
        write!(
            f,
            "{} {}{}{} flow={}",
            self.baud_rate, self.byte_size, parity, self.stop_bits, self.flow_control
        )
    }
}
