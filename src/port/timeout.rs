//! Timeout policy for serial transfers.
//!
//! A transfer of `n` bytes gets a total budget of `constant + multiplier * n`
//! milliseconds. Reads are additionally bounded by an inter-byte timeout that
//! caps each individual readiness wait.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Read and write timeout settings, in milliseconds.
///
/// `inter_byte_timeout == Timeout::MAX` means the inter-byte gap is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeout {
    /// Gap allowed between consecutive bytes of a read.
    pub inter_byte_timeout: u32,
    /// Fixed part of the total read budget.
    pub read_timeout_constant: u32,
    /// Per-requested-byte part of the total read budget.
    pub read_timeout_multiplier: u32,
    /// Fixed part of the total write budget.
    pub write_timeout_constant: u32,
    /// Per-requested-byte part of the total write budget.
    pub write_timeout_multiplier: u32,
}

impl Timeout {
    /// Sentinel for "no bound".
    pub const MAX: u32 = u32::MAX;

    pub const fn new(
        inter_byte_timeout: u32,
        read_timeout_constant: u32,
        read_timeout_multiplier: u32,
        write_timeout_constant: u32,
        write_timeout_multiplier: u32,
    ) -> Self {
        Self {
            inter_byte_timeout,
            read_timeout_constant,
            read_timeout_multiplier,
            write_timeout_constant,
            write_timeout_multiplier,
        }
    }

    /// Fixed read and write budgets of `ms`, unbounded inter-byte gap.
    pub const fn simple(ms: u32) -> Self {
        Self::new(Self::MAX, ms, 0, ms, 0)
    }

    /// Transfers move only what is immediately possible.
    pub const fn non_blocking() -> Self {
        Self::new(Self::MAX, 0, 0, 0, 0)
    }

    pub fn inter_byte_unbounded(&self) -> bool {
        self.inter_byte_timeout == Self::MAX
    }

    /// Total budget for reading `size` bytes.
    pub fn read_budget_ms(&self, size: usize) -> u64 {
        total_timeout_ms(self.read_timeout_constant, self.read_timeout_multiplier, size)
    }

    /// Total budget for writing `length` bytes.
    pub fn write_budget_ms(&self, length: usize) -> u64 {
        total_timeout_ms(self.write_timeout_constant, self.write_timeout_multiplier, length)
    }
}

impl Default for Timeout {
    /// Non-blocking, like a freshly constructed port.
    fn default() -> Self {
        Self::non_blocking()
    }
}

/// `constant + multiplier * size`, saturating instead of overflowing.
pub fn total_timeout_ms(constant: u32, multiplier: u32, size: usize) -> u64 {
    let size = u64::try_from(size).unwrap_or(u64::MAX);
    u64::from(multiplier)
        .saturating_mul(size)
        .saturating_add(u64::from(constant))
}

/// Countdown against a monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires_at: Option<Instant>,
}

impl Deadline {
    /// A deadline `ms` milliseconds from now. Budgets too large to represent never expire.
    pub fn after_ms(ms: u64) -> Self {
        Self {
            expires_at: Instant::now().checked_add(Duration::from_millis(ms)),
        }
    }

    /// Time left, zero once expired.
    pub fn remaining(&self) -> Duration {
        match self.expires_at {
            Some(at) => at.saturating_duration_since(Instant::now()),
            None => Duration::MAX,
        }
    }

    /// Whole milliseconds left, saturating at `u32::MAX`.
    pub fn remaining_ms(&self) -> u32 {
        u32::try_from(self.remaining().as_millis()).unwrap_or(u32::MAX)
    }

    pub fn expired(&self) -> bool {
        self.remaining_ms() == 0
    }
}
